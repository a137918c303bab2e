//! Store operations: streaming, scalar and batch entry points.
//!
//! The streaming methods are thin instantiations of the generic primitive
//! in [`crate::streaming`]; scalar and batch methods feed the same
//! single-stream path with a short channel, so every entry point shares one
//! backend stream per call.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use cairn_core::{Error, Record, RecordMeta, RecordRef, Result};
use cairn_proto as proto;

use crate::client::Client;
use crate::streaming::{
    map_input, map_results, stream_acked, stream_bidi, StreamItem, STREAM_BUFFER,
};

impl Client {
    /// Streams records into the store; results carry the assigned CIDs.
    #[must_use]
    pub fn push_stream(
        &self,
        cancel: CancellationToken,
        records: mpsc::Receiver<Record>,
    ) -> mpsc::Receiver<StreamItem<RecordRef>> {
        let wire = map_input(cancel.clone(), records, proto::Record::from);
        let mut client = self.store.clone();
        let raw = stream_bidi(cancel.clone(), wire, move |input| async move {
            client.push(input).await
        });
        map_results(cancel, raw, |response: proto::PushResponse| {
            if let Some(error) = response.error {
                return Err(error.into());
            }
            response.record_ref.map(Into::into).ok_or_else(|| {
                Error::Internal("push response carried neither a reference nor an error".into())
            })
        })
    }

    /// Streams references through the store, yielding full records.
    #[must_use]
    pub fn pull_stream(
        &self,
        cancel: CancellationToken,
        refs: mpsc::Receiver<RecordRef>,
    ) -> mpsc::Receiver<StreamItem<Record>> {
        let wire = map_input(cancel.clone(), refs, proto::RecordRef::from);
        let mut client = self.store.clone();
        let raw = stream_bidi(cancel.clone(), wire, move |input| async move {
            client.pull(input).await
        });
        map_results(cancel, raw, |response: proto::PullResponse| {
            if let Some(error) = response.error {
                return Err(error.into());
            }
            let record = response.record.ok_or_else(|| {
                Error::Internal("pull response carried neither a record nor an error".into())
            })?;
            record.try_into()
        })
    }

    /// Streams references through the store, yielding metadata only.
    #[must_use]
    pub fn lookup_stream(
        &self,
        cancel: CancellationToken,
        refs: mpsc::Receiver<RecordRef>,
    ) -> mpsc::Receiver<StreamItem<RecordMeta>> {
        let wire = map_input(cancel.clone(), refs, proto::RecordRef::from);
        let mut client = self.store.clone();
        let raw = stream_bidi(cancel.clone(), wire, move |input| async move {
            client.lookup(input).await
        });
        map_results(cancel, raw, |response: proto::LookupResponse| {
            if let Some(error) = response.error {
                return Err(error.into());
            }
            let meta = response.meta.ok_or_else(|| {
                Error::Internal("lookup response carried neither metadata nor an error".into())
            })?;
            meta.try_into()
        })
    }

    /// Streams references into delete; each forwarded item yields a success
    /// result, and the terminal acknowledgment is awaited on input closure.
    #[must_use]
    pub fn delete_stream(
        &self,
        cancel: CancellationToken,
        refs: mpsc::Receiver<RecordRef>,
    ) -> mpsc::Receiver<StreamItem<()>> {
        let wire = map_input(cancel.clone(), refs, proto::RecordRef::from);
        let mut client = self.store.clone();
        stream_acked(cancel, wire, move |input| async move {
            client.delete(input).await
        })
    }

    /// Stores a single record and returns its reference.
    ///
    /// # Errors
    ///
    /// Surfaces the stream's first error through the shared taxonomy.
    pub async fn push(&self, record: &Record) -> Result<RecordRef> {
        let mut results = self.push_stream(
            CancellationToken::new(),
            single_item(record.clone()).await,
        );
        first_result(&mut results, "push").await
    }

    /// Retrieves a single record by reference.
    ///
    /// # Errors
    ///
    /// Surfaces the stream's first error through the shared taxonomy.
    pub async fn pull(&self, record_ref: &RecordRef) -> Result<Record> {
        let mut results = self.pull_stream(
            CancellationToken::new(),
            single_item(record_ref.clone()).await,
        );
        first_result(&mut results, "pull").await
    }

    /// Retrieves metadata for a single record.
    ///
    /// # Errors
    ///
    /// Surfaces the stream's first error through the shared taxonomy.
    pub async fn lookup(&self, record_ref: &RecordRef) -> Result<RecordMeta> {
        let mut results = self.lookup_stream(
            CancellationToken::new(),
            single_item(record_ref.clone()).await,
        );
        first_result(&mut results, "lookup").await
    }

    /// Deletes a single record.
    ///
    /// Unlike the other scalar operations, the whole result stream is
    /// drained: the per-item success is emitted before the server has
    /// processed the reference, so the real verdict arrives with the
    /// terminal acknowledgment.
    ///
    /// # Errors
    ///
    /// Surfaces the stream's first error through the shared taxonomy.
    pub async fn delete(&self, record_ref: &RecordRef) -> Result<()> {
        let mut results = self.delete_stream(
            CancellationToken::new(),
            single_item(record_ref.clone()).await,
        );
        while let Some(item) = results.recv().await {
            if let Err(err) = item.outcome {
                return Err(err.into_error());
            }
        }
        Ok(())
    }

    /// Pushes multiple records over one stream.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered; references assigned before the
    /// failure are discarded.
    pub async fn push_batch(&self, records: Vec<Record>) -> Result<Vec<RecordRef>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let mut results =
            self.push_stream(CancellationToken::new(), feed_items(records));
        collect_batch(&mut results).await
    }

    /// Pulls multiple records over one stream.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    pub async fn pull_batch(&self, refs: Vec<RecordRef>) -> Result<Vec<Record>> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }
        let mut results = self.pull_stream(CancellationToken::new(), feed_items(refs));
        collect_batch(&mut results).await
    }

    /// Looks up multiple records over one stream.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    pub async fn lookup_batch(&self, refs: Vec<RecordRef>) -> Result<Vec<RecordMeta>> {
        if refs.is_empty() {
            return Ok(Vec::new());
        }
        let mut results = self.lookup_stream(CancellationToken::new(), feed_items(refs));
        collect_batch(&mut results).await
    }

    /// Deletes multiple records over one stream.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered.
    pub async fn delete_batch(&self, refs: Vec<RecordRef>) -> Result<()> {
        if refs.is_empty() {
            return Ok(());
        }
        let mut results = self.delete_stream(CancellationToken::new(), feed_items(refs));
        while let Some(item) = results.recv().await {
            if let Err(err) = item.outcome {
                return Err(err.into_error());
            }
        }
        Ok(())
    }

    /// Attaches a referrer artifact to a stored record.
    ///
    /// # Errors
    ///
    /// `NotFound` when the subject record is absent.
    pub async fn push_referrer(
        &self,
        record_ref: &RecordRef,
        referrer: proto::Referrer,
    ) -> Result<()> {
        let request = proto::PushReferrerRequest {
            record_ref: Some(record_ref.clone().into()),
            referrer: Some(referrer),
        };
        let cancel = CancellationToken::new();
        let mut client = self.store.clone();
        let raw = stream_bidi(cancel.clone(), single_item(request).await, move |input| {
            async move { client.push_referrer(input).await }
        });
        let mut results = map_results(cancel, raw, |response: proto::PushReferrerResponse| {
            if let Some(error) = response.error {
                return Err(error.into());
            }
            Ok(())
        });
        first_result(&mut results, "push referrer").await
    }

    /// Lists referrer artifacts for a stored record, optionally filtered by
    /// artifact type.
    ///
    /// # Errors
    ///
    /// `NotFound` when the subject record is absent.
    pub async fn pull_referrers(
        &self,
        record_ref: &RecordRef,
        type_filter: Option<&str>,
    ) -> Result<Vec<proto::Referrer>> {
        let request = proto::PullReferrerRequest {
            record_ref: Some(record_ref.clone().into()),
            r#type: type_filter.unwrap_or_default().to_string(),
        };
        let cancel = CancellationToken::new();
        let mut client = self.store.clone();
        let raw = stream_bidi(cancel.clone(), single_item(request).await, move |input| {
            async move { client.pull_referrer(input).await }
        });
        let mut results = map_results(cancel, raw, |response: proto::PullReferrerResponse| {
            if let Some(error) = response.error {
                return Err(error.into());
            }
            response
                .referrer
                .ok_or_else(|| Error::Internal("referrer response carried no artifact".into()))
        });
        collect_batch(&mut results).await
    }
}

/// Builds a closed one-element channel, the scalar bridge onto the
/// streaming path.
async fn single_item<T: Send + 'static>(item: T) -> mpsc::Receiver<T> {
    let (tx, rx) = mpsc::channel(1);
    // Capacity 1 guarantees this send never waits.
    let _ = tx.send(item).await;
    rx
}

/// Spawns a task feeding a slice of items into a channel.
fn feed_items<T: Send + 'static>(items: Vec<T>) -> mpsc::Receiver<T> {
    let (tx, rx) = mpsc::channel(STREAM_BUFFER.max(items.len()));
    tokio::spawn(async move {
        for item in items {
            if tx.send(item).await.is_err() {
                return;
            }
        }
    });
    rx
}

async fn first_result<T>(
    results: &mut mpsc::Receiver<StreamItem<T>>,
    what: &str,
) -> Result<T> {
    match results.recv().await {
        Some(item) => item.outcome.map_err(crate::streaming::StreamError::into_error),
        None => Err(Error::Internal(format!(
            "{what} stream closed without a result"
        ))),
    }
}

async fn collect_batch<T>(results: &mut mpsc::Receiver<StreamItem<T>>) -> Result<Vec<T>> {
    let mut collected = Vec::new();
    let mut first_error: Option<Error> = None;

    while let Some(item) = results.recv().await {
        match item.outcome {
            Ok(value) => collected.push(value),
            Err(err) => {
                if first_error.is_none() {
                    first_error = Some(err.into_error());
                }
            }
        }
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(collected),
    }
}
