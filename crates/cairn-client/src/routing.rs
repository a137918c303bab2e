//! Routing and search operations.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use cairn_core::{RecordRef, Result};
use cairn_proto as proto;
use cairn_proto::status::from_status;

use crate::client::Client;
use crate::streaming::STREAM_BUFFER;

/// One published record returned by a list query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    /// The record's content identifier.
    pub cid: String,
    /// The labels the record is published under.
    pub labels: Vec<String>,
}

impl Client {
    /// Publishes a stored record into the routing index.
    ///
    /// # Errors
    ///
    /// `NotFound` when the CID is absent from the store.
    pub async fn publish(&self, record_ref: &RecordRef) -> Result<()> {
        let mut client = self.routing.clone();
        client
            .publish(proto::PublishRequest {
                record_ref: Some(record_ref.clone().into()),
            })
            .await
            .map(|_| ())
            .map_err(|s| from_status(&s))
    }

    /// Removes a record's label edges from the routing index.
    ///
    /// # Errors
    ///
    /// `NotFound` when the CID was never published.
    pub async fn unpublish(&self, record_ref: &RecordRef) -> Result<()> {
        let mut client = self.routing.clone();
        client
            .unpublish(proto::UnpublishRequest {
                record_ref: Some(record_ref.clone().into()),
            })
            .await
            .map(|_| ())
            .map_err(|s| from_status(&s))
    }

    /// Streams the records published under every one of the given labels.
    ///
    /// The returned channel closes when the server finishes or the token is
    /// cancelled; an empty intersection yields an empty stream.
    #[must_use]
    pub fn list(
        &self,
        cancel: CancellationToken,
        labels: Vec<String>,
    ) -> mpsc::Receiver<Result<ListEntry>> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);
        let mut client = self.routing.clone();

        tokio::spawn(async move {
            let opened = tokio::select! {
                () = cancel.cancelled() => return,
                opened = client.list(proto::ListRequest { labels }) => opened,
            };
            let mut stream = match opened {
                Ok(response) => response.into_inner(),
                Err(status) => {
                    let _ = tx.send(Err(from_status(&status))).await;
                    return;
                }
            };

            loop {
                let message = tokio::select! {
                    () = cancel.cancelled() => return,
                    message = stream.message() => message,
                };
                let item = match message {
                    Ok(Some(response)) => Ok(ListEntry {
                        cid: response.cid,
                        labels: response.labels,
                    }),
                    Ok(None) => return,
                    Err(status) => {
                        let _ = tx.send(Err(from_status(&status))).await;
                        return;
                    }
                };
                let sent = tokio::select! {
                    () = cancel.cancelled() => return,
                    sent = tx.send(item) => sent,
                };
                if sent.is_err() {
                    return;
                }
            }
        });

        rx
    }

    /// Collects a list query into a vector. Convenience over [`Client::list`].
    ///
    /// # Errors
    ///
    /// Returns the first stream error encountered.
    pub async fn list_collect(&self, labels: Vec<String>) -> Result<Vec<ListEntry>> {
        let mut stream = self.list(CancellationToken::new(), labels);
        let mut entries = Vec::new();
        while let Some(item) = stream.recv().await {
            entries.push(item?);
        }
        Ok(entries)
    }

    /// Lists individual label edges matching any of the given labels, the
    /// legacy listing shape kept for older consumers.
    ///
    /// # Errors
    ///
    /// Returns the first stream error encountered.
    pub async fn legacy_list(&self, labels: Vec<String>) -> Result<Vec<(String, String)>> {
        let mut client = self.routing.clone();
        let mut stream = client
            .legacy_list(proto::LegacyListRequest { labels })
            .await
            .map_err(|s| from_status(&s))?
            .into_inner();

        let mut edges = Vec::new();
        loop {
            match stream.message().await {
                Ok(Some(response)) => edges.push((response.label, response.cid)),
                Ok(None) => return Ok(edges),
                Err(status) => return Err(from_status(&status)),
            }
        }
    }

    /// Searches published records by `key=value` queries.
    ///
    /// # Errors
    ///
    /// Returns the first stream error encountered.
    pub async fn search(&self, queries: Vec<String>, limit: u32) -> Result<Vec<String>> {
        let mut client = self.search.clone();
        let mut stream = client
            .search(proto::SearchRequest { queries, limit })
            .await
            .map_err(|s| from_status(&s))?
            .into_inner();

        let mut cids = Vec::new();
        loop {
            match stream.message().await {
                Ok(Some(response)) => cids.push(response.cid),
                Ok(None) => return Ok(cids),
                Err(status) => return Err(from_status(&status)),
            }
        }
    }
}
