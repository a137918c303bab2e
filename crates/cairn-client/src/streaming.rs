//! The generic streaming primitive.
//!
//! Every streaming operation follows the generator pattern: the caller hands
//! over a context token and an input channel, gets an output channel back
//! immediately, and the primitive owns its internal tasks. Exactly one
//! backend stream is opened per call regardless of how many items flow
//! through it; closing the input channel signals completion, cancelling the
//! token tears everything down.
//!
//! Two cooperating tasks drive a bidirectional call: the sender forwards
//! input items to the backend and indexes them by position, the receiver
//! forwards backend responses to the output channel with its own index.
//! Every channel interaction is a two-way select against cancellation, so
//! cancellation can never deadlock behind a full buffer.

use std::future::Future;

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Response, Status, Streaming};

/// Buffer size for streaming channels.
///
/// Small on purpose: when the caller stops draining, workers block, which
/// propagates backpressure to the backend and the producer.
pub const STREAM_BUFFER: usize = 10;

/// One result flowing out of a streaming operation.
#[derive(Debug)]
pub struct StreamItem<T> {
    /// 0-based position: input order for sender-side errors, backend
    /// response order for received items.
    pub index: usize,
    /// The received item, or what went wrong.
    pub outcome: Result<T, StreamError>,
}

/// What can go wrong at each stage of a streaming operation.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The backend refused to open the stream; emitted once, then the
    /// output channel closes.
    #[error("failed to create stream: {0}")]
    Create(Status),

    /// Forwarding the item at `index` failed; the sender aborts, the
    /// receiver drains what the backend already produced.
    #[error("failed to send item {index}: {reason}")]
    Send {
        /// Input position of the failed item.
        index: usize,
        /// Why the send failed.
        reason: String,
    },

    /// Reading the `index`-th response failed; the receiver aborts.
    #[error("failed to receive item {index}: {status}")]
    Receive {
        /// Response position at which the failure occurred.
        index: usize,
        /// The transport status.
        status: Status,
    },

    /// Closing the send half failed; already-emitted successes stand.
    #[error("failed to close stream: {0}")]
    Close(Status),

    /// The item at `index` failed in the backend; the stream continues.
    #[error("item {index} failed: {source}")]
    Item {
        /// Position of the failed item.
        index: usize,
        /// The application error reported by the backend.
        source: cairn_core::Error,
    },
}

impl StreamError {
    /// Converts into the shared error taxonomy, collapsing transport
    /// failures to `Unavailable` and keeping item errors as-is.
    #[must_use]
    pub fn into_error(self) -> cairn_core::Error {
        match self {
            Self::Item { source, .. } => source,
            Self::Create(status) | Self::Receive { status, .. } | Self::Close(status) => {
                cairn_proto::status::from_status(&status)
            }
            Self::Send { index, reason } => {
                cairn_core::Error::unavailable(format!("send of item {index} failed: {reason}"))
            }
        }
    }
}

async fn send_or_cancel<T>(
    cancel: &CancellationToken,
    tx: &mpsc::Sender<T>,
    item: T,
) -> Result<(), ()> {
    tokio::select! {
        () = cancel.cancelled() => Err(()),
        sent = tx.send(item) => sent.map_err(|_| ()),
    }
}

/// Runs a bidirectional streaming call.
///
/// Returns the output channel immediately. The `open` closure is invoked
/// exactly once with the backend-bound request stream; all input items share
/// that one stream. Output items carry raw backend responses; use
/// [`map_results`] to project them into domain results.
pub fn stream_bidi<In, Out, F, Fut>(
    cancel: CancellationToken,
    mut input: mpsc::Receiver<In>,
    open: F,
) -> mpsc::Receiver<StreamItem<Out>>
where
    In: Send + 'static,
    Out: Send + 'static,
    F: FnOnce(ReceiverStream<In>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Response<Streaming<Out>>, Status>> + Send,
{
    let (out_tx, out_rx) = mpsc::channel(STREAM_BUFFER);

    tokio::spawn(async move {
        let (backend_tx, backend_rx) = mpsc::channel::<In>(STREAM_BUFFER);

        // Open the single backend stream for this operation's lifetime.
        let opened = tokio::select! {
            () = cancel.cancelled() => return,
            opened = open(ReceiverStream::new(backend_rx)) => opened,
        };
        let mut responses = match opened {
            Ok(response) => response.into_inner(),
            Err(status) => {
                let item = StreamItem {
                    index: 0,
                    outcome: Err(StreamError::Create(status)),
                };
                let _ = send_or_cancel(&cancel, &out_tx, item).await;
                return;
            }
        };

        let sender = {
            let cancel = cancel.clone();
            let out_tx = out_tx.clone();
            tokio::spawn(async move {
                let mut index = 0usize;
                loop {
                    let next = tokio::select! {
                        () = cancel.cancelled() => return,
                        next = input.recv() => next,
                    };
                    let Some(item) = next else {
                        // Input closed: dropping backend_tx closes the send
                        // half and lets the backend finish.
                        return;
                    };

                    let forwarded = tokio::select! {
                        () = cancel.cancelled() => return,
                        forwarded = backend_tx.send(item) => forwarded,
                    };
                    if forwarded.is_err() {
                        let item = StreamItem {
                            index,
                            outcome: Err(StreamError::Send {
                                index,
                                reason: "backend closed the request stream".to_string(),
                            }),
                        };
                        let _ = send_or_cancel(&cancel, &out_tx, item).await;
                        return;
                    }
                    index += 1;
                }
            })
        };

        let receiver = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let mut index = 0usize;
                loop {
                    let message = tokio::select! {
                        () = cancel.cancelled() => return,
                        message = responses.message() => message,
                    };
                    match message {
                        Ok(Some(out)) => {
                            let item = StreamItem {
                                index,
                                outcome: Ok(out),
                            };
                            if send_or_cancel(&cancel, &out_tx, item).await.is_err() {
                                return;
                            }
                            index += 1;
                        }
                        Ok(None) => return,
                        Err(status) => {
                            let item = StreamItem {
                                index,
                                outcome: Err(StreamError::Receive { index, status }),
                            };
                            let _ = send_or_cancel(&cancel, &out_tx, item).await;
                            return;
                        }
                    }
                }
            })
        };

        let _ = sender.await;
        let _ = receiver.await;
        // out_tx drops here, closing the output channel.
    });

    out_rx
}

/// Runs a client-streaming call with a single terminal acknowledgment.
///
/// There is no concurrent receiver: the sender emits a success result for
/// each item it forwards, and once the input closes the terminal
/// acknowledgment is awaited. A clean end of stream is success; a terminal
/// status error surfaces as [`StreamError::Close`].
pub fn stream_acked<In, Ack, F, Fut>(
    cancel: CancellationToken,
    mut input: mpsc::Receiver<In>,
    open: F,
) -> mpsc::Receiver<StreamItem<()>>
where
    In: Send + 'static,
    Ack: Send + 'static,
    F: FnOnce(ReceiverStream<In>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Response<Ack>, Status>> + Send + 'static,
{
    let (out_tx, out_rx) = mpsc::channel(STREAM_BUFFER);

    tokio::spawn(async move {
        let (backend_tx, backend_rx) = mpsc::channel::<In>(STREAM_BUFFER);

        // The call future drives the request stream, so it must run
        // concurrently with the feeding loop below.
        let mut call = tokio::spawn(open(ReceiverStream::new(backend_rx)));

        let mut index = 0usize;
        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => return,
                next = input.recv() => next,
            };
            let Some(item) = next else {
                break;
            };

            let forwarded = tokio::select! {
                () = cancel.cancelled() => return,
                forwarded = backend_tx.send(item) => forwarded,
            };
            if forwarded.is_err() {
                // The call ended early and dropped the request stream;
                // surface its terminal status rather than a synthetic
                // send failure.
                let ack = tokio::select! {
                    () = cancel.cancelled() => return,
                    ack = &mut call => ack,
                };
                let outcome = match ack {
                    Ok(Ok(_)) => Err(StreamError::Send {
                        index,
                        reason: "backend closed the request stream".to_string(),
                    }),
                    Ok(Err(status)) => Err(StreamError::Close(status)),
                    Err(join_error) => Err(StreamError::Close(Status::internal(format!(
                        "call task failed: {join_error}"
                    )))),
                };
                let _ = send_or_cancel(&cancel, &out_tx, StreamItem { index, outcome }).await;
                return;
            }

            // Forwarded successfully; report the item as accepted.
            let item = StreamItem {
                index,
                outcome: Ok(()),
            };
            if send_or_cancel(&cancel, &out_tx, item).await.is_err() {
                return;
            }
            index += 1;
        }

        // Close the send half and wait for the terminal acknowledgment.
        drop(backend_tx);
        let ack = tokio::select! {
            () = cancel.cancelled() => return,
            ack = &mut call => ack,
        };
        let outcome = match ack {
            Ok(Ok(_)) => return,
            Ok(Err(status)) => Err(StreamError::Close(status)),
            Err(join_error) => Err(StreamError::Close(Status::internal(format!(
                "call task failed: {join_error}"
            )))),
        };
        let _ = send_or_cancel(&cancel, &out_tx, StreamItem { index, outcome }).await;
    });

    out_rx
}

/// Feeds a channel through a conversion function, preserving cancellation
/// behavior. Used to bridge domain-typed producers onto wire-typed streams.
pub fn map_input<T, W, F>(
    cancel: CancellationToken,
    mut input: mpsc::Receiver<T>,
    convert: F,
) -> mpsc::Receiver<W>
where
    T: Send + 'static,
    W: Send + 'static,
    F: Fn(T) -> W + Send + 'static,
{
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => return,
                next = input.recv() => next,
            };
            let Some(item) = next else { return };
            if send_or_cancel(&cancel, &tx, convert(item)).await.is_err() {
                return;
            }
        }
    });
    rx
}

/// Projects raw backend responses into domain results.
///
/// A response that converts to `Err` becomes a [`StreamError::Item`] with
/// the same index; stream-level errors pass through untouched.
pub fn map_results<Out, T, F>(
    cancel: CancellationToken,
    mut results: mpsc::Receiver<StreamItem<Out>>,
    project: F,
) -> mpsc::Receiver<StreamItem<T>>
where
    Out: Send + 'static,
    T: Send + 'static,
    F: Fn(Out) -> Result<T, cairn_core::Error> + Send + 'static,
{
    let (tx, rx) = mpsc::channel(STREAM_BUFFER);
    tokio::spawn(async move {
        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => return,
                next = results.recv() => next,
            };
            let Some(item) = next else { return };
            let mapped = StreamItem {
                index: item.index,
                outcome: match item.outcome {
                    Ok(out) => match project(out) {
                        Ok(value) => Ok(value),
                        Err(source) => Err(StreamError::Item {
                            index: item.index,
                            source,
                        }),
                    },
                    Err(err) => Err(err),
                },
            };
            if send_or_cancel(&cancel, &tx, mapped).await.is_err() {
                return;
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // Tonic's Streaming cannot be constructed by hand, so stream_bidi is
    // covered by the server end-to-end tests; the helpers and the
    // client-streaming variant are testable in isolation here.

    #[tokio::test]
    async fn map_input_converts_and_closes() {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(4);
        let mapped = map_input(cancel, rx, |n: u32| n * 2);

        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        drop(tx);

        let mut out = Vec::new();
        let mut mapped = mapped;
        while let Some(item) = mapped.recv().await {
            out.push(item);
        }
        assert_eq!(out, vec![2, 4]);
    }

    #[tokio::test]
    async fn map_input_stops_on_cancellation() {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel(4);
        let mut mapped = map_input(cancel.clone(), rx, |n: u32| n);

        tx.send(7).await.unwrap();
        assert_eq!(mapped.recv().await, Some(7));

        cancel.cancel();
        // Output closes promptly even though the producer stays open.
        let closed = tokio::time::timeout(Duration::from_millis(200), mapped.recv())
            .await
            .expect("channel should close within the grace period");
        assert_eq!(closed, None);
        drop(tx);
    }

    #[tokio::test]
    async fn map_results_projects_item_errors() {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel::<StreamItem<u32>>(4);
        let mut mapped = map_results(cancel, rx, |n| {
            if n % 2 == 0 {
                Ok(n)
            } else {
                Err(cairn_core::Error::Internal("odd".into()))
            }
        });

        tx.send(StreamItem {
            index: 0,
            outcome: Ok(2),
        })
        .await
        .unwrap();
        tx.send(StreamItem {
            index: 1,
            outcome: Ok(3),
        })
        .await
        .unwrap();
        drop(tx);

        let first = mapped.recv().await.unwrap();
        assert!(matches!(first.outcome, Ok(2)));

        let second = mapped.recv().await.unwrap();
        match second.outcome {
            Err(StreamError::Item { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected item error, got {other:?}"),
        }

        assert!(mapped.recv().await.is_none());
    }

    #[tokio::test]
    async fn stream_acked_reports_each_forwarded_item() {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel::<u32>(4);

        let mut results = stream_acked(cancel, rx, |input| async move {
            // Drain the request stream, then acknowledge.
            use tokio_stream::StreamExt as _;
            let mut input = input;
            while input.next().await.is_some() {}
            Ok(Response::new(()))
        });

        tx.send(10).await.unwrap();
        tx.send(20).await.unwrap();
        drop(tx);

        let mut indices = Vec::new();
        while let Some(item) = results.recv().await {
            assert!(item.outcome.is_ok());
            indices.push(item.index);
        }
        assert_eq!(indices, vec![0, 1]);
    }

    #[tokio::test]
    async fn stream_acked_surfaces_terminal_error_as_close() {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel::<u32>(4);

        let mut results = stream_acked(cancel, rx, |input| async move {
            use tokio_stream::StreamExt as _;
            let mut input = input;
            while input.next().await.is_some() {}
            Err::<Response<()>, _>(Status::not_found("missing"))
        });

        tx.send(1).await.unwrap();
        drop(tx);

        let first = results.recv().await.unwrap();
        assert!(first.outcome.is_ok());

        let last = results.recv().await.unwrap();
        assert!(matches!(last.outcome, Err(StreamError::Close(_))));
        assert!(results.recv().await.is_none());
    }

    #[tokio::test]
    async fn stream_acked_empty_input_closes_after_ack() {
        let cancel = CancellationToken::new();
        let (tx, rx) = mpsc::channel::<u32>(1);
        drop(tx);

        let mut results = stream_acked(cancel, rx, |input| async move {
            use tokio_stream::StreamExt as _;
            let mut input = input;
            while input.next().await.is_some() {}
            Ok(Response::new(()))
        });

        let closed = tokio::time::timeout(Duration::from_millis(200), results.recv())
            .await
            .expect("channel should close promptly");
        assert!(closed.is_none());
    }

    #[test]
    fn stream_error_converts_to_taxonomy() {
        let err = StreamError::Item {
            index: 3,
            source: cairn_core::Error::not_found("record", "bafyx"),
        };
        assert_eq!(err.into_error().code(), "NOT_FOUND");

        let err = StreamError::Send {
            index: 1,
            reason: "closed".into(),
        };
        assert_eq!(err.into_error().code(), "UNAVAILABLE");

        let err = StreamError::Create(Status::permission_denied("no"));
        assert_eq!(err.into_error().code(), "PERMISSION_DENIED");
    }
}
