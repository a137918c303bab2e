//! The store service: streaming push, pull, lookup and delete.
//!
//! Bidirectional handlers process the request stream sequentially, so
//! response order matches request order and indices correlate one to one.
//! Item-local failures travel inline in the response message; only
//! transport problems and delete failures terminate a stream with a status.

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status, Streaming};
use tracing::Instrument;

use cairn_core::observability::rpc_span;

use cairn_core::{Error, Record, RecordRef};
use cairn_proto as proto;
use cairn_proto::status::to_status;
use cairn_proto::store_service_server::StoreService;
use cairn_store::{RecordStore, ReferrerArtifact};

use crate::gate::Gate;

/// Buffer size for response streams.
const RESPONSE_BUFFER: usize = 10;

/// Store service implementation.
#[derive(Clone)]
pub struct StoreServiceImpl {
    store: RecordStore,
    gate: Gate,
}

impl StoreServiceImpl {
    /// Creates the service over a record store and the shared gate.
    #[must_use]
    pub fn new(store: RecordStore, gate: Gate) -> Self {
        Self { store, gate }
    }
}

type ResponseStream<T> = ReceiverStream<Result<T, Status>>;

/// Runs a bidi handler: one task consumes the request stream sequentially
/// and produces one response per item via `handle`.
fn spawn_bidi<In, Out, F, Fut>(
    mut input: Streaming<In>,
    span: tracing::Span,
    handle: F,
) -> Response<ResponseStream<Out>>
where
    In: Send + 'static,
    Out: Send + 'static,
    F: Fn(In) -> Fut + Send + 'static,
    Fut: std::future::Future<Output = Out> + Send,
{
    let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);
    tokio::spawn(
        async move {
            loop {
                match input.message().await {
                    Ok(Some(item)) => {
                        let response = handle(item).await;
                        if tx.send(Ok(response)).await.is_err() {
                            return;
                        }
                    }
                    Ok(None) => return,
                    Err(status) => {
                        let _ = tx.send(Err(status)).await;
                        return;
                    }
                }
            }
        }
        .instrument(span),
    );
    Response::new(ReceiverStream::new(rx))
}

#[tonic::async_trait]
impl StoreService for StoreServiceImpl {
    type PushStream = ResponseStream<proto::PushResponse>;
    type PullStream = ResponseStream<proto::PullResponse>;
    type LookupStream = ResponseStream<proto::LookupResponse>;
    type PushReferrerStream = ResponseStream<proto::PushReferrerResponse>;
    type PullReferrerStream = ResponseStream<proto::PullReferrerResponse>;

    async fn push(
        &self,
        request: Request<Streaming<proto::Record>>,
    ) -> Result<Response<Self::PushStream>, Status> {
        let trust_domain = self.gate.check(&request, "Push")?;
        let span = rpc_span("StoreService", "Push", &trust_domain);
        let store = self.store.clone();
        Ok(spawn_bidi(request.into_inner(), span, move |wire| {
            let store = store.clone();
            async move {
                let outcome = async {
                    let record: Record = wire.try_into()?;
                    store.push(&record).await
                }
                .await;
                match outcome {
                    Ok(record_ref) => proto::PushResponse {
                        record_ref: Some(record_ref.into()),
                        error: None,
                    },
                    Err(err) => proto::PushResponse {
                        record_ref: None,
                        error: Some((&err).into()),
                    },
                }
            }
        }))
    }

    async fn pull(
        &self,
        request: Request<Streaming<proto::RecordRef>>,
    ) -> Result<Response<Self::PullStream>, Status> {
        let trust_domain = self.gate.check(&request, "Pull")?;
        let span = rpc_span("StoreService", "Pull", &trust_domain);
        let store = self.store.clone();
        Ok(spawn_bidi(request.into_inner(), span, move |wire| {
            let store = store.clone();
            async move {
                let record_ref: RecordRef = wire.into();
                match store.pull(&record_ref).await {
                    Ok(record) => proto::PullResponse {
                        record: Some(record.into()),
                        error: None,
                    },
                    Err(err) => proto::PullResponse {
                        record: None,
                        error: Some((&err).into()),
                    },
                }
            }
        }))
    }

    async fn lookup(
        &self,
        request: Request<Streaming<proto::RecordRef>>,
    ) -> Result<Response<Self::LookupStream>, Status> {
        let trust_domain = self.gate.check(&request, "Lookup")?;
        let span = rpc_span("StoreService", "Lookup", &trust_domain);
        let store = self.store.clone();
        Ok(spawn_bidi(request.into_inner(), span, move |wire| {
            let store = store.clone();
            async move {
                let record_ref: RecordRef = wire.into();
                match store.lookup(&record_ref).await {
                    Ok(meta) => proto::LookupResponse {
                        meta: Some(meta.into()),
                        error: None,
                    },
                    Err(err) => proto::LookupResponse {
                        meta: None,
                        error: Some((&err).into()),
                    },
                }
            }
        }))
    }

    async fn delete(
        &self,
        request: Request<Streaming<proto::RecordRef>>,
    ) -> Result<Response<proto::DeleteResponse>, Status> {
        let trust_domain = self.gate.check(&request, "Delete")?;
        let span = rpc_span("StoreService", "Delete", &trust_domain);
        let mut input = request.into_inner();
        async {
            while let Some(wire) = input.message().await? {
                let record_ref: RecordRef = wire.into();
                self.store
                    .delete(&record_ref)
                    .await
                    .map_err(|e| to_status(&e))?;
            }
            Ok(Response::new(proto::DeleteResponse {}))
        }
        .instrument(span)
        .await
    }

    async fn push_referrer(
        &self,
        request: Request<Streaming<proto::PushReferrerRequest>>,
    ) -> Result<Response<Self::PushReferrerStream>, Status> {
        let trust_domain = self.gate.check(&request, "PushReferrer")?;
        let span = rpc_span("StoreService", "PushReferrer", &trust_domain);
        let store = self.store.clone();
        Ok(spawn_bidi(request.into_inner(), span, move |wire| {
            let store = store.clone();
            async move {
                let outcome = async {
                    let record_ref: RecordRef = wire
                        .record_ref
                        .map(Into::into)
                        .ok_or_else(|| Error::InvalidRequest("record ref is required".into()))?;
                    let referrer = wire.referrer.ok_or_else(|| {
                        Error::InvalidRequest("referrer payload is required".into())
                    })?;
                    let artifact = ReferrerArtifact {
                        artifact_type: referrer.r#type,
                        data: Bytes::from(referrer.data),
                        annotations: referrer.annotations,
                    };
                    store.push_referrer(&record_ref, &artifact).await
                }
                .await;
                match outcome {
                    Ok(()) => proto::PushReferrerResponse {
                        ok: true,
                        error: None,
                    },
                    Err(err) => proto::PushReferrerResponse {
                        ok: false,
                        error: Some((&err).into()),
                    },
                }
            }
        }))
    }

    async fn pull_referrer(
        &self,
        request: Request<Streaming<proto::PullReferrerRequest>>,
    ) -> Result<Response<Self::PullReferrerStream>, Status> {
        let trust_domain = self.gate.check(&request, "PullReferrer")?;
        let span = rpc_span("StoreService", "PullReferrer", &trust_domain);
        let store = self.store.clone();
        let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);
        let mut input = request.into_inner();

        let task = async move {
            loop {
                match input.message().await {
                    Ok(Some(wire)) => {
                        let outcome = async {
                            let record_ref: RecordRef =
                                wire.record_ref.map(Into::into).ok_or_else(|| {
                                    Error::InvalidRequest("record ref is required".into())
                                })?;
                            let filter = if wire.r#type.is_empty() {
                                None
                            } else {
                                Some(wire.r#type.as_str())
                            };
                            store.pull_referrers(&record_ref, filter).await
                        }
                        .await;

                        match outcome {
                            Ok(artifacts) => {
                                // One response per artifact; a request with
                                // no referrers produces nothing.
                                for artifact in artifacts {
                                    let response = proto::PullReferrerResponse {
                                        referrer: Some(proto::Referrer {
                                            r#type: artifact.artifact_type,
                                            data: artifact.data.to_vec(),
                                            annotations: artifact.annotations,
                                        }),
                                        error: None,
                                    };
                                    if tx.send(Ok(response)).await.is_err() {
                                        return;
                                    }
                                }
                            }
                            Err(err) => {
                                let response = proto::PullReferrerResponse {
                                    referrer: None,
                                    error: Some((&err).into()),
                                };
                                if tx.send(Ok(response)).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                    Ok(None) => return,
                    Err(status) => {
                        let _ = tx.send(Err(status)).await;
                        return;
                    }
                }
            }
        };
        tokio::spawn(task.instrument(span));

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
