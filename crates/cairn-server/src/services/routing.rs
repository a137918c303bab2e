//! The routing service: publish, unpublish and label listings.

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::{Request, Response, Status};

use cairn_core::{Error, RecordRef};
use cairn_proto as proto;
use cairn_proto::routing_service_server::RoutingService;
use cairn_proto::status::to_status;
use cairn_routing::RoutingIndex;
use cairn_store::RecordStore;

use crate::gate::Gate;

const RESPONSE_BUFFER: usize = 10;

/// Routing service implementation.
///
/// Publish requires the record to exist in the store: the record is pulled
/// to derive its labels, which doubles as the existence check.
#[derive(Clone)]
pub struct RoutingServiceImpl {
    store: RecordStore,
    index: RoutingIndex,
    gate: Gate,
}

impl RoutingServiceImpl {
    /// Creates the service over the store, the index and the shared gate.
    #[must_use]
    pub fn new(store: RecordStore, index: RoutingIndex, gate: Gate) -> Self {
        Self { store, index, gate }
    }
}

fn required_ref(record_ref: Option<proto::RecordRef>) -> Result<RecordRef, Status> {
    record_ref
        .map(Into::into)
        .ok_or_else(|| to_status(&Error::InvalidRequest("record ref is required".into())))
}

#[tonic::async_trait]
impl RoutingService for RoutingServiceImpl {
    type ListStream = ReceiverStream<Result<proto::ListResponse, Status>>;
    type LegacyListStream = ReceiverStream<Result<proto::LegacyListResponse, Status>>;

    async fn publish(
        &self,
        request: Request<proto::PublishRequest>,
    ) -> Result<Response<proto::PublishResponse>, Status> {
        self.gate.check(&request, "Publish")?;
        let record_ref = required_ref(request.into_inner().record_ref)?;

        // Pulling doubles as the existence check: publishing an absent CID
        // is NotFound.
        let record = self
            .store
            .pull(&record_ref)
            .await
            .map_err(|e| to_status(&e))?;
        let labels = self
            .index
            .publish(&record_ref.cid, &record)
            .map_err(|e| to_status(&e))?;

        tracing::info!(cid = %record_ref.cid, labels = labels.len(), "record published");
        Ok(Response::new(proto::PublishResponse {}))
    }

    async fn unpublish(
        &self,
        request: Request<proto::UnpublishRequest>,
    ) -> Result<Response<proto::UnpublishResponse>, Status> {
        self.gate.check(&request, "Unpublish")?;
        let record_ref = required_ref(request.into_inner().record_ref)?;

        self.index
            .unpublish(&record_ref.cid)
            .map_err(|e| to_status(&e))?;

        tracing::info!(cid = %record_ref.cid, "record unpublished");
        Ok(Response::new(proto::UnpublishResponse {}))
    }

    async fn list(
        &self,
        request: Request<proto::ListRequest>,
    ) -> Result<Response<Self::ListStream>, Status> {
        self.gate.check(&request, "List")?;
        let labels = request.into_inner().labels;

        let cancel = CancellationToken::new();
        let mut records = self.index.list_stream(cancel.clone(), labels);
        let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);

        tokio::spawn(async move {
            // Cancel the index stream when the client goes away.
            let _drop_guard = cancel.drop_guard();
            while let Some(item) = records.recv().await {
                let response = match item {
                    Ok(record) => Ok(proto::ListResponse {
                        cid: record.cid,
                        labels: record.labels,
                    }),
                    Err(err) => Err(to_status(&err)),
                };
                if tx.send(response).await.is_err() {
                    return;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn legacy_list(
        &self,
        request: Request<proto::LegacyListRequest>,
    ) -> Result<Response<Self::LegacyListStream>, Status> {
        self.gate.check(&request, "LegacyList")?;
        let labels = request.into_inner().labels;

        let edges = self.index.edges(&labels).map_err(|e| to_status(&e))?;
        let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);

        tokio::spawn(async move {
            for edge in edges {
                let response = proto::LegacyListResponse {
                    label: edge.label,
                    cid: edge.cid,
                };
                if tx.send(Ok(response)).await.is_err() {
                    return;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }
}
