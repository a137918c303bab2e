//! The sync service: sync CRUD and registry credential vending.

use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use uuid::Uuid;

use cairn_core::Error;
use cairn_proto as proto;
use cairn_proto::status::to_status;
use cairn_proto::sync_service_server::SyncService;
use cairn_sync::{SyncConfig, SyncManager};

use crate::config::OciConfig;
use crate::gate::Gate;

const RESPONSE_BUFFER: usize = 10;

/// Sync service implementation.
#[derive(Clone)]
pub struct SyncServiceImpl {
    manager: SyncManager,
    oci: OciConfig,
    gate: Gate,
}

impl SyncServiceImpl {
    /// Creates the service over the sync manager and registry settings.
    #[must_use]
    pub fn new(manager: SyncManager, oci: OciConfig, gate: Gate) -> Self {
        Self { manager, oci, gate }
    }
}

fn parse_sync_id(raw: &str) -> Result<Uuid, Status> {
    Uuid::parse_str(raw).map_err(|e| {
        to_status(&Error::InvalidRequest(format!(
            "sync id must be a UUID, got {raw:?}: {e}"
        )))
    })
}

fn to_item(config: &SyncConfig) -> proto::SyncItem {
    proto::SyncItem {
        sync_id: config.sync_id.to_string(),
        remote_url: config.remote_url.clone(),
        created_at: config.created_at.to_rfc3339(),
        status: config.status.to_string(),
    }
}

#[tonic::async_trait]
impl SyncService for SyncServiceImpl {
    type ListSyncsStream = ReceiverStream<Result<proto::ListSyncsResponse, Status>>;

    async fn create_sync(
        &self,
        request: Request<proto::CreateSyncRequest>,
    ) -> Result<Response<proto::CreateSyncResponse>, Status> {
        self.gate.check(&request, "CreateSync")?;
        let remote_url = request.into_inner().remote_url;
        let sync_id = self
            .manager
            .create_sync(remote_url)
            .map_err(|e| to_status(&e))?;
        Ok(Response::new(proto::CreateSyncResponse {
            sync_id: sync_id.to_string(),
        }))
    }

    async fn list_syncs(
        &self,
        request: Request<proto::ListSyncsRequest>,
    ) -> Result<Response<Self::ListSyncsStream>, Status> {
        self.gate.check(&request, "ListSyncs")?;
        let configs = self.manager.list_syncs().map_err(|e| to_status(&e))?;

        let (tx, rx) = mpsc::channel(RESPONSE_BUFFER);
        tokio::spawn(async move {
            for config in configs {
                let response = proto::ListSyncsResponse {
                    item: Some(to_item(&config)),
                };
                if tx.send(Ok(response)).await.is_err() {
                    return;
                }
            }
        });

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn get_sync(
        &self,
        request: Request<proto::GetSyncRequest>,
    ) -> Result<Response<proto::GetSyncResponse>, Status> {
        self.gate.check(&request, "GetSync")?;
        let sync_id = parse_sync_id(&request.into_inner().sync_id)?;
        let config = self.manager.get_sync(sync_id).map_err(|e| to_status(&e))?;
        Ok(Response::new(proto::GetSyncResponse {
            item: Some(to_item(&config)),
        }))
    }

    async fn delete_sync(
        &self,
        request: Request<proto::DeleteSyncRequest>,
    ) -> Result<Response<proto::DeleteSyncResponse>, Status> {
        self.gate.check(&request, "DeleteSync")?;
        let sync_id = parse_sync_id(&request.into_inner().sync_id)?;
        self.manager
            .delete_sync(sync_id)
            .map_err(|e| to_status(&e))?;
        Ok(Response::new(proto::DeleteSyncResponse {}))
    }

    async fn request_registry_credentials(
        &self,
        request: Request<proto::RequestRegistryCredentialsRequest>,
    ) -> Result<Response<proto::RequestRegistryCredentialsResponse>, Status> {
        self.gate.check(&request, "RequestRegistryCredentials")?;
        Ok(Response::new(proto::RequestRegistryCredentialsResponse {
            registry_url: self.oci.registry_url.clone().unwrap_or_default(),
            repository: self.oci.repository.clone(),
            username: self.oci.username.clone().unwrap_or_default(),
            password: self.oci.password.clone().unwrap_or_default(),
        }))
    }
}
