//! Sync management operations.

use cairn_core::{Error, Result};
use cairn_proto as proto;
use cairn_proto::status::from_status;

use crate::client::Client;

impl Client {
    /// Creates a sync against a remote directory; returns the sync ID.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` on a malformed remote URL.
    pub async fn create_sync(&self, remote_url: impl Into<String>) -> Result<String> {
        let mut client = self.sync.clone();
        let response = client
            .create_sync(proto::CreateSyncRequest {
                remote_url: remote_url.into(),
            })
            .await
            .map_err(|s| from_status(&s))?;
        Ok(response.into_inner().sync_id)
    }

    /// Lists all configured syncs.
    ///
    /// # Errors
    ///
    /// Returns the first stream error encountered.
    pub async fn list_syncs(&self) -> Result<Vec<proto::SyncItem>> {
        let mut client = self.sync.clone();
        let mut stream = client
            .list_syncs(proto::ListSyncsRequest {})
            .await
            .map_err(|s| from_status(&s))?
            .into_inner();

        let mut items = Vec::new();
        loop {
            match stream.message().await {
                Ok(Some(response)) => {
                    if let Some(item) = response.item {
                        items.push(item);
                    }
                }
                Ok(None) => return Ok(items),
                Err(status) => return Err(from_status(&status)),
            }
        }
    }

    /// Fetches one sync by ID.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown sync IDs.
    pub async fn get_sync(&self, sync_id: impl Into<String>) -> Result<proto::SyncItem> {
        let mut client = self.sync.clone();
        let response = client
            .get_sync(proto::GetSyncRequest {
                sync_id: sync_id.into(),
            })
            .await
            .map_err(|s| from_status(&s))?;
        response
            .into_inner()
            .item
            .ok_or_else(|| Error::Internal("sync response carried no item".into()))
    }

    /// Deletes a sync and stops its worker.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown sync IDs.
    pub async fn delete_sync(&self, sync_id: impl Into<String>) -> Result<()> {
        let mut client = self.sync.clone();
        client
            .delete_sync(proto::DeleteSyncRequest {
                sync_id: sync_id.into(),
            })
            .await
            .map(|_| ())
            .map_err(|s| from_status(&s))
    }

    /// Requests the backing registry's connection details.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` when policy denies credential vending.
    pub async fn request_registry_credentials(
        &self,
    ) -> Result<proto::RequestRegistryCredentialsResponse> {
        let mut client = self.sync.clone();
        let response = client
            .request_registry_credentials(proto::RequestRegistryCredentialsRequest {})
            .await
            .map_err(|s| from_status(&s))?;
        Ok(response.into_inner())
    }
}
