//! Sync configuration store and worker actors.
//!
//! Each sync owns one worker task that periodically connects to the remote
//! directory, discovers published records and imports the ones missing
//! locally through the regular store and routing contracts. Deleting a sync
//! cancels its worker.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use cairn_client::Client;
use cairn_core::{Error, RecordRef, Result};
use cairn_routing::RoutingIndex;
use cairn_store::RecordStore;

/// Default interval between sync cycles.
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(60);

/// Lifecycle state of a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStatus {
    /// Created, no cycle completed yet.
    Pending,
    /// The last cycle succeeded.
    Active,
    /// The last cycle failed; the worker retries on its next tick.
    Failed,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// One sync configuration.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Unique sync identifier.
    pub sync_id: Uuid,
    /// Remote directory URL.
    pub remote_url: String,
    /// When the sync was created.
    pub created_at: DateTime<Utc>,
    /// Current lifecycle state.
    pub status: SyncStatus,
}

struct SyncEntry {
    config: SyncConfig,
    cancel: CancellationToken,
}

type SyncMap = Arc<RwLock<HashMap<Uuid, SyncEntry>>>;

/// Owns every sync configuration and its worker task.
#[derive(Clone)]
pub struct SyncManager {
    syncs: SyncMap,
    store: RecordStore,
    index: RoutingIndex,
    interval: Duration,
}

impl SyncManager {
    /// Creates a manager importing into the given store and routing index.
    #[must_use]
    pub fn new(store: RecordStore, index: RoutingIndex) -> Self {
        Self::with_interval(store, index, DEFAULT_SYNC_INTERVAL)
    }

    /// Creates a manager with an explicit cycle interval.
    #[must_use]
    pub fn with_interval(store: RecordStore, index: RoutingIndex, interval: Duration) -> Self {
        Self {
            syncs: Arc::new(RwLock::new(HashMap::new())),
            store,
            index,
            interval,
        }
    }

    /// Creates a sync against a remote directory and starts its worker.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` when the remote URL is not an HTTP(S) endpoint.
    pub fn create_sync(&self, remote_url: impl Into<String>) -> Result<Uuid> {
        let remote_url = remote_url.into();
        if !remote_url.starts_with("http://") && !remote_url.starts_with("https://") {
            return Err(Error::InvalidRequest(format!(
                "remote URL must be http(s), got {remote_url}"
            )));
        }

        let sync_id = Uuid::new_v4();
        let cancel = CancellationToken::new();
        let config = SyncConfig {
            sync_id,
            remote_url: remote_url.clone(),
            created_at: Utc::now(),
            status: SyncStatus::Pending,
        };

        self.write()?.insert(
            sync_id,
            SyncEntry {
                config,
                cancel: cancel.clone(),
            },
        );

        let worker = Worker {
            sync_id,
            remote_url,
            store: self.store.clone(),
            index: self.index.clone(),
            syncs: Arc::clone(&self.syncs),
            interval: self.interval,
        };
        tokio::spawn(worker.run(cancel));

        tracing::info!(sync_id = %sync_id, "sync created");
        Ok(sync_id)
    }

    /// Lists all configured syncs, newest last.
    ///
    /// # Errors
    ///
    /// `Internal` if the lock is poisoned.
    pub fn list_syncs(&self) -> Result<Vec<SyncConfig>> {
        let syncs = self.read()?;
        let mut configs: Vec<SyncConfig> =
            syncs.values().map(|entry| entry.config.clone()).collect();
        configs.sort_by_key(|c| c.created_at);
        Ok(configs)
    }

    /// Fetches one sync by ID.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown sync IDs.
    pub fn get_sync(&self, sync_id: Uuid) -> Result<SyncConfig> {
        self.read()?
            .get(&sync_id)
            .map(|entry| entry.config.clone())
            .ok_or_else(|| Error::not_found("sync", sync_id))
    }

    /// Deletes a sync and halts its worker.
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown sync IDs.
    pub fn delete_sync(&self, sync_id: Uuid) -> Result<()> {
        let entry = self
            .write()?
            .remove(&sync_id)
            .ok_or_else(|| Error::not_found("sync", sync_id))?;
        entry.cancel.cancel();
        tracing::info!(sync_id = %sync_id, "sync deleted");
        Ok(())
    }

    /// Cancels every worker. Called on server shutdown.
    ///
    /// # Errors
    ///
    /// `Internal` if the lock is poisoned.
    pub fn shutdown(&self) -> Result<()> {
        for entry in self.write()?.values() {
            entry.cancel.cancel();
        }
        Ok(())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<Uuid, SyncEntry>>> {
        self.syncs
            .read()
            .map_err(|_| Error::Internal("sync map lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<Uuid, SyncEntry>>> {
        self.syncs
            .write()
            .map_err(|_| Error::Internal("sync map lock poisoned".into()))
    }
}

struct Worker {
    sync_id: Uuid,
    remote_url: String,
    store: RecordStore,
    index: RoutingIndex,
    syncs: SyncMap,
    interval: Duration,
}

impl Worker {
    async fn run(self, cancel: CancellationToken) {
        loop {
            match self.cycle().await {
                Ok(imported) => {
                    if imported > 0 {
                        tracing::info!(
                            sync_id = %self.sync_id,
                            imported = imported,
                            "sync cycle imported records"
                        );
                    }
                    self.set_status(SyncStatus::Active);
                }
                Err(err) => {
                    // No internal retry; the next tick is the retry.
                    tracing::warn!(
                        sync_id = %self.sync_id,
                        remote = %self.remote_url,
                        error = %err,
                        "sync cycle failed"
                    );
                    self.set_status(SyncStatus::Failed);
                }
            }

            tokio::select! {
                () = cancel.cancelled() => return,
                () = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// One pull cycle: discover remote records, import the missing ones.
    async fn cycle(&self) -> Result<usize> {
        let client = Client::connect(self.remote_url.clone()).await?;
        let remote_cids = client.search(Vec::new(), 0).await?;

        let mut imported = 0usize;
        for cid in remote_cids {
            let record_ref = RecordRef::new(&cid);
            match self.store.lookup(&record_ref).await {
                Ok(_) => continue,
                Err(Error::NotFound { .. }) => {}
                Err(err) => return Err(err),
            }

            let record = client.pull(&record_ref).await?;
            let stored = self.store.push(&record).await?;
            self.index.publish(&stored.cid, &record)?;
            imported += 1;
        }
        Ok(imported)
    }

    fn set_status(&self, status: SyncStatus) {
        if let Ok(mut syncs) = self.syncs.write() {
            if let Some(entry) = syncs.get_mut(&self.sync_id) {
                entry.config.status = status;
            }
        }
    }
}
