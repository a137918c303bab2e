//! Server assembly: state construction and transport wiring.

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::server::Router;
use tonic::transport::Server;

use cairn_authz::{Authorizer, BundleAuthorizer, RuleAuthorizer};
use cairn_core::{Error, Result};
use cairn_proto::routing_service_server::RoutingServiceServer;
use cairn_proto::search_service_server::SearchServiceServer;
use cairn_proto::store_service_server::StoreServiceServer;
use cairn_proto::sync_service_server::SyncServiceServer;
use cairn_routing::RoutingIndex;
use cairn_store::{HttpRegistry, MemoryRegistry, RecordStore, Registry, MAX_RECORD_SIZE};
use cairn_sync::SyncManager;

use crate::config::{AuthzMode, Config};
use crate::gate::Gate;
use crate::services::{RoutingServiceImpl, SearchServiceImpl, StoreServiceImpl, SyncServiceImpl};

/// Wire message ceiling: the record cap plus envelope slack.
const MAX_MESSAGE_SIZE: usize = MAX_RECORD_SIZE + 1024 * 1024;

/// Everything a running server owns.
#[derive(Clone)]
pub struct AppState {
    /// The loaded configuration.
    pub config: Config,
    /// The record store.
    pub store: RecordStore,
    /// The routing index.
    pub index: RoutingIndex,
    /// The sync manager.
    pub sync: SyncManager,
    gate: Gate,
}

impl AppState {
    /// Builds the state graph from configuration: registry backend, store,
    /// index, authorizer and sync manager.
    ///
    /// # Errors
    ///
    /// Propagates configuration validation and policy bundle load failures.
    pub fn build(config: Config) -> Result<Self> {
        config.validate()?;

        let registry: Arc<dyn Registry> = match &config.oci.registry_url {
            Some(url) => {
                let mut registry = HttpRegistry::new(url, &config.oci.repository);
                if let (Some(user), Some(pass)) = (&config.oci.username, &config.oci.password) {
                    registry = registry.with_credentials(user, pass);
                }
                Arc::new(registry)
            }
            None => {
                tracing::info!("no registry URL configured, using the in-memory registry");
                Arc::new(MemoryRegistry::new())
            }
        };

        let store = RecordStore::new(registry);
        let index = RoutingIndex::new();

        let authorizer: Arc<dyn Authorizer> = match config.authz_mode {
            AuthzMode::Rule => Arc::new(RuleAuthorizer::default_policy(&config.trust_domain)),
            AuthzMode::Bundle => {
                let path = config.authz_bundle_path.as_ref().ok_or_else(|| {
                    Error::InvalidRequest("bundle mode requires a bundle path".into())
                })?;
                Arc::new(BundleAuthorizer::new(path)?)
            }
        };
        let gate = Gate::new(authorizer, &config.trust_domain);

        let sync = SyncManager::with_interval(
            store.clone(),
            index.clone(),
            Duration::from_secs(config.sync_interval_secs),
        );

        Ok(Self {
            config,
            store,
            index,
            sync,
            gate,
        })
    }

    /// Creates syncs for every configured peer. Failures are logged, not
    /// fatal; a bad peer must not keep the server down.
    pub fn start_sync_peers(&self) {
        for peer in &self.config.sync_peers {
            match self.sync.create_sync(peer) {
                Ok(sync_id) => {
                    tracing::info!(peer = %peer, sync_id = %sync_id, "peer sync started");
                }
                Err(err) => {
                    tracing::warn!(peer = %peer, error = %err, "failed to start peer sync");
                }
            }
        }
    }

    fn router(&self) -> Router {
        let store_service = StoreServiceImpl::new(self.store.clone(), self.gate.clone());
        let routing_service =
            RoutingServiceImpl::new(self.store.clone(), self.index.clone(), self.gate.clone());
        let search_service =
            SearchServiceImpl::new(self.store.clone(), self.index.clone(), self.gate.clone());
        let sync_service = SyncServiceImpl::new(
            self.sync.clone(),
            self.config.oci.clone(),
            self.gate.clone(),
        );

        Server::builder()
            .add_service(
                StoreServiceServer::new(store_service)
                    .max_decoding_message_size(MAX_MESSAGE_SIZE)
                    .max_encoding_message_size(MAX_MESSAGE_SIZE),
            )
            .add_service(RoutingServiceServer::new(routing_service))
            .add_service(SearchServiceServer::new(search_service))
            .add_service(SyncServiceServer::new(sync_service))
    }
}

/// Runs the server on the configured address until the process exits.
///
/// # Errors
///
/// Propagates state construction and transport failures.
pub async fn serve(config: Config) -> Result<()> {
    let address = config.server_address;
    let state = AppState::build(config)?;
    state.start_sync_peers();

    tracing::info!(address = %address, "directory server listening");
    state
        .router()
        .serve(address)
        .await
        .map_err(|e| Error::unavailable_with_source("server transport failed", e))
}

/// Runs the server on an already-bound listener. Used by tests that need
/// an ephemeral port.
///
/// # Errors
///
/// Propagates transport failures.
pub async fn serve_with_listener(state: AppState, listener: TcpListener) -> Result<()> {
    state.start_sync_peers();
    state
        .router()
        .serve_with_incoming(TcpListenerStream::new(listener))
        .await
        .map_err(|e| Error::unavailable_with_source("server transport failed", e))
}
