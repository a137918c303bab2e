//! Client connection and identity plumbing.

use tonic::metadata::MetadataValue;
use tonic::service::interceptor::InterceptedService;
use tonic::service::Interceptor;
use tonic::transport::{Channel, Endpoint};
use tonic::{Request, Status};

use cairn_core::{Error, Result};
use cairn_proto::routing_service_client::RoutingServiceClient;
use cairn_proto::search_service_client::SearchServiceClient;
use cairn_proto::store_service_client::StoreServiceClient;
use cairn_proto::sync_service_client::SyncServiceClient;

/// Metadata key carrying the caller's trust domain.
pub const METADATA_TRUST_DOMAIN: &str = "x-trust-domain";
/// Metadata key carrying the caller's user identity.
pub const METADATA_USER_ID: &str = "x-user-id";

/// Caller identity attached to every request.
///
/// In production deployments the trust domain comes from the workload
/// identity layer; this client-side identity covers deployments that carry
/// it in request metadata instead.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    /// The caller's trust domain.
    pub trust_domain: String,
    /// The caller's user identifier.
    pub user_id: String,
}

impl Identity {
    /// Creates an identity with both fields set.
    #[must_use]
    pub fn new(trust_domain: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            trust_domain: trust_domain.into(),
            user_id: user_id.into(),
        }
    }
}

impl Interceptor for Identity {
    fn call(&mut self, mut request: Request<()>) -> std::result::Result<Request<()>, Status> {
        if !self.trust_domain.is_empty() {
            let value = MetadataValue::try_from(self.trust_domain.as_str())
                .map_err(|_| Status::invalid_argument("trust domain is not valid metadata"))?;
            request.metadata_mut().insert(METADATA_TRUST_DOMAIN, value);
        }
        if !self.user_id.is_empty() {
            let value = MetadataValue::try_from(self.user_id.as_str())
                .map_err(|_| Status::invalid_argument("user id is not valid metadata"))?;
            request.metadata_mut().insert(METADATA_USER_ID, value);
        }
        Ok(request)
    }
}

pub(crate) type Service = InterceptedService<Channel, Identity>;

/// A connected Cairn directory client.
///
/// Cheap to clone; all service stubs share one transport channel.
#[derive(Debug, Clone)]
pub struct Client {
    pub(crate) store: StoreServiceClient<Service>,
    pub(crate) routing: RoutingServiceClient<Service>,
    pub(crate) search: SearchServiceClient<Service>,
    pub(crate) sync: SyncServiceClient<Service>,
}

impl Client {
    /// Connects to a directory server with an anonymous identity.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` when the endpoint cannot be reached and
    /// `InvalidRequest` when the URL is malformed.
    pub async fn connect(url: impl Into<String>) -> Result<Self> {
        Self::connect_with_identity(url, Identity::default()).await
    }

    /// Connects to a directory server with the given identity.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` when the endpoint cannot be reached and
    /// `InvalidRequest` when the URL is malformed.
    pub async fn connect_with_identity(
        url: impl Into<String>,
        identity: Identity,
    ) -> Result<Self> {
        Self::connect_with_options(url, identity, None).await
    }

    /// Connects with an identity and an optional per-RPC timeout.
    ///
    /// The timeout applies to every request issued over the channel,
    /// including each streaming call as a whole.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` when the endpoint cannot be reached and
    /// `InvalidRequest` when the URL is malformed.
    pub async fn connect_with_options(
        url: impl Into<String>,
        identity: Identity,
        timeout: Option<std::time::Duration>,
    ) -> Result<Self> {
        let url = url.into();
        let mut endpoint = Endpoint::from_shared(url.clone())
            .map_err(|e| Error::InvalidRequest(format!("invalid directory URL {url}: {e}")))?;
        if let Some(timeout) = timeout {
            endpoint = endpoint.timeout(timeout);
        }
        let channel = endpoint
            .connect()
            .await
            .map_err(|e| Error::unavailable_with_source(format!("failed to connect to {url}"), e))?;
        Ok(Self::from_channel(channel, identity))
    }

    /// Builds a client over an established channel.
    #[must_use]
    pub fn from_channel(channel: Channel, identity: Identity) -> Self {
        Self {
            store: StoreServiceClient::with_interceptor(channel.clone(), identity.clone()),
            routing: RoutingServiceClient::with_interceptor(channel.clone(), identity.clone()),
            search: SearchServiceClient::with_interceptor(channel.clone(), identity.clone()),
            sync: SyncServiceClient::with_interceptor(channel, identity),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_attaches_metadata() {
        let mut identity = Identity::new("example.org", "alice");
        let request = identity.call(Request::new(())).expect("intercept");
        assert_eq!(
            request.metadata().get(METADATA_TRUST_DOMAIN).unwrap(),
            "example.org"
        );
        assert_eq!(request.metadata().get(METADATA_USER_ID).unwrap(), "alice");
    }

    #[test]
    fn empty_identity_adds_nothing() {
        let mut identity = Identity::default();
        let request = identity.call(Request::new(())).expect("intercept");
        assert!(request.metadata().get(METADATA_TRUST_DOMAIN).is_none());
        assert!(request.metadata().get(METADATA_USER_ID).is_none());
    }

    #[tokio::test]
    async fn connect_rejects_malformed_urls() {
        let err = Client::connect("not a url").await.unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }
}
