//! The per-RPC authorization gate.
//!
//! Every service handler calls [`Gate::check`] before touching any stream.
//! Identity comes from request metadata: `x-trust-domain` and `x-user-id`,
//! populated by the client's identity layer. A request without a trust
//! domain is treated as the server's own domain, which covers local
//! single-node callers; external peers always present theirs.

use std::sync::Arc;

use metrics::counter;
use tonic::{Request, Status};

use cairn_authz::{Authorizer, PolicyInput};

/// Metadata key carrying the caller's trust domain.
pub const METADATA_TRUST_DOMAIN: &str = "x-trust-domain";
/// Metadata key carrying the caller's user identity.
pub const METADATA_USER_ID: &str = "x-user-id";

/// Authorization denials counter.
pub const AUTHZ_DENIED_TOTAL: &str = "cairn_authz_denied_total";

/// The authorization gate shared by every service.
#[derive(Clone)]
pub struct Gate {
    authorizer: Arc<dyn Authorizer>,
    own_trust_domain: String,
}

impl Gate {
    /// Creates a gate over the given policy evaluator.
    #[must_use]
    pub fn new(authorizer: Arc<dyn Authorizer>, own_trust_domain: impl Into<String>) -> Self {
        Self {
            authorizer,
            own_trust_domain: own_trust_domain.into(),
        }
    }

    /// Approves or rejects a call before any streaming begins.
    ///
    /// Returns the caller's resolved trust domain for span attribution.
    ///
    /// # Errors
    ///
    /// `PermissionDenied` when policy denies the triple.
    pub fn check<T>(&self, request: &Request<T>, api_method: &str) -> Result<String, Status> {
        let metadata = request.metadata();
        let trust_domain = metadata
            .get(METADATA_TRUST_DOMAIN)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .unwrap_or(&self.own_trust_domain);
        let user_id = metadata
            .get(METADATA_USER_ID)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        let input = PolicyInput {
            trust_domain,
            user_id,
            api_method,
        };
        if self.authorizer.authorize(&input) {
            return Ok(trust_domain.to_string());
        }

        counter!(AUTHZ_DENIED_TOTAL).increment(1);
        tracing::info!(
            trust_domain = trust_domain,
            user_id = user_id,
            api_method = api_method,
            "authorization denied"
        );
        Err(Status::permission_denied(format!(
            "trust domain {trust_domain:?} is not allowed to call {api_method}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_authz::RuleAuthorizer;
    use tonic::metadata::MetadataValue;

    fn gate() -> Gate {
        Gate::new(
            Arc::new(RuleAuthorizer::default_policy("example.org")),
            "example.org",
        )
    }

    fn request_with_domain(domain: &str) -> Request<()> {
        let mut request = Request::new(());
        request.metadata_mut().insert(
            METADATA_TRUST_DOMAIN,
            MetadataValue::try_from(domain).expect("valid metadata"),
        );
        request
    }

    #[test]
    fn missing_trust_domain_defaults_to_own_domain() {
        let gate = gate();
        assert!(gate.check(&Request::new(()), "Push").is_ok());
        assert!(gate.check(&Request::new(()), "Delete").is_ok());
    }

    #[test]
    fn external_domain_is_limited_to_read_only() {
        let gate = gate();
        let request = request_with_domain("peer.example.net");
        assert!(gate.check(&request, "Pull").is_ok());
        assert!(gate.check(&request, "Lookup").is_ok());

        let denied = gate.check(&request, "Push").unwrap_err();
        assert_eq!(denied.code(), tonic::Code::PermissionDenied);
    }

    #[test]
    fn own_domain_in_metadata_keeps_full_access() {
        let gate = gate();
        let request = request_with_domain("example.org");
        assert!(gate.check(&request, "CreateSync").is_ok());
    }
}
