//! # cairn-authz
//!
//! Authorization policy evaluation for the Cairn directory.
//!
//! Every RPC is gated on a `(trust_domain, user_id, api_method)` triple
//! before any streaming begins. Two interchangeable backends implement the
//! [`Authorizer`] contract:
//!
//! - [`rule::RuleAuthorizer`]: an in-memory set of wildcard allow rules
//!   with a sane default policy
//! - [`bundle::BundleAuthorizer`]: a declarative policy bundle loaded from
//!   disk and hot-reloaded on change
//!
//! Evaluation never errors: anything that goes wrong denies.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod bundle;
pub mod rule;

pub use bundle::BundleAuthorizer;
pub use rule::RuleAuthorizer;

/// The read-only API methods every external trust domain may call under the
/// default policy.
pub const READ_ONLY_METHODS: [&str; 4] = [
    "Pull",
    "PullReferrer",
    "Lookup",
    "RequestRegistryCredentials",
];

/// The evaluation input for one RPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyInput<'a> {
    /// The caller's trust domain.
    pub trust_domain: &'a str,
    /// The caller's user identifier.
    pub user_id: &'a str,
    /// The API method being invoked (e.g. `Push`).
    pub api_method: &'a str,
}

/// The authorization contract.
///
/// Implementations must be cheap to call on the hot path: evaluation works
/// on an immutable snapshot, and reloading swaps snapshots atomically so
/// in-flight calls keep a consistent view.
pub trait Authorizer: Send + Sync + 'static {
    /// Returns true when the call is allowed. Evaluation errors deny.
    fn authorize(&self, input: &PolicyInput<'_>) -> bool;
}
