//! Server configuration.
//!
//! Environment-backed with the `DIRECTORY_` prefix. Every variable is
//! optional except where validation says otherwise; parse failures are
//! errors rather than silent defaults.

use std::net::SocketAddr;

use cairn_core::{Error, LogFormat, Result};

/// Default listen address.
pub const DEFAULT_SERVER_ADDRESS: &str = "0.0.0.0:8888";
/// Default OCI repository within the registry.
pub const DEFAULT_OCI_REPOSITORY: &str = "cairn/records";
/// Default trust domain for single-node deployments.
pub const DEFAULT_TRUST_DOMAIN: &str = "cairn.local";
/// Default seconds between sync cycles.
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 60;

/// Which authorization backend to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthzMode {
    /// In-memory wildcard rules (the default policy).
    #[default]
    Rule,
    /// Declarative bundle loaded from disk, hot-reloaded on change.
    Bundle,
}

/// Registry connection settings.
#[derive(Clone, Default)]
pub struct OciConfig {
    /// Registry base URL; `None` selects the in-memory registry.
    pub registry_url: Option<String>,
    /// Repository for record manifests.
    pub repository: String,
    /// Optional basic-auth username.
    pub username: Option<String>,
    /// Optional basic-auth password.
    pub password: Option<String>,
}

impl std::fmt::Debug for OciConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OciConfig")
            .field("registry_url", &self.registry_url)
            .field("repository", &self.repository)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Configuration for the Cairn directory server.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address for the RPC server.
    pub server_address: SocketAddr,
    /// Registry connection settings.
    pub oci: OciConfig,
    /// Authorization backend selection.
    pub authz_mode: AuthzMode,
    /// Bundle path, required in bundle mode.
    pub authz_bundle_path: Option<String>,
    /// This server's trust domain.
    pub trust_domain: String,
    /// Remote directories to sync from at startup.
    pub sync_peers: Vec<String>,
    /// Seconds between sync cycles.
    pub sync_interval_secs: u64,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_address: DEFAULT_SERVER_ADDRESS
                .parse()
                .unwrap_or_else(|_| SocketAddr::from(([0, 0, 0, 0], 8888))),
            oci: OciConfig {
                registry_url: None,
                repository: DEFAULT_OCI_REPOSITORY.to_string(),
                username: None,
                password: None,
            },
            authz_mode: AuthzMode::Rule,
            authz_bundle_path: None,
            trust_domain: DEFAULT_TRUST_DOMAIN.to_string(),
            sync_peers: Vec::new(),
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            log_format: LogFormat::Pretty,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// Supported variables:
    /// - `DIRECTORY_SERVER_ADDRESS` (default `0.0.0.0:8888`)
    /// - `DIRECTORY_OCI_REGISTRY_URL` (unset selects the in-memory registry)
    /// - `DIRECTORY_OCI_REPOSITORY` (default `cairn/records`)
    /// - `DIRECTORY_OCI_USERNAME`
    /// - `DIRECTORY_OCI_PASSWORD`
    /// - `DIRECTORY_AUTHZ_MODE` (`rule` | `bundle`)
    /// - `DIRECTORY_AUTHZ_BUNDLE_PATH` (required in bundle mode)
    /// - `DIRECTORY_TRUST_DOMAIN` (default `cairn.local`)
    /// - `DIRECTORY_SYNC_PEERS` (comma-separated remote URLs)
    /// - `DIRECTORY_SYNC_INTERVAL_SECS` (default 60)
    /// - `DIRECTORY_LOG_FORMAT` (`json` | `pretty`)
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is present but cannot be parsed, or
    /// if validation fails (e.g. bundle mode without a bundle path).
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(address) = env_string("DIRECTORY_SERVER_ADDRESS") {
            config.server_address = address.parse().map_err(|e| {
                Error::InvalidRequest(format!(
                    "DIRECTORY_SERVER_ADDRESS must be host:port, got {address}: {e}"
                ))
            })?;
        }

        config.oci.registry_url = env_string("DIRECTORY_OCI_REGISTRY_URL");
        if let Some(repository) = env_string("DIRECTORY_OCI_REPOSITORY") {
            config.oci.repository = repository;
        }
        config.oci.username = env_string("DIRECTORY_OCI_USERNAME");
        config.oci.password = env_string("DIRECTORY_OCI_PASSWORD");

        if let Some(mode) = env_string("DIRECTORY_AUTHZ_MODE") {
            config.authz_mode = parse_authz_mode(&mode)?;
        }
        config.authz_bundle_path = env_string("DIRECTORY_AUTHZ_BUNDLE_PATH");

        if let Some(domain) = env_string("DIRECTORY_TRUST_DOMAIN") {
            config.trust_domain = domain;
        }

        if let Some(peers) = env_string("DIRECTORY_SYNC_PEERS") {
            config.sync_peers = peers
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(secs) = env_string("DIRECTORY_SYNC_INTERVAL_SECS") {
            config.sync_interval_secs = secs.parse().map_err(|e| {
                Error::InvalidRequest(format!(
                    "DIRECTORY_SYNC_INTERVAL_SECS must be a u64: {e}"
                ))
            })?;
            if config.sync_interval_secs == 0 {
                return Err(Error::InvalidRequest(
                    "DIRECTORY_SYNC_INTERVAL_SECS must be greater than 0".to_string(),
                ));
            }
        }

        if let Some(format) = env_string("DIRECTORY_LOG_FORMAT") {
            config.log_format = parse_log_format(&format)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validates cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns `InvalidRequest` when bundle mode lacks a bundle path or the
    /// trust domain is empty.
    pub fn validate(&self) -> Result<()> {
        if self.authz_mode == AuthzMode::Bundle && self.authz_bundle_path.is_none() {
            return Err(Error::InvalidRequest(
                "DIRECTORY_AUTHZ_BUNDLE_PATH is required when DIRECTORY_AUTHZ_MODE=bundle"
                    .to_string(),
            ));
        }
        if self.trust_domain.trim().is_empty() {
            return Err(Error::InvalidRequest(
                "DIRECTORY_TRUST_DOMAIN cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn parse_authz_mode(value: &str) -> Result<AuthzMode> {
    match value.to_ascii_lowercase().as_str() {
        "rule" => Ok(AuthzMode::Rule),
        "bundle" => Ok(AuthzMode::Bundle),
        other => Err(Error::InvalidRequest(format!(
            "DIRECTORY_AUTHZ_MODE must be one of: rule, bundle (got {other})"
        ))),
    }
}

fn parse_log_format(value: &str) -> Result<LogFormat> {
    match value.to_ascii_lowercase().as_str() {
        "json" => Ok(LogFormat::Json),
        "pretty" => Ok(LogFormat::Pretty),
        other => Err(Error::InvalidRequest(format!(
            "DIRECTORY_LOG_FORMAT must be one of: json, pretty (got {other})"
        ))),
    }
}
