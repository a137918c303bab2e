//! Declarative policy bundles with hot reload.
//!
//! A bundle is a JSON document of allow rules evaluated against
//! `{api_method, user_id, trust_domain}`. The file is watched; on change
//! the bundle is re-parsed and the shared snapshot swapped atomically, so
//! in-flight authorization calls keep using the prior snapshot.
//!
//! ```json
//! {
//!   "allow": [
//!     { "trust_domain": "example.org", "api_method": "*" },
//!     { "trust_domain": "*", "api_method": "Pull", "user_id": "*" }
//!   ]
//! }
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use notify::{RecursiveMode, Watcher};
use serde::Deserialize;

use cairn_core::{Error, Result};

use crate::{Authorizer, PolicyInput};

fn default_pattern() -> String {
    "*".to_string()
}

/// One allow rule in a bundle. Missing fields default to the wildcard.
#[derive(Debug, Clone, Deserialize)]
pub struct BundleRule {
    /// Trust domain pattern.
    #[serde(default = "default_pattern")]
    pub trust_domain: String,
    /// User identifier pattern.
    #[serde(default = "default_pattern")]
    pub user_id: String,
    /// API method pattern.
    #[serde(default = "default_pattern")]
    pub api_method: String,
}

impl BundleRule {
    fn matches(&self, input: &PolicyInput<'_>) -> bool {
        matches_pattern(&self.trust_domain, input.trust_domain)
            && matches_pattern(&self.user_id, input.user_id)
            && matches_pattern(&self.api_method, input.api_method)
    }
}

fn matches_pattern(pattern: &str, value: &str) -> bool {
    pattern == "*" || pattern == value
}

/// A parsed policy bundle.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyBundle {
    /// The allow rules; a call is permitted when any rule matches.
    #[serde(default)]
    pub allow: Vec<BundleRule>,
}

impl PolicyBundle {
    /// Loads and parses a bundle file.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` when the file is missing or not valid bundle JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::InvalidRequest(format!("failed to read policy bundle {}: {e}", path.display()))
        })?;
        serde_json::from_str(&raw).map_err(|e| {
            Error::InvalidRequest(format!(
                "failed to parse policy bundle {}: {e}",
                path.display()
            ))
        })
    }
}

/// Bundle-backed policy evaluator with filesystem hot reload.
#[derive(Debug)]
pub struct BundleAuthorizer {
    snapshot: Arc<ArcSwap<PolicyBundle>>,
    // Held for its side effect; dropping it stops the watch. The mutex only
    // exists to make the platform watcher shareable across threads.
    _watcher: std::sync::Mutex<notify::RecommendedWatcher>,
}

impl BundleAuthorizer {
    /// Loads the bundle and starts watching the path for changes.
    ///
    /// A change event triggers a re-parse; parse failures keep the previous
    /// snapshot and log the error, so a botched edit never opens the gate.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` when the initial load fails, `Internal` when the
    /// watcher cannot be installed.
    pub fn new(bundle_path: impl Into<PathBuf>) -> Result<Self> {
        let path = bundle_path.into();
        let initial = PolicyBundle::load(&path)?;
        let snapshot = Arc::new(ArcSwap::from_pointee(initial));

        let reload_snapshot = Arc::clone(&snapshot);
        let reload_path = path.clone();
        let mut watcher = notify::recommended_watcher(
            move |event: std::result::Result<notify::Event, notify::Error>| {
                match event {
                    Ok(_) => match PolicyBundle::load(&reload_path) {
                        Ok(bundle) => {
                            reload_snapshot.store(Arc::new(bundle));
                            tracing::info!(
                                path = %reload_path.display(),
                                "policy bundle reloaded"
                            );
                        }
                        Err(err) => {
                            tracing::error!(
                                path = %reload_path.display(),
                                error = %err,
                                "failed to reload policy bundle, keeping previous snapshot"
                            );
                        }
                    },
                    Err(err) => {
                        tracing::error!(error = %err, "policy bundle watcher error");
                    }
                }
            },
        )
        .map_err(|e| Error::Internal(format!("failed to create policy watcher: {e}")))?;

        watcher
            .watch(&path, RecursiveMode::NonRecursive)
            .map_err(|e| {
                Error::Internal(format!(
                    "failed to watch policy bundle {}: {e}",
                    path.display()
                ))
            })?;

        Ok(Self {
            snapshot,
            _watcher: std::sync::Mutex::new(watcher),
        })
    }

    /// Replaces the active snapshot directly. Test hook; production reloads
    /// go through the filesystem watcher.
    pub fn swap(&self, bundle: PolicyBundle) {
        self.snapshot.store(Arc::new(bundle));
    }
}

impl Authorizer for BundleAuthorizer {
    fn authorize(&self, input: &PolicyInput<'_>) -> bool {
        let bundle = self.snapshot.load();
        bundle.allow.iter().any(|rule| rule.matches(input))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_bundle(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("policy.json");
        let mut file = std::fs::File::create(&path).expect("create bundle");
        file.write_all(contents.as_bytes()).expect("write bundle");
        file.sync_all().expect("sync bundle");
        path
    }

    fn input<'a>(trust_domain: &'a str, api_method: &'a str) -> PolicyInput<'a> {
        PolicyInput {
            trust_domain,
            user_id: "tester",
            api_method,
        }
    }

    #[test]
    fn bundle_rules_gate_by_all_three_fields() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_bundle(
            &dir,
            r#"{"allow":[
                {"trust_domain":"example.org","api_method":"*"},
                {"trust_domain":"*","api_method":"Pull"},
                {"trust_domain":"*","api_method":"Delete","user_id":"admin"}
            ]}"#,
        );
        let authz = BundleAuthorizer::new(path).expect("load bundle");

        assert!(authz.authorize(&input("example.org", "Push")));
        assert!(authz.authorize(&input("peer.example.net", "Pull")));
        assert!(!authz.authorize(&input("peer.example.net", "Push")));

        // user_id constrained rule
        assert!(!authz.authorize(&input("peer.example.net", "Delete")));
        assert!(authz.authorize(&PolicyInput {
            trust_domain: "peer.example.net",
            user_id: "admin",
            api_method: "Delete",
        }));
    }

    #[test]
    fn empty_bundle_denies_everything() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_bundle(&dir, r#"{"allow":[]}"#);
        let authz = BundleAuthorizer::new(path).expect("load bundle");
        assert!(!authz.authorize(&input("example.org", "Pull")));
    }

    #[test]
    fn malformed_bundle_fails_to_load() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_bundle(&dir, "not json at all");
        let err = BundleAuthorizer::new(path).unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn missing_bundle_fails_to_load() {
        let err = BundleAuthorizer::new("/nonexistent/policy.json").unwrap_err();
        assert!(matches!(err, Error::InvalidRequest(_)));
    }

    #[test]
    fn swapped_snapshot_takes_effect_immediately() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_bundle(&dir, r#"{"allow":[]}"#);
        let authz = BundleAuthorizer::new(path).expect("load bundle");
        assert!(!authz.authorize(&input("example.org", "Pull")));

        authz.swap(PolicyBundle {
            allow: vec![BundleRule {
                trust_domain: "*".into(),
                user_id: "*".into(),
                api_method: "Pull".into(),
            }],
        });
        assert!(authz.authorize(&input("example.org", "Pull")));
    }

    #[test]
    fn file_change_reloads_the_bundle() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write_bundle(&dir, r#"{"allow":[]}"#);
        let authz = BundleAuthorizer::new(path.clone()).expect("load bundle");
        assert!(!authz.authorize(&input("example.org", "Pull")));

        write_bundle(&dir, r#"{"allow":[{"trust_domain":"*","api_method":"Pull"}]}"#);

        // The watcher delivers asynchronously; poll with a deadline.
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(5);
        while std::time::Instant::now() < deadline {
            if authz.authorize(&input("example.org", "Pull")) {
                return;
            }
            std::thread::sleep(std::time::Duration::from_millis(50));
        }
        panic!("bundle change was not picked up within the deadline");
    }
}
