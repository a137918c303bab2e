//! Registry backend abstraction.
//!
//! This module defines the contract every registry backend must implement:
//! content-addressed blobs, manifests addressed by digest or tag, tag
//! management and referrer listing. The [`MemoryRegistry`] implements the
//! contract in-process for tests and single-node runs; the HTTP backend in
//! [`crate::http`] speaks the OCI distribution API.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};

use cairn_core::{Error, Result};

use crate::manifest::{Descriptor, Manifest, MEDIA_TYPE_MANIFEST};

/// Registry backend contract.
///
/// Blob and manifest deletion are idempotent: deleting absent content
/// succeeds. Existence checks for error reporting happen in the store layer,
/// which knows what the absence of a CID means for the caller.
#[async_trait]
pub trait Registry: Send + Sync + 'static {
    /// Uploads a blob under its digest.
    async fn put_blob(&self, digest: &str, data: Bytes) -> Result<()>;

    /// Fetches a blob by digest.
    ///
    /// Returns `Error::NotFound` if the blob does not exist.
    async fn get_blob(&self, digest: &str) -> Result<Bytes>;

    /// Deletes a blob. Succeeds even if the blob does not exist.
    async fn delete_blob(&self, digest: &str) -> Result<()>;

    /// Stores a manifest and returns its digest.
    async fn put_manifest(&self, manifest: &Manifest) -> Result<String>;

    /// Resolves a reference (digest or tag) to `(digest, manifest)`.
    ///
    /// Returns `Error::NotFound` if the reference does not resolve.
    async fn get_manifest(&self, reference: &str) -> Result<(String, Manifest)>;

    /// Deletes a manifest by digest. Succeeds even if absent.
    async fn delete_manifest(&self, digest: &str) -> Result<()>;

    /// Points a tag at a manifest digest, replacing any previous target.
    async fn tag(&self, digest: &str, tag: &str) -> Result<()>;

    /// Removes a tag. Succeeds even if the tag does not exist.
    async fn untag(&self, tag: &str) -> Result<()>;

    /// Lists manifests whose subject is the given digest.
    async fn referrers(&self, subject_digest: &str) -> Result<Vec<Descriptor>>;
}

/// Computes the `sha256:<hex>` digest of a byte string.
#[must_use]
pub fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{}", hex::encode(Sha256::digest(data)))
}

#[derive(Debug, Default)]
struct MemoryState {
    blobs: HashMap<String, Bytes>,
    manifests: HashMap<String, Manifest>,
    tags: HashMap<String, String>,
}

/// In-memory registry backend for tests and single-node runs.
///
/// Thread-safe via `RwLock`. Digest computation matches the HTTP backend so
/// the two are interchangeable behind the trait.
#[derive(Debug, Default, Clone)]
pub struct MemoryRegistry {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, MemoryState>> {
        self.state
            .read()
            .map_err(|_| Error::Internal("registry lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, MemoryState>> {
        self.state
            .write()
            .map_err(|_| Error::Internal("registry lock poisoned".into()))
    }

    /// Returns all tags currently pointing at the given digest.
    ///
    /// Test helper; production code rebuilds tags from record metadata
    /// instead of reverse lookups.
    ///
    /// # Errors
    ///
    /// Returns `Error::Internal` if the lock is poisoned.
    pub fn tags_pointing_at(&self, digest: &str) -> Result<Vec<String>> {
        let state = self.read()?;
        let mut tags: Vec<String> = state
            .tags
            .iter()
            .filter(|(_, d)| d.as_str() == digest)
            .map(|(t, _)| t.clone())
            .collect();
        tags.sort();
        Ok(tags)
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn put_blob(&self, digest: &str, data: Bytes) -> Result<()> {
        self.write()?.blobs.insert(digest.to_string(), data);
        Ok(())
    }

    async fn get_blob(&self, digest: &str) -> Result<Bytes> {
        self.read()?
            .blobs
            .get(digest)
            .cloned()
            .ok_or_else(|| Error::not_found("blob", digest))
    }

    async fn delete_blob(&self, digest: &str) -> Result<()> {
        self.write()?.blobs.remove(digest);
        Ok(())
    }

    async fn put_manifest(&self, manifest: &Manifest) -> Result<String> {
        let digest = sha256_digest(&manifest.to_bytes());
        self.write()?
            .manifests
            .insert(digest.clone(), manifest.clone());
        Ok(digest)
    }

    async fn get_manifest(&self, reference: &str) -> Result<(String, Manifest)> {
        let state = self.read()?;
        let digest = if reference.starts_with("sha256:") {
            reference.to_string()
        } else {
            state
                .tags
                .get(reference)
                .cloned()
                .ok_or_else(|| Error::not_found("manifest", reference))?
        };
        let manifest = state
            .manifests
            .get(&digest)
            .cloned()
            .ok_or_else(|| Error::not_found("manifest", reference))?;
        Ok((digest, manifest))
    }

    async fn delete_manifest(&self, digest: &str) -> Result<()> {
        self.write()?.manifests.remove(digest);
        Ok(())
    }

    async fn tag(&self, digest: &str, tag: &str) -> Result<()> {
        let mut state = self.write()?;
        if !state.manifests.contains_key(digest) {
            return Err(Error::not_found("manifest", digest));
        }
        state.tags.insert(tag.to_string(), digest.to_string());
        Ok(())
    }

    async fn untag(&self, tag: &str) -> Result<()> {
        self.write()?.tags.remove(tag);
        Ok(())
    }

    async fn referrers(&self, subject_digest: &str) -> Result<Vec<Descriptor>> {
        let state = self.read()?;
        let mut out = Vec::new();
        for (digest, manifest) in &state.manifests {
            let Some(subject) = &manifest.subject else {
                continue;
            };
            if subject.digest == subject_digest {
                out.push(Descriptor {
                    media_type: MEDIA_TYPE_MANIFEST.to_string(),
                    digest: digest.clone(),
                    size: manifest.to_bytes().len() as u64,
                    annotations: manifest.annotations.clone(),
                });
            }
        }
        out.sort_by(|a, b| a.digest.cmp(&b.digest));
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::MEDIA_TYPE_RECORD_LAYER;
    use std::collections::BTreeMap;

    fn manifest_with_annotation(key: &str, value: &str) -> Manifest {
        let mut annotations = BTreeMap::new();
        annotations.insert(key.to_string(), value.to_string());
        Manifest::for_record(
            Descriptor::new(MEDIA_TYPE_RECORD_LAYER, "sha256:layer", 10),
            annotations,
        )
    }

    #[tokio::test]
    async fn blob_roundtrip() {
        let registry = MemoryRegistry::new();
        let data = Bytes::from_static(b"canonical bytes");
        let digest = sha256_digest(&data);

        registry.put_blob(&digest, data.clone()).await.unwrap();
        assert_eq!(registry.get_blob(&digest).await.unwrap(), data);

        registry.delete_blob(&digest).await.unwrap();
        assert!(registry.get_blob(&digest).await.is_err());
        // Idempotent delete.
        registry.delete_blob(&digest).await.unwrap();
    }

    #[tokio::test]
    async fn manifest_resolves_by_digest_and_tag() {
        let registry = MemoryRegistry::new();
        let manifest = manifest_with_annotation("dir.name", "agent");
        let digest = registry.put_manifest(&manifest).await.unwrap();

        registry.tag(&digest, "agent:latest").await.unwrap();

        let (by_digest, m1) = registry.get_manifest(&digest).await.unwrap();
        let (by_tag, m2) = registry.get_manifest("agent:latest").await.unwrap();
        assert_eq!(by_digest, by_tag);
        assert_eq!(m1, m2);
    }

    #[tokio::test]
    async fn tagging_unknown_manifest_fails() {
        let registry = MemoryRegistry::new();
        let err = registry.tag("sha256:missing", "t").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn retagging_replaces_target() {
        let registry = MemoryRegistry::new();
        let d1 = registry
            .put_manifest(&manifest_with_annotation("dir.name", "a"))
            .await
            .unwrap();
        let d2 = registry
            .put_manifest(&manifest_with_annotation("dir.name", "b"))
            .await
            .unwrap();

        registry.tag(&d1, "latest").await.unwrap();
        registry.tag(&d2, "latest").await.unwrap();

        let (resolved, _) = registry.get_manifest("latest").await.unwrap();
        assert_eq!(resolved, d2);
    }

    #[tokio::test]
    async fn referrers_filter_by_subject() {
        let registry = MemoryRegistry::new();
        let record = manifest_with_annotation("dir.name", "subject");
        let record_digest = registry.put_manifest(&record).await.unwrap();

        let referrer = Manifest::for_referrer(
            Descriptor::new("application/vnd.cairn.referrer.v1", "sha256:sig", 64),
            Descriptor::new(MEDIA_TYPE_MANIFEST, record_digest.clone(), 1),
            BTreeMap::new(),
        );
        registry.put_manifest(&referrer).await.unwrap();

        let found = registry.referrers(&record_digest).await.unwrap();
        assert_eq!(found.len(), 1);

        let none = registry.referrers("sha256:other").await.unwrap();
        assert!(none.is_empty());
    }
}
