//! The OCI-backed record store.
//!
//! Each record becomes one single-layer manifest: the layer holds the
//! canonical bytes under the record's content digest, the manifest carries
//! the discovery metadata as annotations, and every discovery tag points at
//! the manifest. Records are immutable once stored; delete removes the
//! manifest, its tags and the layer.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;

use cairn_core::{canonical, Cid, Error, Record, RecordMeta, RecordRef, Result};

use crate::manifest::{
    Descriptor, Manifest, ANNOTATION_CID, ANNOTATION_CREATED_AT, ANNOTATION_REFERRER_TYPE,
    ANNOTATION_SCHEMA_VERSION, MEDIA_TYPE_MANIFEST, MEDIA_TYPE_RECORD_LAYER,
    MEDIA_TYPE_REFERRER_LAYER,
};
use crate::registry::{sha256_digest, Registry};
use crate::tags::{labels_from_annotations, plan_tags, record_metadata, TagStrategy};
use crate::{metrics, ReferrerArtifact};

/// Maximum canonical record payload: 4 MiB.
pub const MAX_RECORD_SIZE: usize = 4 * 1024 * 1024;

/// Content-addressed record store over a registry backend.
#[derive(Clone)]
pub struct RecordStore {
    registry: Arc<dyn Registry>,
    strategy: TagStrategy,
}

impl RecordStore {
    /// Creates a store with the default tag strategy.
    #[must_use]
    pub fn new(registry: Arc<dyn Registry>) -> Self {
        Self {
            registry,
            strategy: TagStrategy::default(),
        }
    }

    /// Creates a store with an explicit tag strategy.
    #[must_use]
    pub fn with_strategy(registry: Arc<dyn Registry>, strategy: TagStrategy) -> Self {
        Self { registry, strategy }
    }

    /// Stores a record and returns its reference.
    ///
    /// The record is canonicalized, hashed, wrapped into a single-layer
    /// manifest and tagged with its discovery tags. Re-pushing an identical
    /// record is a no-op at the manifest level plus a re-assertion of all
    /// tags.
    ///
    /// # Errors
    ///
    /// `InvalidRecord` when canonicalization fails, `PayloadTooLarge` above
    /// 4 MiB, `Unavailable` on registry I/O failures, `Internal` when every
    /// discovery tag failed to apply.
    pub async fn push(&self, record: &Record) -> Result<RecordRef> {
        let payload = canonical::canonical(record)?;
        if payload.len() > MAX_RECORD_SIZE {
            return Err(Error::PayloadTooLarge {
                size: payload.len(),
                limit: MAX_RECORD_SIZE,
            });
        }

        let cid = Cid::from_canonical_bytes(&payload);
        let layer_digest = cid.to_oci_digest()?;

        let metadata = record_metadata(record.data());
        let tags = plan_tags(&metadata, cid.as_str(), &self.strategy);

        // Idempotent fast path: same content means same manifest digest.
        if let Ok((digest, _)) = self.registry.get_manifest(cid.as_str()).await {
            tracing::debug!(cid = %cid, "record already stored, re-asserting tags");
            self.apply_tags(&digest, &tags).await?;
            return Ok(RecordRef::new(cid.as_str()));
        }

        self.registry
            .put_blob(&layer_digest, Bytes::from(payload.clone()))
            .await?;

        let mut layer = Descriptor::new(
            MEDIA_TYPE_RECORD_LAYER,
            layer_digest,
            payload.len() as u64,
        );
        layer
            .annotations
            .insert(ANNOTATION_CID.to_string(), cid.as_str().to_string());

        let mut annotations = metadata;
        annotations.insert(ANNOTATION_CID.to_string(), cid.as_str().to_string());
        annotations.insert(
            ANNOTATION_SCHEMA_VERSION.to_string(),
            record.schema_version().as_str().to_string(),
        );
        annotations.insert(ANNOTATION_CREATED_AT.to_string(), Utc::now().to_rfc3339());

        let manifest = Manifest::for_record(layer, annotations);
        let manifest_digest = self.registry.put_manifest(&manifest).await?;

        self.apply_tags(&manifest_digest, &tags).await?;

        metrics::record_push();
        tracing::info!(cid = %cid, tags = tags.len(), "record stored");
        Ok(RecordRef::new(cid.as_str()))
    }

    /// Retrieves a record by reference.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` on a malformed CID, `NotFound` when the record is
    /// absent, `IntegrityError` when the stored bytes do not hash back to
    /// the CID.
    pub async fn pull(&self, record_ref: &RecordRef) -> Result<Record> {
        let cid = Cid::parse(&record_ref.cid)?;

        let (_, manifest) = self
            .registry
            .get_manifest(cid.as_str())
            .await
            .map_err(|e| remap_not_found(e, &record_ref.cid))?;
        let layer = manifest
            .record_layer()
            .ok_or_else(|| Error::Internal("stored manifest has no record layer".into()))?;

        let payload = self.registry.get_blob(&layer.digest).await?;

        let actual = sha256_digest(&payload);
        if actual != layer.digest {
            return Err(Error::Integrity(format!(
                "layer digest mismatch for {}: stored {}, computed {actual}",
                cid.as_str(),
                layer.digest
            )));
        }

        metrics::record_pull();
        canonical::decode(&payload)
    }

    /// Retrieves metadata for a record without fetching the layer.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` on a malformed CID, `NotFound` when absent.
    pub async fn lookup(&self, record_ref: &RecordRef) -> Result<RecordMeta> {
        let cid = Cid::parse(&record_ref.cid)?;

        let (_, manifest) = self
            .registry
            .get_manifest(cid.as_str())
            .await
            .map_err(|e| remap_not_found(e, &record_ref.cid))?;
        let layer = manifest
            .record_layer()
            .ok_or_else(|| Error::Internal("stored manifest has no record layer".into()))?;

        let created_at = manifest
            .annotations
            .get(ANNOTATION_CREATED_AT)
            .and_then(|v| chrono::DateTime::parse_from_rfc3339(v).ok())
            .map_or_else(Utc::now, |t| t.with_timezone(&Utc));

        Ok(RecordMeta {
            cid: cid.as_str().to_string(),
            size_bytes: layer.size,
            created_at,
            annotations: manifest.annotations.clone(),
            labels: labels_from_annotations(&manifest.annotations),
        })
    }

    /// Removes a record: all discovery tags, then the manifest and layer.
    ///
    /// # Errors
    ///
    /// `InvalidRequest` on a malformed CID, `NotFound` when the CID is
    /// unknown.
    pub async fn delete(&self, record_ref: &RecordRef) -> Result<()> {
        let cid = Cid::parse(&record_ref.cid)?;

        let (manifest_digest, manifest) = self
            .registry
            .get_manifest(cid.as_str())
            .await
            .map_err(|e| remap_not_found(e, &record_ref.cid))?;

        // Tags are reconstructed from stored metadata with the same strategy
        // used at push time, so every applied tag is covered.
        let tags = plan_tags(&manifest.annotations, cid.as_str(), &self.strategy);
        for tag in &tags {
            self.registry.untag(tag).await?;
        }

        self.registry.delete_manifest(&manifest_digest).await?;
        if let Some(layer) = manifest.record_layer() {
            self.registry.delete_blob(&layer.digest).await?;
        }

        metrics::record_delete();
        tracing::info!(cid = %cid, tags = tags.len(), "record deleted");
        Ok(())
    }

    /// Attaches a referrer artifact (e.g. a signature envelope) to a record.
    ///
    /// # Errors
    ///
    /// `NotFound` when the subject record is absent.
    pub async fn push_referrer(
        &self,
        record_ref: &RecordRef,
        referrer: &ReferrerArtifact,
    ) -> Result<()> {
        let cid = Cid::parse(&record_ref.cid)?;
        let (subject_digest, subject_manifest) = self
            .registry
            .get_manifest(cid.as_str())
            .await
            .map_err(|e| remap_not_found(e, &record_ref.cid))?;

        let blob_digest = sha256_digest(&referrer.data);
        self.registry
            .put_blob(&blob_digest, referrer.data.clone())
            .await?;

        let layer = Descriptor::new(
            MEDIA_TYPE_REFERRER_LAYER,
            blob_digest,
            referrer.data.len() as u64,
        );
        let subject = Descriptor::new(
            MEDIA_TYPE_MANIFEST,
            subject_digest,
            subject_manifest.to_bytes().len() as u64,
        );

        let mut annotations: BTreeMap<String, String> = referrer.annotations.clone();
        annotations.insert(
            ANNOTATION_REFERRER_TYPE.to_string(),
            referrer.artifact_type.clone(),
        );
        annotations.insert(ANNOTATION_CID.to_string(), cid.as_str().to_string());

        let manifest = Manifest::for_referrer(layer, subject, annotations);
        self.registry.put_manifest(&manifest).await?;
        Ok(())
    }

    /// Lists referrer artifacts attached to a record, optionally filtered by
    /// artifact type.
    ///
    /// # Errors
    ///
    /// `NotFound` when the subject record is absent.
    pub async fn pull_referrers(
        &self,
        record_ref: &RecordRef,
        type_filter: Option<&str>,
    ) -> Result<Vec<ReferrerArtifact>> {
        let cid = Cid::parse(&record_ref.cid)?;
        let (subject_digest, _) = self
            .registry
            .get_manifest(cid.as_str())
            .await
            .map_err(|e| remap_not_found(e, &record_ref.cid))?;

        let descriptors = self.registry.referrers(&subject_digest).await?;
        let mut out = Vec::new();
        for descriptor in descriptors {
            let artifact_type = descriptor
                .annotations
                .get(ANNOTATION_REFERRER_TYPE)
                .cloned()
                .unwrap_or_default();
            if let Some(filter) = type_filter {
                if !filter.is_empty() && artifact_type != filter {
                    continue;
                }
            }

            let (_, manifest) = self.registry.get_manifest(&descriptor.digest).await?;
            let Some(layer) = manifest.layers.first() else {
                continue;
            };
            let data = self.registry.get_blob(&layer.digest).await?;

            let mut annotations = manifest.annotations.clone();
            annotations.remove(ANNOTATION_REFERRER_TYPE);
            annotations.remove(ANNOTATION_CID);

            out.push(ReferrerArtifact {
                artifact_type,
                data,
                annotations,
            });
        }
        Ok(out)
    }

    /// Applies discovery tags, downgrading partial failures to warnings.
    ///
    /// A record that is retrievable by CID but missing some discovery tags
    /// is degraded, not broken; only total tagging failure is an error.
    async fn apply_tags(&self, manifest_digest: &str, tags: &[String]) -> Result<()> {
        let mut failures = Vec::new();

        for tag in tags {
            if tag.is_empty() {
                continue;
            }
            if let Err(err) = self.registry.tag(manifest_digest, tag).await {
                tracing::warn!(tag = %tag, error = %err, "failed to create discovery tag");
                failures.push(format!("{tag}: {err}"));
            } else {
                tracing::debug!(tag = %tag, "created discovery tag");
            }
        }

        metrics::record_tag_failures(failures.len() as u64);

        if !failures.is_empty() {
            if failures.len() == tags.len() {
                return Err(Error::Internal(format!(
                    "failed to create any discovery tags: {}",
                    failures.join("; ")
                )));
            }
            tracing::warn!(errors = %failures.join("; "), "some discovery tags failed");
        }

        Ok(())
    }
}

fn remap_not_found(err: Error, cid: &str) -> Error {
    match err {
        Error::NotFound { .. } => Error::not_found("record", cid),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::MemoryRegistry;
    use cairn_core::{AgentV1, Extension, Locator, Skill};

    fn test_record() -> Record {
        AgentV1::new("test-agent", "v1")
            .with_skill(Skill::new("test-category-1", "test-class-1"))
            .with_extension(Extension {
                name: "streaming".into(),
                version: "1".into(),
                data: None,
            })
            .with_locator(Locator::new("docker-image", "ghcr.io/example/test-agent"))
            .with_annotation("team", "platform")
            .into()
    }

    fn store() -> (RecordStore, MemoryRegistry) {
        let registry = MemoryRegistry::new();
        (RecordStore::new(Arc::new(registry.clone())), registry)
    }

    #[tokio::test]
    async fn push_pull_roundtrip_is_byte_identical() {
        let (store, _) = store();
        let record = test_record();

        let record_ref = store.push(&record).await.unwrap();
        assert_eq!(record_ref.cid.len(), 59);

        let pulled = store.pull(&record_ref).await.unwrap();
        assert_eq!(
            canonical::canonical(&record).unwrap(),
            canonical::canonical(&pulled).unwrap()
        );
    }

    #[tokio::test]
    async fn push_applies_discovery_tags() {
        let (store, registry) = store();
        let record_ref = store.push(&test_record()).await.unwrap();

        let (digest, _) = registry.get_manifest(&record_ref.cid).await.unwrap();
        let tags = registry.tags_pointing_at(&digest).unwrap();

        assert!(tags.contains(&record_ref.cid));
        assert!(tags.contains(&"test-agent".to_string()));
        assert!(tags.contains(&"test-agent_v1".to_string()));
        assert!(tags.contains(&"skill.test-category-1.test-class-1".to_string()));
        assert!(tags.contains(&"ext.streaming".to_string()));
        assert!(tags.contains(&"deploy.docker-image".to_string()));
        assert!(tags.contains(&"team.platform".to_string()));
    }

    #[tokio::test]
    async fn push_is_idempotent() {
        let (store, _) = store();
        let record = test_record();

        let first = store.push(&record).await.unwrap();
        let second = store.push(&record).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn push_rejects_oversized_payload() {
        let (store, _) = store();
        let record: Record = AgentV1 {
            schema_version: "v1alpha1".into(),
            name: "huge".into(),
            description: "x".repeat(MAX_RECORD_SIZE + 1),
            ..AgentV1::default()
        }
        .into();

        let err = store.push(&record).await.unwrap_err();
        assert!(matches!(err, Error::PayloadTooLarge { .. }));
    }

    #[tokio::test]
    async fn lookup_returns_metadata_without_layer() {
        let (store, _) = store();
        let record = test_record();
        let record_ref = store.push(&record).await.unwrap();

        let meta = store.lookup(&record_ref).await.unwrap();
        assert_eq!(meta.cid, record_ref.cid);
        assert_eq!(
            meta.size_bytes,
            canonical::canonical(&record).unwrap().len() as u64
        );
        assert_eq!(meta.annotations.get(ANNOTATION_CID).unwrap(), &meta.cid);
        assert!(meta
            .labels
            .contains(&"/skills/test-category-1/test-class-1".to_string()));
    }

    #[tokio::test]
    async fn delete_then_pull_returns_not_found() {
        let (store, _) = store();
        let record_ref = store.push(&test_record()).await.unwrap();

        store.delete(&record_ref).await.unwrap();

        let err = store.pull(&record_ref).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn delete_removes_all_tags() {
        let (store, registry) = store();
        let record_ref = store.push(&test_record()).await.unwrap();
        let (digest, _) = registry.get_manifest(&record_ref.cid).await.unwrap();

        store.delete(&record_ref).await.unwrap();
        assert!(registry.tags_pointing_at(&digest).unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_unknown_cid_fails() {
        let (store, _) = store();
        let bogus = RecordRef::new(Cid::from_canonical_bytes(b"never pushed").as_str());
        let err = store.delete(&bogus).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn pull_detects_corrupted_layer() {
        let (store, registry) = store();
        let record_ref = store.push(&test_record()).await.unwrap();

        // Corrupt the layer in place.
        let cid = Cid::parse(&record_ref.cid).unwrap();
        let layer_digest = cid.to_oci_digest().unwrap();
        registry
            .put_blob(&layer_digest, Bytes::from_static(b"{\"tampered\":true}"))
            .await
            .unwrap();

        let err = store.pull(&record_ref).await.unwrap_err();
        assert!(matches!(err, Error::Integrity(_)));
    }

    #[tokio::test]
    async fn referrer_roundtrip_with_type_filter() {
        let (store, _) = store();
        let record_ref = store.push(&test_record()).await.unwrap();

        let signature = ReferrerArtifact {
            artifact_type: "signature".into(),
            data: Bytes::from_static(b"sig-bytes"),
            annotations: BTreeMap::new(),
        };
        let sbom = ReferrerArtifact {
            artifact_type: "sbom".into(),
            data: Bytes::from_static(b"sbom-bytes"),
            annotations: BTreeMap::new(),
        };
        store.push_referrer(&record_ref, &signature).await.unwrap();
        store.push_referrer(&record_ref, &sbom).await.unwrap();

        let all = store.pull_referrers(&record_ref, None).await.unwrap();
        assert_eq!(all.len(), 2);

        let sigs = store
            .pull_referrers(&record_ref, Some("signature"))
            .await
            .unwrap();
        assert_eq!(sigs.len(), 1);
        assert_eq!(sigs[0].data, Bytes::from_static(b"sig-bytes"));
    }

    #[tokio::test]
    async fn referrer_on_unknown_record_fails() {
        let (store, _) = store();
        let bogus = RecordRef::new(Cid::from_canonical_bytes(b"absent").as_str());
        let artifact = ReferrerArtifact {
            artifact_type: "signature".into(),
            data: Bytes::from_static(b"sig"),
            annotations: BTreeMap::new(),
        };
        let err = store.push_referrer(&bogus, &artifact).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }
}
