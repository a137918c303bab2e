//! OCI manifest and descriptor types.
//!
//! One record maps to one single-layer manifest. The manifest's annotations
//! carry the record's discovery metadata under the `dir.` prefix so that
//! lookup never needs to fetch the layer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Media type of an OCI image manifest.
pub const MEDIA_TYPE_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
/// Media type of the empty config descriptor.
pub const MEDIA_TYPE_EMPTY_CONFIG: &str = "application/vnd.oci.empty.v1+json";
/// Media type of a canonical record layer.
pub const MEDIA_TYPE_RECORD_LAYER: &str = "application/vnd.cairn.record.v1+json";
/// Media type of a referrer artifact layer.
pub const MEDIA_TYPE_REFERRER_LAYER: &str = "application/vnd.cairn.referrer.v1";

/// Manifest annotation key for the record CID.
pub const ANNOTATION_CID: &str = "dir.cid";
/// Manifest annotation key for the record name.
pub const ANNOTATION_NAME: &str = "dir.name";
/// Manifest annotation key for the record version.
pub const ANNOTATION_VERSION: &str = "dir.version";
/// Manifest annotation key for comma-joined skill names.
pub const ANNOTATION_SKILLS: &str = "dir.skills";
/// Manifest annotation key for comma-joined extension names.
pub const ANNOTATION_EXTENSIONS: &str = "dir.extensions";
/// Manifest annotation key for comma-joined locator types.
pub const ANNOTATION_LOCATORS: &str = "dir.locators";
/// Manifest annotation key for the owning team.
pub const ANNOTATION_TEAM: &str = "dir.team";
/// Manifest annotation key for the owning organization.
pub const ANNOTATION_ORGANIZATION: &str = "dir.organization";
/// Manifest annotation key for the owning project.
pub const ANNOTATION_PROJECT: &str = "dir.project";
/// Manifest annotation key for the record's schema version.
pub const ANNOTATION_SCHEMA_VERSION: &str = "dir.schema_version";
/// Manifest annotation key for the push timestamp (RFC 3339).
pub const ANNOTATION_CREATED_AT: &str = "dir.created_at";
/// Manifest annotation key for a referrer artifact type.
pub const ANNOTATION_REFERRER_TYPE: &str = "dir.referrer.type";

/// A content descriptor: the OCI triplet of media type, digest and size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Descriptor {
    /// Media type of the referenced content.
    #[serde(rename = "mediaType")]
    pub media_type: String,
    /// Digest of the referenced content (`sha256:<hex>`).
    pub digest: String,
    /// Size of the referenced content in bytes.
    pub size: u64,
    /// Descriptor-level annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Descriptor {
    /// Creates a descriptor with no annotations.
    #[must_use]
    pub fn new(media_type: impl Into<String>, digest: impl Into<String>, size: u64) -> Self {
        Self {
            media_type: media_type.into(),
            digest: digest.into(),
            size,
            annotations: BTreeMap::new(),
        }
    }

    /// The empty config descriptor used by artifact manifests.
    #[must_use]
    pub fn empty_config() -> Self {
        // The canonical two-byte empty JSON blob from the OCI artifact spec.
        Self::new(
            MEDIA_TYPE_EMPTY_CONFIG,
            "sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a",
            2,
        )
    }
}

/// A single-record OCI manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// OCI schema version; always 2.
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    /// Manifest media type.
    #[serde(rename = "mediaType")]
    pub media_type: String,
    /// Config descriptor (the empty config for record manifests).
    pub config: Descriptor,
    /// Content layers; exactly one for record manifests.
    pub layers: Vec<Descriptor>,
    /// Subject manifest, set on referrer manifests only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Descriptor>,
    /// Manifest-level annotations (`dir.*` discovery metadata).
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl Manifest {
    /// Creates a single-layer record manifest with the given annotations.
    #[must_use]
    pub fn for_record(layer: Descriptor, annotations: BTreeMap<String, String>) -> Self {
        Self {
            schema_version: 2,
            media_type: MEDIA_TYPE_MANIFEST.to_string(),
            config: Descriptor::empty_config(),
            layers: vec![layer],
            subject: None,
            annotations,
        }
    }

    /// Creates a referrer manifest attached to a subject record manifest.
    #[must_use]
    pub fn for_referrer(
        layer: Descriptor,
        subject: Descriptor,
        annotations: BTreeMap<String, String>,
    ) -> Self {
        Self {
            schema_version: 2,
            media_type: MEDIA_TYPE_MANIFEST.to_string(),
            config: Descriptor::empty_config(),
            layers: vec![layer],
            subject: Some(subject),
            annotations,
        }
    }

    /// Returns the record layer descriptor.
    #[must_use]
    pub fn record_layer(&self) -> Option<&Descriptor> {
        self.layers
            .iter()
            .find(|l| l.media_type == MEDIA_TYPE_RECORD_LAYER)
    }

    /// Serializes to the stored JSON form.
    #[must_use]
    pub fn to_bytes(&self) -> bytes::Bytes {
        // Struct serialization is field-ordered and map fields are BTreeMaps,
        // so the same manifest always yields the same bytes and digest.
        bytes::Bytes::from(serde_json::to_vec(self).unwrap_or_default())
    }
}
