//! # cairn-store
//!
//! OCI-backed record storage and discovery tagging for the Cairn directory.
//!
//! The store maps each record to a single-layer OCI manifest: canonical
//! bytes in the layer, discovery metadata in the manifest annotations, and
//! a set of planner-generated tags pointing at the manifest. Two registry
//! backends implement the [`registry::Registry`] contract: an in-memory one
//! for tests and single-node runs, and an HTTP one speaking the OCI
//! distribution API.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

use std::collections::BTreeMap;

use bytes::Bytes;

pub mod http;
pub mod manifest;
pub mod metrics;
pub mod registry;
pub mod store;
pub mod tags;

pub use http::HttpRegistry;
pub use manifest::{Descriptor, Manifest};
pub use registry::{MemoryRegistry, Registry};
pub use store::{RecordStore, MAX_RECORD_SIZE};
pub use tags::{derive_labels, normalize_tag, plan_tags, record_metadata, TagStrategy};

/// A referrer artifact attached to a stored record, such as a signature
/// envelope or an SBOM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferrerArtifact {
    /// Artifact type (e.g. `signature`).
    pub artifact_type: String,
    /// Opaque artifact payload.
    pub data: Bytes,
    /// Artifact annotations.
    pub annotations: BTreeMap<String, String>,
}
