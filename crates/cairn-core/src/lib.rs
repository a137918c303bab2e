//! # cairn-core
//!
//! Core abstractions for the Cairn content-addressed directory.
//!
//! This crate provides the foundational types used across all Cairn
//! components:
//!
//! - **Record Model**: the polymorphic agent record and its projection
//! - **Canonical Codec**: deterministic byte encoding for hashing
//! - **Content Identifiers**: the CIDv1 value type and OCI digest mapping
//! - **Error Types**: the shared error taxonomy and result alias
//! - **Observability**: logging initialization and span helpers
//!
//! ## Crate Boundary
//!
//! `cairn-core` is the only crate allowed to define shared primitives. All
//! cross-component interaction happens via the types defined here.
//!
//! ## Example
//!
//! ```rust
//! use cairn_core::prelude::*;
//!
//! let record: Record = AgentV1::new("test-agent", "v1")
//!     .with_skill(Skill::new("test-category-1", "test-class-1"))
//!     .into();
//!
//! let cid = Cid::for_record(&record).expect("record canonicalizes");
//! assert_eq!(cid.as_str().len(), 59);
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod canonical;
pub mod cid;
pub mod error;
pub mod observability;
pub mod record;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::canonical::{canonical, canonical_opt, decode, detect_version};
    pub use crate::cid::Cid;
    pub use crate::error::{Error, Result};
    pub use crate::record::{
        AgentV1, AgentV2, AgentV3, Extension, Locator, Record, RecordData, RecordMeta, RecordRef,
        SchemaVersion, Skill,
    };
}

pub use cid::Cid;
pub use error::{Error, Result};
pub use observability::{init_logging, LogFormat};
pub use record::{
    AgentV1, AgentV2, AgentV3, Extension, Locator, Record, RecordData, RecordMeta, RecordRef,
    SchemaVersion, Skill,
};
