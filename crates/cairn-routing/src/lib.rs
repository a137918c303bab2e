//! # cairn-routing
//!
//! Label-based publication index for the Cairn directory.
//!
//! Published records are indexed under hierarchical labels derived from
//! their metadata (skill paths, extension features, locator types and
//! annotated domains). List queries intersect label sets and stream their
//! results; publish and unpublish maintain both directions of the mapping.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod index;

pub use index::{LabelEdge, PublishedRecord, RoutingIndex};
