//! # cairn-sync
//!
//! Peer synchronization for the Cairn directory.
//!
//! A sync names a remote directory to mirror. The manager owns one worker
//! per sync; each cycle discovers the remote's published records and
//! imports the ones missing locally through the same store and routing
//! contracts every other caller uses.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod manager;

pub use manager::{SyncConfig, SyncManager, SyncStatus, DEFAULT_SYNC_INTERVAL};
