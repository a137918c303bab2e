//! # cairn-client
//!
//! Streaming client for the Cairn directory.
//!
//! All store operations flow through one generic streaming primitive
//! ([`streaming::stream_bidi`] / [`streaming::stream_acked`]): the caller
//! feeds an input channel, receives an output channel immediately, and one
//! backend stream carries every item for the call. Scalar and batch
//! convenience methods wrap the same path with short-lived channels.
//!
//! ```no_run
//! use cairn_client::Client;
//! use cairn_core::prelude::*;
//!
//! # async fn example() -> Result<()> {
//! let client = Client::connect("http://127.0.0.1:8888").await?;
//!
//! let record: Record = AgentV1::new("test-agent", "v1").into();
//! let record_ref = client.push(&record).await?;
//! let roundtripped = client.pull(&record_ref).await?;
//! assert_eq!(canonical(&record)?, canonical(&roundtripped)?);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

mod client;
mod routing;
mod store;
mod sync;
pub mod streaming;

pub use client::{Client, Identity, METADATA_TRUST_DOMAIN, METADATA_USER_ID};
pub use routing::ListEntry;
pub use streaming::{StreamError, StreamItem, STREAM_BUFFER};
