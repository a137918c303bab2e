//! # cairn-server
//!
//! The Cairn directory server: four streaming RPC service groups over one
//! record store, routing index, authorization gate and sync manager.
//!
//! Service handlers never run before the gate approves the call, and every
//! streaming handler processes its input sequentially so response order
//! matches request order.

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod gate;
pub mod server;
pub mod services;

pub use config::{AuthzMode, Config, OciConfig};
pub use gate::Gate;
pub use server::{serve, serve_with_listener, AppState};
