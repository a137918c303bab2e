//! Observability infrastructure for Cairn.
//!
//! Structured logging with consistent spans across all components. Services
//! call [`init_logging`] once at startup; libraries only emit `tracing`
//! events and never install subscribers.

use std::sync::Once;
use tracing::Span;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// JSON structured logs (for production).
    Json,
    /// Pretty-printed logs (for development).
    #[default]
    Pretty,
}

/// Initializes the logging subsystem.
///
/// Safe to call multiple times; subsequent calls are no-ops. Log levels are
/// controlled via `RUST_LOG` (e.g. `info`, `cairn_store=debug`).
pub fn init_logging(format: LogFormat) {
    INIT.call_once(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

        match format {
            LogFormat::Json => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().json())
                    .init();
            }
            LogFormat::Pretty => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(fmt::layer().pretty())
                    .init();
            }
        }
    });
}

/// Creates a span for a streaming RPC.
///
/// Service handlers attach this to the tasks they spawn so every event
/// inside a call carries the service, method and caller identity.
#[must_use]
pub fn rpc_span(service: &str, method: &str, trust_domain: &str) -> Span {
    tracing::info_span!(
        "rpc",
        service = service,
        method = method,
        trust_domain = trust_domain,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(LogFormat::Pretty);
        init_logging(LogFormat::Json);
    }

    #[test]
    fn span_helper_creates_usable_spans() {
        let span = rpc_span("StoreService", "Push", "example.org");
        let _guard = span.enter();
        tracing::info!("message inside rpc span");
    }
}
