//! Logging bootstrap
//!
//! Structured logs through `tracing`, filtered by `RUST_LOG` with an
//! `info` default. Extraction and publishing tag each per-resource event
//! with the resource key.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Call once, before any command work.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
