//! Tracing setup
//!
//! Installs a `tracing-subscriber` fmt layer filtered by `RUST_LOG`
//! (falls back to `query_resolution=info`).

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "query_resolution=info";

/// Initialise the global subscriber. Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
