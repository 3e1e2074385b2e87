//! Telemetry helpers for structured logging.

use tracing_subscriber::EnvFilter;

/// Initialize tracing. Users can install their own subscriber; this helper
/// installs an env-filtered formatting subscriber if none is set, bumping the
/// default level to `debug` when `verbose` is on.
pub fn init_tracing(verbose: bool) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
