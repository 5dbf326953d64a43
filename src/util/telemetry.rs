//! Telemetry helpers for structured logging and tracing.

/// Initialize tracing for binaries and tests. Callers can install their own
/// subscriber; this helper installs a default env-filtered fmt subscriber
/// (`RUST_LOG`) only if none is set yet.
///
/// Thread names are included in every line, so events from the pool's
/// `{prefix}-{index}` workers and the `{prefix}-timer` thread can be told apart.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_thread_names(true)
        .try_init();
}
