use tracing_subscriber::EnvFilter;

/// Installs a default `tracing_subscriber::fmt` subscriber for binaries and
/// tests that want one. The library itself only emits `tracing` events and
/// never calls this on its own — callers decide whether and how to collect
/// them.
///
/// Safe to call more than once; a subscriber already installed by the
/// caller (or by an earlier call) is left in place.
pub fn init() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_test_writer()
        .try_init();
}
