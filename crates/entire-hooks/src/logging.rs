//! `tracing` initialization shared by every hook binary. Hooks write their
//! git-facing JSON or exit status to stdout/exit code; diagnostics always
//! go to stderr so they never corrupt a hook's actual output contract.

/// Read `ENTIRE_LOG_LEVEL` (default `warn`) and install a stderr subscriber.
/// Safe to call more than once per process; later calls are no-ops.
pub fn init() {
    let filter = std::env::var("ENTIRE_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .try_init();
}
