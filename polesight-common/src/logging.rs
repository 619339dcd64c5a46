//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

/// Install a global fmt subscriber at `level`
///
/// `RUST_LOG` takes precedence over `level` when set. Returns `false` if a global
/// subscriber was already installed (the call is then a no-op).
pub fn init_tracing(level: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
