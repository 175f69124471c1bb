//! Log output for simulation runs.

use tracing_subscriber::EnvFilter;

/// Installs a formatted subscriber filtered by `RUST_LOG`, or by `filter`
/// when `RUST_LOG` is unset.
///
/// Returns false if a global subscriber was already installed, which is
/// the normal case when several simulations run in one process.
pub fn init(filter: &str) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
