//! Log output for native embedders. The browser build relies on whatever
//! subscriber the host page installs.

/// Install a global `tracing` subscriber.
///
/// `RUST_LOG` wins over `default_level` when it is set. Returns `false` when a
/// subscriber was already installed, which makes repeated calls harmless.
#[cfg(not(target_arch = "wasm32"))]
pub fn init(default_level: &str) -> bool {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}
