use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global `tracing` subscriber. `RUST_LOG` wins over the default
/// `info` filter. Calling it twice is harmless.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = fmt().with_env_filter(filter).with_target(true).try_init();
}
