//! Logging initialization

use tracing_subscriber::EnvFilter;

/// Initialize tracing; `RUST_LOG` wins over `level` when set
pub fn init_tracing_with_level(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .init();
}
