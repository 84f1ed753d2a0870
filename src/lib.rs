//! LiveSocket probe - main library
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (CLI, config, logging)
//! - **livesocket**: WebSocket protocol client (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust,no_run
//! use livesocket_probe::bin_common::{load_config_from_env, ConfigType, ProbeConfig};
//!
//! let config = ProbeConfig::load(load_config_from_env(ConfigType::Probe)).unwrap();
//! ```

// Re-export workspace library for convenience
pub use livesocket;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod config;
    pub mod logging;

    pub use cli::{load_config_from_env, parse_args, ConfigType};
    pub use config::{ConfigError, ProbeConfig, ProbeRequest};
    pub use logging::init_tracing_with_level;
}
