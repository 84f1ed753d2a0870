//! Config path resolution for binaries
//!
//! Precedence: a path on the command line, then the config type's
//! environment variable, then its default location.

use std::path::PathBuf;

/// Which configuration file a binary loads
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigType {
    /// `config/probe.yaml`, overridable with `PROBE_CONFIG_PATH`
    Probe,
    /// Explicit path; never overridden by the environment
    Custom(String),
}

impl ConfigType {
    /// First command line argument if given, else `fallback`
    pub fn from_args(args: &[String], fallback: ConfigType) -> Self {
        match args.first() {
            Some(path) => ConfigType::Custom(path.clone()),
            None => fallback,
        }
    }

    pub fn default_path(&self) -> &str {
        match self {
            ConfigType::Probe => "config/probe.yaml",
            ConfigType::Custom(path) => path,
        }
    }

    /// Environment variable that may relocate this config
    pub fn env_var_name(&self) -> Option<&'static str> {
        match self {
            ConfigType::Probe => Some("PROBE_CONFIG_PATH"),
            ConfigType::Custom(_) => None,
        }
    }
}

/// Resolve the config path for `config_type`
///
/// # Examples
/// ```
/// use livesocket_probe::bin_common::{load_config_from_env, ConfigType};
///
/// let path = load_config_from_env(ConfigType::Custom("probe.yaml".into()));
/// assert_eq!(path.to_str(), Some("probe.yaml"));
/// ```
pub fn load_config_from_env(config_type: ConfigType) -> PathBuf {
    config_type
        .env_var_name()
        .and_then(|var| std::env::var(var).ok())
        .unwrap_or_else(|| config_type.default_path().to_string())
        .into()
}

/// Command line arguments without the program name
pub fn parse_args() -> Vec<String> {
    std::env::args().skip(1).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argument_selects_custom_path() {
        let args = vec!["local.yaml".to_string(), "ignored".to_string()];
        assert_eq!(
            ConfigType::from_args(&args, ConfigType::Probe),
            ConfigType::Custom("local.yaml".into())
        );
        assert_eq!(ConfigType::from_args(&[], ConfigType::Probe), ConfigType::Probe);
    }

    #[test]
    fn test_only_probe_consults_the_environment() {
        assert_eq!(ConfigType::Probe.env_var_name(), Some("PROBE_CONFIG_PATH"));
        assert_eq!(ConfigType::Custom("x".into()).env_var_name(), None);
    }
}
