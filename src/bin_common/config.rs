//! Probe configuration
//!
//! YAML file plus `.env`. Secrets (the bearer token) are never stored in the
//! YAML itself, only the name of the environment variable that holds them.

use livesocket::{StaticHeaders, WebSocketClientBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarMissing(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// One request issued by the probe after connecting
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeRequest {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
    /// Send even before the session is marked authenticated
    #[serde(default)]
    pub anonymous: bool,
}

/// ws_probe configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// ws:// or wss:// endpoint
    pub endpoint: String,
    #[serde(default)]
    pub receive_buffer_size: Option<usize>,
    #[serde(default)]
    pub reply_timeout_ms: Option<u64>,
    /// Static handshake headers
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Name of the environment variable holding a bearer token
    #[serde(default)]
    pub bearer_token_env: Option<String>,
    #[serde(default)]
    pub requests: Vec<ProbeRequest>,
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Bearer token from the environment (not in YAML)
    #[serde(skip)]
    pub bearer_token: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl ProbeConfig {
    /// Load configuration from YAML file and .env
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        let mut config: ProbeConfig = serde_yaml::from_str(&yaml_content)?;

        dotenv::dotenv().ok(); // Don't fail if .env doesn't exist

        if let Some(var) = &config.bearer_token_env {
            let token = std::env::var(var).map_err(|_| ConfigError::EnvVarMissing(var.clone()))?;
            config.bearer_token = Some(token);
        }

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if !(self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://")) {
            return Err(ConfigError::ValidationError(
                "endpoint must start with ws:// or wss://".to_string(),
            ));
        }

        if self.receive_buffer_size == Some(0) {
            return Err(ConfigError::ValidationError(
                "receive_buffer_size must be greater than 0".to_string(),
            ));
        }

        if self.reply_timeout_ms == Some(0) {
            return Err(ConfigError::ValidationError(
                "reply_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if let Some(request) = self.requests.iter().find(|r| r.method.trim().is_empty()) {
            return Err(ConfigError::ValidationError(format!(
                "request with empty method name (arguments: {})",
                request.arguments
            )));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        Ok(())
    }

    /// Whether requests requiring authentication may be sent
    pub fn is_authenticated(&self) -> bool {
        self.bearer_token.is_some()
    }

    /// Handshake headers: static ones plus `Authorization` for the token
    pub fn handshake_headers(&self) -> StaticHeaders {
        let mut headers = StaticHeaders::new(self.headers.clone());
        if let Some(token) = &self.bearer_token {
            headers = headers.with("Authorization", format!("Bearer {}", token));
        }
        headers
    }

    /// Client builder carrying this configuration
    pub fn client_builder(&self) -> WebSocketClientBuilder {
        let mut builder = livesocket::builder();
        if let Some(bytes) = self.receive_buffer_size {
            builder = builder.receive_buffer_size(bytes);
        }
        if let Some(ms) = self.reply_timeout_ms {
            builder = builder.reply_timeout(Duration::from_millis(ms));
        }
        let headers = self.handshake_headers();
        if !headers.is_empty() {
            builder = builder.headers(headers);
        }
        builder
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  Endpoint: {}", self.endpoint);
        if let Some(bytes) = self.receive_buffer_size {
            info!("  Receive buffer: {} bytes", bytes);
        }
        if let Some(ms) = self.reply_timeout_ms {
            info!("  Reply timeout: {} ms", ms);
        }
        info!("  Static headers: {}", self.headers.len());
        info!("  Bearer token: {}", if self.bearer_token.is_some() { "set" } else { "none" });
        info!("  Requests: {}", self.requests.len());
        info!("  Log level: {}", self.log_level);
    }
}
