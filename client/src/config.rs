//! Client configuration
//!
//! Endpoints, reconnection policy and timeouts for [`PredictionClient`].
//! The configuration can be built in code with the `with_*` methods or
//! loaded from a JSON file with [`ConfigManager`]; missing fields fall back
//! to the defaults.
//!
//! ```json
//! {
//!   "api_url": "https://paddy.example.org",
//!   "socket_url": "https://paddy.example.org",
//!   "max_reconnect_attempts": 3
//! }
//! ```
//!
//! [`PredictionClient`]: crate::client::PredictionClient

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::network::protocol::ENGINE_IO_VERSION;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization / deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A value is out of range or malformed
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Client configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the request/response API
    pub api_url: String,

    /// Base URL of the streaming channel (`http`/`https`, mapped to `ws`/`wss`)
    pub socket_url: String,

    /// Path of the Socket.IO endpoint
    pub socket_path: String,

    /// Path of the prediction endpoint
    pub predict_path: String,

    /// Path of the prediction history endpoint
    pub history_path: String,

    /// Reconnect automatically after a failed attempt or a lost connection
    pub reconnection: bool,

    /// Failed attempts allowed before giving up
    pub max_reconnect_attempts: u32,

    /// Delay between attempts in milliseconds
    pub reconnect_delay_ms: u64,

    /// Connection (and HTTP request) timeout in milliseconds
    pub timeout_ms: u64,

    /// Emit `join` with the peer identity after every connect
    pub join_room: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:5001".to_string(),
            socket_url: "http://127.0.0.1:5001".to_string(),
            socket_path: "/socket.io/".to_string(),
            predict_path: "/api/predictions/predict".to_string(),
            history_path: "/api/predictions/predictions".to_string(),
            reconnection: true,
            max_reconnect_attempts: 5,
            reconnect_delay_ms: 1000,
            timeout_ms: 10000,
            join_room: false,
        }
    }
}

impl ClientConfig {
    /// Use one server for both transports
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            api_url: base_url.clone(),
            socket_url: base_url,
            ..Default::default()
        }
    }

    /// Set the request/response API base URL
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    /// Set the streaming channel base URL
    pub fn with_socket_url(mut self, url: impl Into<String>) -> Self {
        self.socket_url = url.into();
        self
    }

    /// Enable or disable automatic reconnection
    pub fn with_reconnection(mut self, enabled: bool) -> Self {
        self.reconnection = enabled;
        self
    }

    /// Set the number of failed attempts allowed
    pub fn with_max_reconnect_attempts(mut self, attempts: u32) -> Self {
        self.max_reconnect_attempts = attempts;
        self
    }

    /// Set the delay between attempts in milliseconds
    pub fn with_reconnect_delay(mut self, delay_ms: u64) -> Self {
        self.reconnect_delay_ms = delay_ms;
        self
    }

    /// Set connection timeout in milliseconds
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Join the peer identity room after connecting
    pub fn with_join_room(mut self, enabled: bool) -> Self {
        self.join_room = enabled;
        self
    }

    /// Check that the configuration can be used
    pub fn validate(&self) -> ConfigResult<()> {
        for (name, url) in [("api_url", &self.api_url), ("socket_url", &self.socket_url)] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::Invalid(format!(
                    "{} must start with http:// or https://, got '{}'",
                    name, url
                )));
            }
        }

        if self.max_reconnect_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_reconnect_attempts must be at least 1".to_string(),
            ));
        }

        if self.timeout_ms == 0 {
            return Err(ConfigError::Invalid("timeout_ms must be positive".to_string()));
        }

        Ok(())
    }

    /// Build the WebSocket URL of the Socket.IO endpoint
    pub fn build_socket_url(&self) -> ConfigResult<String> {
        let base = self.socket_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            return Err(ConfigError::Invalid(format!(
                "socket_url must start with http:// or https://, got '{}'",
                self.socket_url
            )));
        };

        let path = format!("/{}/", self.socket_path.trim_matches('/'));

        Ok(format!(
            "{}{}?EIO={}&transport=websocket",
            ws_base, path, ENGINE_IO_VERSION
        ))
    }

    /// URL of the prediction endpoint
    pub fn predict_url(&self) -> String {
        join_url(&self.api_url, &self.predict_path)
    }

    /// URL of the prediction history endpoint
    pub fn history_url(&self) -> String {
        join_url(&self.api_url, &self.history_path)
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// Configuration manager
///
/// Loads and saves [`ClientConfig`] as JSON.
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration
    ///
    /// Returns the defaults if the file does not exist.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<ClientConfig> {
        let path = path.as_ref();

        tracing::debug!(path = %path.display(), "Loading config");

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: ClientConfig = serde_json::from_str(&content)?;
            tracing::info!(path = %path.display(), "Config loaded successfully");
            Ok(config)
        } else {
            tracing::info!("Config file not found, using defaults");
            Ok(ClientConfig::default())
        }
    }

    /// Save configuration
    pub fn save(path: impl AsRef<Path>, config: &ClientConfig) -> ConfigResult<()> {
        let path = path.as_ref();

        tracing::debug!(path = %path.display(), "Saving config");

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(path, content)?;

        tracing::info!(path = %path.display(), "Config saved successfully");
        Ok(())
    }
}
