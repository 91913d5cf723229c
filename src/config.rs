//! Configuration management for the motion bridge.
//!
//! This module handles loading and validating configuration from environment
//! variables and configuration files.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Main configuration for the bridge.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// SecuritySpy server connection settings
    pub server: ServerConfig,

    /// Camera channel settings
    pub camera: CameraConfig,

    /// Session supervision settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Host-platform notification settings
    #[serde(default)]
    pub host: HostConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// SecuritySpy server connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server hostname or IP address
    pub host: String,

    /// HTTP port for the event stream and snapshot endpoints
    #[serde(default = "default_http_port")]
    pub port: u16,

    /// RTSP port for live stream URLs
    #[serde(default = "default_rtsp_port")]
    pub rtsp_port: u16,

    /// SecuritySpy username
    pub username: String,

    /// SecuritySpy password
    pub password: String,

    /// HTTP request timeout in seconds (handshake and snapshot fetches)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

/// Camera channel configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CameraConfig {
    /// SecuritySpy camera number this bridge instance is scoped to
    pub number: u32,
}

/// Session supervision configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Maximum lifetime of one event-stream session in seconds.
    /// Reaching it triggers a forced reconnect, not an error.
    #[serde(default = "default_max_session_secs")]
    pub max_session_secs: u64,

    /// Base delay between connection attempts in milliseconds
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Maximum delay between connection attempts in milliseconds
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

/// Host-platform notification configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostConfig {
    /// Webhook URL to deliver motion start/stop notifications to.
    /// When unset, notifications are logged only.
    #[serde(default)]
    pub notify_url: Option<String>,

    /// Capacity of the pending-notification queue
    #[serde(default = "default_notify_queue_size")]
    pub notify_queue_size: usize,

    /// Notification request timeout in seconds
    #[serde(default = "default_notify_timeout")]
    pub notify_timeout_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_http_port() -> u16 {
    8000
}
fn default_rtsp_port() -> u16 {
    8000
}
fn default_request_timeout() -> u64 {
    10
}
fn default_max_session_secs() -> u64 {
    14_400
}
fn default_retry_base_delay_ms() -> u64 {
    1000
}
fn default_retry_max_delay_ms() -> u64 {
    30_000
}
fn default_notify_queue_size() -> usize {
    32
}
fn default_notify_timeout() -> u64 {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_session_secs: default_max_session_secs(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default config file (config/default.toml)
    /// 2. Environment-specific config (config/{env}.toml)
    /// 3. Environment variables (prefixed with BRIDGE_)
    pub fn load() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Override with environment variables (e.g. BRIDGE_SERVER__HOST)
            .add_source(
                Environment::with_prefix("BRIDGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Create configuration from environment variables only.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("BRIDGE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.server.host.is_empty() {
            return Err(ConfigValidationError::MissingField("server.host".to_string()));
        }

        if self.server.username.is_empty() {
            return Err(ConfigValidationError::MissingField(
                "server.username".to_string(),
            ));
        }

        if self.session.max_session_secs == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "session.max_session_secs".to_string(),
                message: "Session ceiling must be greater than 0".to_string(),
            });
        }

        if self.session.retry_base_delay_ms > self.session.retry_max_delay_ms {
            return Err(ConfigValidationError::InvalidValue {
                field: "session.retry_base_delay_ms".to_string(),
                message: "Base retry delay must not exceed the maximum delay".to_string(),
            });
        }

        if let Some(url) = &self.host.notify_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigValidationError::InvalidValue {
                    field: "host.notify_url".to_string(),
                    message: "URL must start with http:// or https://".to_string(),
                });
            }
        }

        if self.host.notify_queue_size == 0 {
            return Err(ConfigValidationError::InvalidValue {
                field: "host.notify_queue_size".to_string(),
                message: "Notification queue must hold at least one entry".to_string(),
            });
        }

        Ok(())
    }
}

impl ServerConfig {
    /// Get the HTTP request timeout as Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl SessionConfig {
    /// Get the session ceiling as Duration.
    pub fn max_session(&self) -> Duration {
        Duration::from_secs(self.max_session_secs)
    }

    /// Get the base retry delay as Duration.
    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Get the maximum retry delay as Duration.
    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }
}

impl HostConfig {
    /// Get the notification timeout as Duration.
    pub fn notify_timeout(&self) -> Duration {
        Duration::from_secs(self.notify_timeout_secs)
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
