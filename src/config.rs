//! Configuration management
//!
//! Handles loading and validating client configuration from TOML files.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub keepalive: KeepaliveConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Server address, e.g. `http://localhost:2023`
    pub address: String,
    /// Credential sent with every new connection
    #[serde(default)]
    pub token: String,
}

/// Keepalive configuration
#[derive(Debug, Clone, Deserialize)]
pub struct KeepaliveConfig {
    /// Seconds between pings while connected
    #[serde(default = "default_keepalive_interval")]
    pub interval_secs: u64,
}

impl KeepaliveConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_keepalive_interval(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Output format: "json" or "pretty"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

// Default value functions
fn default_keepalive_interval() -> u64 { 300 }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "pretty".to_string() }

impl ClientConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        Self::parse(&contents)
    }

    /// Parse and validate TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: ClientConfig =
            toml::from_str(contents).with_context(|| "Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.server.address.trim().is_empty() {
            anyhow::bail!("server.address must not be empty");
        }
        if self.keepalive.interval_secs == 0 {
            anyhow::bail!("keepalive.interval_secs must be > 0");
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            anyhow::bail!(
                "logging.format must be \"json\" or \"pretty\", got {:?}",
                self.logging.format
            );
        }
        Ok(())
    }
}
