//! Configuration management for the Treasury host.
//!
//! Settings are loaded from a TOML file and may be overridden from the
//! command line before validation.

use crate::error::TreasuryError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;
use treasury_event_system::EventBusConfig;

fn default_thread_prefix() -> String {
    "treasury-event".to_string()
}

fn default_shutdown_timeout_ms() -> u64 {
    5000
}

fn default_stats_interval_secs() -> u64 {
    60
}

fn default_level() -> String {
    "info".to_string()
}

/// Top-level host configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreasuryConfig {
    #[serde(default)]
    pub events: EventSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Event bus tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSettings {
    /// Executor threads are named `<prefix>-<EventType>`
    #[serde(default = "default_thread_prefix")]
    pub executor_thread_prefix: String,
    /// Upper bound for draining executors on shutdown
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// Interval between bus statistics reports (0 disables them)
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            executor_thread_prefix: default_thread_prefix(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

/// Logging system configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            json_format: false,
        }
    }
}

impl TreasuryConfig {
    /// Loads configuration from a TOML file.
    ///
    /// If the file doesn't exist, the default configuration is written to
    /// `path` and returned.
    pub async fn load_from_file(path: &Path) -> Result<Self, TreasuryError> {
        if path.exists() {
            let content = tokio::fs::read_to_string(path).await?;
            Ok(toml::from_str(&content)?)
        } else {
            let default_config = TreasuryConfig::default();
            let toml_content = toml::to_string_pretty(&default_config)?;
            tokio::fs::write(path, toml_content).await?;
            info!("Created default configuration file: {}", path.display());
            Ok(default_config)
        }
    }

    /// Checks the configuration for values the host cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.events.executor_thread_prefix.trim().is_empty() {
            return Err("events.executor_thread_prefix cannot be empty".to_string());
        }

        if self.events.shutdown_timeout_ms == 0 {
            return Err("events.shutdown_timeout_ms must be greater than 0".to_string());
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            return Err(format!(
                "Invalid log level: {}. Must be one of: {valid_levels:?}",
                &self.logging.level
            ));
        }

        Ok(())
    }

    pub fn to_bus_config(&self) -> EventBusConfig {
        EventBusConfig {
            executor_thread_prefix: self.events.executor_thread_prefix.clone(),
            shutdown_timeout: Duration::from_millis(self.events.shutdown_timeout_ms),
        }
    }
}
