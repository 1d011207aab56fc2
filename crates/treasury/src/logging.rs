//! Logging system setup.
//!
//! Initializes `tracing-subscriber` with either human-readable or JSON
//! output. Thread names are always included so dispatch can be followed per
//! event executor (`treasury-event-<EventType>`).

use crate::config::LoggingSettings;
use crate::error::TreasuryError;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the global subscriber.
///
/// `RUST_LOG` takes precedence over the configured level when set.
///
/// # Arguments
///
/// * `config` - Level and output format from the `[logging]` table
/// * `json_format` - Forces JSON output regardless of the configuration
///
/// # Returns
///
/// An error if a global subscriber was already installed.
pub fn setup_logging(config: &LoggingSettings, json_format: bool) -> Result<(), TreasuryError> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if json_format || config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()
    };
    result.map_err(|e| TreasuryError::Logging(e.to_string()))?;

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(())
}

/// Logs the startup banner.
pub fn display_banner() {
    let version = env!("CARGO_PKG_VERSION");
    info!("╔══════════════════════════════════════════╗");
    info!("║              💰 TREASURY 💰              ║");
    info!("║     Economy event bus + service registry ║");
    info!("║                 v{:<24}║", version);
    info!("╚══════════════════════════════════════════╝");
}
