//! # Treasury Host
//!
//! Boots the Treasury core: a hierarchical event bus and the service
//! registry built on it. This crate handles CLI parsing, configuration
//! loading, logging setup and the lifecycle of the shared core.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration (creates treasury.toml if missing)
//! treasury
//!
//! # Specify custom configuration and log level
//! treasury --config production.toml --log-level debug
//!
//! # JSON logging, start up and exit straight away
//! treasury --json-logs --once
//! ```
//!
//! ## Signal Handling
//!
//! The host shuts down gracefully on SIGINT (Ctrl+C) and SIGTERM, draining
//! every event executor before exiting.

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod signals;

pub use app::Application;
pub use cli::CliArgs;
pub use config::{EventSettings, LoggingSettings, TreasuryConfig};
pub use error::TreasuryError;
pub use lifecycle::{CoreStartedEvent, Lifecycle, Treasury};

/// Parses arguments, loads configuration, sets up logging and runs the host
/// until shutdown.
pub async fn init() -> Result<(), TreasuryError> {
    let args = CliArgs::parse();

    let config = TreasuryConfig::load_from_file(&args.config_path).await?;
    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    logging::setup_logging(
        &LoggingSettings {
            level: log_level,
            json_format: config.logging.json_format,
        },
        args.json_logs,
    )?;

    Application::new(config, &args)?.run().await
}
