use thiserror::Error;
use treasury_event_system::{EventError, FireError};
use treasury_services::ServiceError;

/// Errors raised while configuring, starting or stopping the host.
#[derive(Error, Debug)]
pub enum TreasuryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    #[error("Failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    #[error("Configuration validation failed: {0}")]
    InvalidConfig(String),

    #[error("Failed to set up logging: {0}")]
    Logging(String),

    /// A second core was installed into a slot that already holds one.
    #[error("A Treasury core is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Event(#[from] EventError),

    #[error(transparent)]
    Fire(#[from] FireError),

    #[error(transparent)]
    Service(#[from] ServiceError),
}
