use thiserror::Error;

/// Errors produced by the [`ServiceRegistry`](crate::ServiceRegistry).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Registrar names identify plugins and may not be blank.
    #[error("Registrar name for {capability} must not be empty")]
    EmptyRegistrar { capability: &'static str },

    /// A bucket stored under a capability held services of another type.
    #[error("Service bucket type mismatch for {0}")]
    CapabilityMismatch(&'static str),
}
