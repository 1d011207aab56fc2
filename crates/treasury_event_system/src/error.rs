//! Error types for the event system.

use thiserror::Error;

/// Errors produced while subscribing to, firing or observing events.
///
/// Errors are clonable because a single failure may be reported to every
/// observer of a joined [`Completion`](crate::Completion).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// A synchronous subscriber returned an error.
    #[error("Handler execution failed: {0}")]
    HandlerFailed(String),

    /// A subscriber panicked while handling an event.
    #[error("Subscriber for {event_type} panicked: {message}")]
    SubscriberPanicked {
        event_type: &'static str,
        message: String,
    },

    /// `complete_subscription` was called without a handler.
    #[error("Subscription for {0} has no handler")]
    MissingHandler(&'static str),

    /// Both handler kinds were set on one subscription builder.
    #[error("Subscription for {0} already has a handler")]
    DuplicateHandler(&'static str),

    /// A completion was completed more than once.
    #[error("Completion was already completed")]
    AlreadyCompleted,

    /// The bus has been shut down and no longer accepts events.
    #[error("Event bus is shut down")]
    BusShutdown,

    /// The executor for an event type could not accept work.
    #[error("Executor unavailable for {0}")]
    ExecutorUnavailable(String),

    /// A stored caller did not match the requested event type.
    #[error("Event caller type mismatch for {0}")]
    TypeMismatch(&'static str),

    /// The fired event was already taken out of its completion.
    #[error("Fire outcome is no longer available")]
    OutcomeTaken,

    /// Free-form failure reported by a subscriber.
    #[error("{0}")]
    Custom(String),
}

impl EventError {
    /// Convenience constructor for subscriber failures.
    pub fn handler(message: impl Into<String>) -> Self {
        EventError::HandlerFailed(message.into())
    }
}

/// A fire whose subscribers reported at least one error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Event fire failed with {} error(s): {}", .errors.len(), summarize(.errors))]
pub struct FireError {
    errors: Vec<EventError>,
}

impl FireError {
    pub fn new(errors: Vec<EventError>) -> Self {
        Self { errors }
    }

    /// The aggregated errors in subscriber order.
    pub fn errors(&self) -> &[EventError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<EventError> {
        self.errors
    }
}

fn summarize(errors: &[EventError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}
