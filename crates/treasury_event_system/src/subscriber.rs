//! Event subscribers and the builder used to construct them.

use crate::completion::Completion;
use crate::error::EventError;
use crate::event::{Event, EventKey};
use crate::priority::EventPriority;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::error;

/// Synchronous subscriber body.
pub type Action<T> = Arc<dyn Fn(&mut T) -> Result<(), EventError> + Send + Sync>;

/// Subscriber body that finishes later by completing the returned [`Completion`].
pub type Deferred<T> = Arc<dyn Fn(&mut T) -> Completion + Send + Sync>;

/// The two kinds of subscriber body.
pub enum Handler<T: ?Sized> {
    /// Runs to completion before the next subscriber.
    Action(Action<T>),
    /// Holds the fire open until the returned completion is completed.
    Deferred(Deferred<T>),
}

impl<T: ?Sized> Clone for Handler<T> {
    fn clone(&self) -> Self {
        match self {
            Handler::Action(action) => Handler::Action(Arc::clone(action)),
            Handler::Deferred(deferred) => Handler::Deferred(Arc::clone(deferred)),
        }
    }
}

/// A registered listener for events of kind `T`.
pub struct EventSubscriber<T: ?Sized> {
    key: EventKey,
    priority: EventPriority,
    ignore_cancelled: bool,
    handler: Handler<T>,
}

impl<T: Event + ?Sized> EventSubscriber<T> {
    pub fn new(priority: EventPriority, ignore_cancelled: bool, handler: Handler<T>) -> Self {
        Self {
            key: EventKey::of::<T>(),
            priority,
            ignore_cancelled,
            handler,
        }
    }

    pub fn event_key(&self) -> EventKey {
        self.key
    }

    pub fn priority(&self) -> EventPriority {
        self.priority
    }

    /// Whether this subscriber is skipped for events already cancelled.
    pub fn ignores_cancelled(&self) -> bool {
        self.ignore_cancelled
    }

    /// Runs the handler, turning errors and panics into a failed completion.
    pub(crate) fn invoke(&self, event: &mut T) -> Completion {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| match &self.handler {
            Handler::Action(action) => match action(event) {
                Ok(()) => Completion::completed(),
                Err(e) => {
                    error!("❌ Subscriber for {} failed: {}", self.key.short_name(), e);
                    Completion::completed_exceptionally(e)
                }
            },
            Handler::Deferred(deferred) => deferred(event),
        }));

        outcome.unwrap_or_else(|payload| {
            let message = panic_message(payload.as_ref());
            error!("💥 Subscriber for {} panicked: {}", self.key.short_name(), message);
            Completion::completed_exceptionally(EventError::SubscriberPanicked {
                event_type: self.key.name(),
                message,
            })
        })
    }
}

impl<T: ?Sized> fmt::Debug for EventSubscriber<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.handler {
            Handler::Action(_) => "action",
            Handler::Deferred(_) => "deferred",
        };
        f.debug_struct("EventSubscriber")
            .field("event", &self.key)
            .field("priority", &self.priority)
            .field("ignore_cancelled", &self.ignore_cancelled)
            .field("handler", &kind)
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Fluent construction of an [`EventSubscriber`].
///
/// Exactly one of [`when_called`](Self::when_called) or
/// [`when_called_deferred`](Self::when_called_deferred) must be used.
pub struct SubscriptionBuilder<T: ?Sized> {
    priority: EventPriority,
    ignore_cancelled: bool,
    handler: Option<Handler<T>>,
    duplicate: bool,
}

impl<T: Event + ?Sized> SubscriptionBuilder<T> {
    pub fn new() -> Self {
        Self {
            priority: EventPriority::default(),
            ignore_cancelled: false,
            handler: None,
            duplicate: false,
        }
    }

    pub fn with_priority(mut self, priority: EventPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Skip this subscriber when an earlier one has cancelled the event.
    pub fn ignore_cancelled(mut self, ignore: bool) -> Self {
        self.ignore_cancelled = ignore;
        self
    }

    pub fn when_called<F>(self, action: F) -> Self
    where
        F: Fn(&mut T) -> Result<(), EventError> + Send + Sync + 'static,
    {
        self.set_handler(Handler::Action(Arc::new(action)))
    }

    pub fn when_called_deferred<F>(self, deferred: F) -> Self
    where
        F: Fn(&mut T) -> Completion + Send + Sync + 'static,
    {
        self.set_handler(Handler::Deferred(Arc::new(deferred)))
    }

    fn set_handler(mut self, handler: Handler<T>) -> Self {
        if self.handler.is_some() {
            self.duplicate = true;
        }
        self.handler = Some(handler);
        self
    }

    pub fn complete_subscription(self) -> Result<EventSubscriber<T>, EventError> {
        let name = std::any::type_name::<T>();
        if self.duplicate {
            return Err(EventError::DuplicateHandler(name));
        }
        let handler = self.handler.ok_or(EventError::MissingHandler(name))?;
        Ok(EventSubscriber::new(self.priority, self.ignore_cancelled, handler))
    }
}

impl<T: Event + ?Sized> Default for SubscriptionBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Ping {
        hits: u32,
    }
    impl Event for Ping {}

    #[test]
    fn builder_requires_exactly_one_handler() {
        let missing = SubscriptionBuilder::<Ping>::new().complete_subscription();
        assert!(matches!(missing, Err(EventError::MissingHandler(_))));

        let duplicate = SubscriptionBuilder::<Ping>::new()
            .when_called(|_| Ok(()))
            .when_called_deferred(|_| Completion::completed())
            .complete_subscription();
        assert!(matches!(duplicate, Err(EventError::DuplicateHandler(_))));

        let subscriber = SubscriptionBuilder::<Ping>::new()
            .with_priority(EventPriority::High)
            .ignore_cancelled(true)
            .when_called(|_| Ok(()))
            .complete_subscription()
            .unwrap();
        assert_eq!(subscriber.priority(), EventPriority::High);
        assert!(subscriber.ignores_cancelled());
        assert_eq!(subscriber.event_key(), EventKey::of::<Ping>());
    }

    #[test]
    fn invoke_records_errors_and_panics() {
        let mut ping = Ping::default();

        let ok = SubscriptionBuilder::<Ping>::new()
            .when_called(|ping| {
                ping.hits += 1;
                Ok(())
            })
            .complete_subscription()
            .unwrap();
        assert!(ok.invoke(&mut ping).wait().is_empty());
        assert_eq!(ping.hits, 1);

        let failing = SubscriptionBuilder::<Ping>::new()
            .when_called(|_| Err(EventError::handler("insufficient funds")))
            .complete_subscription()
            .unwrap();
        assert_eq!(
            failing.invoke(&mut ping).wait(),
            vec![EventError::handler("insufficient funds")]
        );

        let panicking = SubscriptionBuilder::<Ping>::new()
            .when_called(|_| panic!("ledger corrupted"))
            .complete_subscription()
            .unwrap();
        let errors = panicking.invoke(&mut ping).wait();
        assert!(matches!(
            errors.as_slice(),
            [EventError::SubscriberPanicked { message, .. }] if message == "ledger corrupted"
        ));
    }
}
