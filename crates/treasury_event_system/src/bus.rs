//! The event bus facade.

use crate::caller::Callers;
use crate::completion::{fire_channel, Completion, FireCompletion};
use crate::error::EventError;
use crate::event::{Event, EventKey, Hierarchy};
use crate::shutdown::ShutdownState;
use crate::stats::{Counters, EventBusStats};
use crate::subscriber::{EventSubscriber, SubscriptionBuilder};
use crate::tracker::{EventExecutorTracker, EventTypeTracker};
use std::any::TypeId;
use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, trace, warn};

/// Tunables for an [`EventBus`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventBusConfig {
    /// Prefix for executor thread names, followed by the event type name
    pub executor_thread_prefix: String,
    /// Upper bound on how long `shutdown` waits for executors to drain
    pub shutdown_timeout: Duration,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            executor_thread_prefix: "treasury-event".to_string(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

/// In-process event bus with hierarchical routing.
///
/// Subscribing is synchronous. Firing never blocks: the dispatch is queued
/// on the executor dedicated to the event's concrete type and a
/// [`FireCompletion`] is returned straight away. Fires of one type are
/// dispatched in submission order.
///
/// A bus is an ordinary value; share it with `Arc` and call
/// [`shutdown`](Self::shutdown) when the host tears down.
pub struct EventBus {
    callers: Arc<Callers>,
    types: EventTypeTracker,
    executors: EventExecutorTracker,
    shutdown: ShutdownState,
    counters: Arc<Counters>,
    config: EventBusConfig,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    pub fn with_config(config: EventBusConfig) -> Self {
        Self {
            callers: Arc::new(Callers::new()),
            types: EventTypeTracker::new(),
            executors: EventExecutorTracker::new(config.executor_thread_prefix.clone()),
            shutdown: ShutdownState::new(),
            counters: Arc::new(Counters::default()),
            config,
        }
    }

    /// Registers `subscriber` with the caller for its event kind.
    ///
    /// # Arguments
    ///
    /// * `subscriber` - A finished subscription, usually built through
    ///   [`subscription_for`](Self::subscription_for)
    ///
    /// # Returns
    ///
    /// `Ok(())` once the subscriber is in place. Fires dispatched after this
    /// returns will reach it.
    pub fn subscribe<T: Event + ?Sized>(&self, subscriber: EventSubscriber<T>) -> Result<(), EventError> {
        let caller = self.callers.get_or_create::<T>()?;
        caller.register(subscriber);
        Ok(())
    }

    /// Starts building a subscription for events of kind `T`.
    pub fn subscription_for<T: Event + ?Sized>(&self) -> SubscriptionBuilder<T> {
        SubscriptionBuilder::new()
    }

    /// Fires `event` to its own subscribers and to those of every declared
    /// ancestor that currently has subscribers.
    ///
    /// Dispatch happens on the executor thread dedicated to `E`, so this never
    /// blocks on subscribers.
    ///
    /// # Arguments
    ///
    /// * `event` - The event to dispatch. Ownership returns through the
    ///   completion.
    ///
    /// # Returns
    ///
    /// A [`FireCompletion`] that hands the event back once every subscriber,
    /// including deferred ones, has finished. After [`shutdown`](Self::shutdown)
    /// it fails immediately with [`EventError::BusShutdown`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use treasury_event_system::{Event, EventBus, Hierarchy};
    ///
    /// #[derive(Debug, Default)]
    /// struct BalanceChanged {
    ///     delta: i64,
    /// }
    ///
    /// impl Event for BalanceChanged {}
    /// impl Hierarchy for BalanceChanged {}
    ///
    /// let bus = EventBus::new();
    /// bus.subscribe(
    ///     bus.subscription_for::<BalanceChanged>()
    ///         .when_called(|event| {
    ///             event.delta *= 2;
    ///             Ok(())
    ///         })
    ///         .complete_subscription()
    ///         .unwrap(),
    /// )
    /// .unwrap();
    ///
    /// let event = bus.fire(BalanceChanged { delta: 5 }).wait().unwrap();
    /// assert_eq!(event.delta, 10);
    /// bus.shutdown();
    /// ```
    pub fn fire<E: Hierarchy>(&self, event: E) -> FireCompletion<E> {
        let key = EventKey::of::<E>();
        if self.shutdown.is_shutdown_initiated() {
            warn!("⚠️ Rejected {} fired after shutdown", key.short_name());
            return FireCompletion::failed(vec![EventError::BusShutdown]);
        }

        let caller = self.callers.get::<E>().filter(|caller| !caller.is_empty());
        let friends = self.types.friends_of::<E>(&self.callers);
        let declared = self.types.declared::<E>();
        self.counters.record_fire();

        if caller.is_none() && friends.is_empty() {
            trace!("No subscribers for {}", key.short_name());
            return FireCompletion::ready(event);
        }

        let executor = match self.executors.executor_for(key) {
            Ok(executor) => executor,
            Err(e) => {
                error!("❌ No executor for {}: {}", key.short_name(), e);
                return FireCompletion::failed(vec![e]);
            }
        };

        let (completer, completion) = fire_channel::<E>();
        let callers = Arc::clone(&self.callers);
        let counters = Arc::clone(&self.counters);
        let job = Box::new(move || {
            let mut event = event;
            let mut completions = Vec::with_capacity(friends.len() + 1);
            if let Some(caller) = caller {
                let is_cancelled = |event: &mut E| declared.is_cancelled(event);
                completions.push(caller.call_with(&mut event, &is_cancelled));
            }
            for friend in &friends {
                if let Some(done) = friend.dispatch(&callers, &mut event) {
                    completions.push(done);
                }
            }
            trace!(
                "Dispatched {} to {} caller(s)",
                key.short_name(),
                completions.len()
            );

            Completion::join(completions).when_complete(move |errors| {
                if errors.is_empty() {
                    completer.complete(event);
                } else {
                    counters.record_failure();
                    debug!(
                        "Fire of {} failed with {} error(s)",
                        key.short_name(),
                        errors.len()
                    );
                    completer.fail(errors.to_vec());
                }
            });
        });

        // A rejected job drops its completer, which fails the completion.
        if let Err(e) = executor.execute(job) {
            warn!("⚠️ Could not queue {}: {}", key.short_name(), e);
        }
        completion
    }

    /// Subscribers registered directly for `T`.
    pub fn subscriber_count<T: Event + ?Sized>(&self) -> usize {
        self.callers.subscriber_count(&TypeId::of::<T>())
    }

    /// Ancestors of `E` that a fire right now would also reach.
    pub fn friend_types<E: Hierarchy>(&self) -> Vec<EventKey> {
        self.types
            .friends_of::<E>(&self.callers)
            .iter()
            .map(|friend| friend.key())
            .collect()
    }

    /// Current counters. Subscriber and executor counts are read live; the
    /// rest accumulate for the lifetime of the bus.
    pub fn stats(&self) -> EventBusStats {
        EventBusStats {
            events_fired: self.counters.events_fired.load(Ordering::Relaxed),
            fires_failed: self.counters.fires_failed.load(Ordering::Relaxed),
            total_subscribers: self.callers.total_subscribers(),
            executors: self.executors.len(),
        }
    }

    pub fn shutdown_state(&self) -> &ShutdownState {
        &self.shutdown
    }

    pub fn is_shut_down(&self) -> bool {
        self.shutdown.is_shutdown_initiated()
    }

    /// Stops accepting fires, then drains and joins every executor.
    ///
    /// Fires already queued still run. Calling this more than once is a no-op.
    pub fn shutdown(&self) {
        if !self.shutdown.initiate_shutdown() {
            return;
        }
        let total = self.executors.len();
        let joined = self.executors.shutdown(self.config.shutdown_timeout);
        info!("🧵 Stopped {}/{} event executors", joined, total);
        self.shutdown.complete_shutdown();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("stats", &self.stats())
            .field("shut_down", &self.is_shut_down())
            .field("config", &self.config)
            .finish()
    }
}
