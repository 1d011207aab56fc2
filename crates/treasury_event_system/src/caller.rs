//! Per-event-type subscriber lists.

use crate::completion::Completion;
use crate::error::EventError;
use crate::event::{Event, EventKey};
use crate::sorted::SortedList;
use crate::subscriber::EventSubscriber;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, trace};

/// Ordered subscribers for exactly one event kind.
///
/// Subscribers are kept in ascending [`EventPriority`](crate::EventPriority)
/// order; equal priorities run in the order they subscribed.
pub struct EventCaller<T: ?Sized> {
    key: EventKey,
    subscribers: RwLock<SortedList<Arc<EventSubscriber<T>>>>,
}

impl<T: Event + ?Sized> EventCaller<T> {
    pub fn new() -> Self {
        Self {
            key: EventKey::of::<T>(),
            subscribers: RwLock::new(SortedList::with_comparator(|a, b| {
                a.priority().cmp(&b.priority())
            })),
        }
    }

    pub fn register(&self, subscriber: EventSubscriber<T>) {
        let priority = subscriber.priority();
        let position = self
            .subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .add(Arc::new(subscriber));
        debug!(
            "📝 Registered {:?} subscriber for {} at position {}",
            priority,
            self.key.short_name(),
            position
        );
    }

    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Runs every subscriber in priority order against `event`.
    ///
    /// A subscriber that ignores cancelled events is skipped if the event is
    /// cancelled by the time its turn comes. Failures are collected rather
    /// than stopping the remaining subscribers.
    ///
    /// Cancellation is read through [`Event::as_cancellable`]; see
    /// [`call_with`](Self::call_with) to supply it from elsewhere.
    pub fn call(&self, event: &mut T) -> Completion {
        self.call_with(event, &|event: &mut T| {
            event
                .as_cancellable()
                .is_some_and(|cancellable| cancellable.is_cancelled())
        })
    }

    /// Like [`call`](Self::call), with `is_cancelled` re-evaluated before
    /// each subscriber.
    pub(crate) fn call_with(
        &self,
        event: &mut T,
        is_cancelled: &dyn Fn(&mut T) -> bool,
    ) -> Completion {
        // Snapshot so subscribers may subscribe from inside a handler.
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .to_vec();

        let mut completions = Vec::with_capacity(subscribers.len());
        for subscriber in subscribers {
            if subscriber.ignores_cancelled() && is_cancelled(event) {
                trace!(
                    "Skipping {:?} subscriber for cancelled {}",
                    subscriber.priority(),
                    self.key.short_name()
                );
                continue;
            }
            completions.push(subscriber.invoke(event));
        }

        Completion::join(completions)
    }
}

impl<T: Event + ?Sized> Default for EventCaller<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased view of an [`EventCaller`] for heterogeneous storage.
pub(crate) trait AnyCaller: Send + Sync {
    fn subscriber_count(&self) -> usize;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<T: Event + ?Sized> AnyCaller for EventCaller<T> {
    fn subscriber_count(&self) -> usize {
        self.len()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Concurrent map from event kind to its memoised caller.
#[derive(Default)]
pub(crate) struct Callers {
    map: DashMap<TypeId, Arc<dyn AnyCaller>>,
}

impl Callers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn get<T: Event + ?Sized>(&self) -> Option<Arc<EventCaller<T>>> {
        let erased = self.map.get(&TypeId::of::<T>())?.value().clone();
        erased.into_any().downcast::<EventCaller<T>>().ok()
    }

    /// Returns the caller for `T`, creating it atomically if absent.
    pub(crate) fn get_or_create<T: Event + ?Sized>(&self) -> Result<Arc<EventCaller<T>>, EventError> {
        let erased = self
            .map
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Arc::new(EventCaller::<T>::new()) as Arc<dyn AnyCaller>)
            .value()
            .clone();
        erased
            .into_any()
            .downcast::<EventCaller<T>>()
            .map_err(|_| EventError::TypeMismatch(std::any::type_name::<T>()))
    }

    pub(crate) fn has_subscribers(&self, id: &TypeId) -> bool {
        self.map
            .get(id)
            .is_some_and(|caller| caller.subscriber_count() > 0)
    }

    pub(crate) fn subscriber_count(&self, id: &TypeId) -> usize {
        self.map
            .get(id)
            .map_or(0, |caller| caller.subscriber_count())
    }

    pub(crate) fn total_subscribers(&self) -> usize {
        self.map
            .iter()
            .map(|caller| caller.subscriber_count())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Cancellable;
    use crate::priority::EventPriority;
    use crate::subscriber::SubscriptionBuilder;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Purchase {
        cancelled: bool,
        log: Vec<&'static str>,
    }
    impl Cancellable for Purchase {
        fn is_cancelled(&self) -> bool {
            self.cancelled
        }
        fn set_cancelled(&mut self, cancelled: bool) {
            self.cancelled = cancelled;
        }
    }
    impl Event for Purchase {
        fn as_cancellable(&self) -> Option<&dyn Cancellable> {
            Some(self)
        }
    }

    fn subscriber(
        priority: EventPriority,
        ignore_cancelled: bool,
        label: &'static str,
    ) -> EventSubscriber<Purchase> {
        SubscriptionBuilder::new()
            .with_priority(priority)
            .ignore_cancelled(ignore_cancelled)
            .when_called(move |purchase: &mut Purchase| {
                purchase.log.push(label);
                Ok(())
            })
            .complete_subscription()
            .unwrap()
    }

    #[test]
    fn runs_in_ascending_priority_with_stable_ties() {
        let caller = EventCaller::<Purchase>::new();
        caller.register(subscriber(EventPriority::Highest, false, "highest"));
        caller.register(subscriber(EventPriority::Normal, false, "normal-1"));
        caller.register(subscriber(EventPriority::Lowest, false, "lowest"));
        caller.register(subscriber(EventPriority::Normal, false, "normal-2"));

        let mut purchase = Purchase::default();
        assert!(caller.call(&mut purchase).wait().is_empty());
        assert_eq!(
            purchase.log,
            vec!["lowest", "normal-1", "normal-2", "highest"]
        );
    }

    #[test]
    fn only_ignore_cancelled_subscribers_are_skipped() {
        let caller = EventCaller::<Purchase>::new();
        caller.register(
            SubscriptionBuilder::new()
                .with_priority(EventPriority::Low)
                .when_called(|purchase: &mut Purchase| {
                    purchase.log.push("low");
                    purchase.set_cancelled(true);
                    Ok(())
                })
                .complete_subscription()
                .unwrap(),
        );
        caller.register(subscriber(EventPriority::Normal, true, "normal"));
        caller.register(subscriber(EventPriority::High, false, "high"));

        let mut purchase = Purchase::default();
        caller.call(&mut purchase).wait();
        assert_eq!(purchase.log, vec!["low", "high"]);
    }

    #[test]
    fn failures_do_not_stop_later_subscribers() {
        let caller = EventCaller::<Purchase>::new();
        caller.register(
            SubscriptionBuilder::new()
                .with_priority(EventPriority::Low)
                .when_called(|_: &mut Purchase| Err(EventError::handler("first")))
                .complete_subscription()
                .unwrap(),
        );
        caller.register(
            SubscriptionBuilder::new()
                .when_called(|_: &mut Purchase| -> Result<(), EventError> { panic!("second") })
                .complete_subscription()
                .unwrap(),
        );
        caller.register(subscriber(EventPriority::High, false, "third"));

        let mut purchase = Purchase::default();
        let errors = caller.call(&mut purchase).wait();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0], EventError::handler("first"));
        assert!(matches!(errors[1], EventError::SubscriberPanicked { .. }));
        assert_eq!(purchase.log, vec!["third"]);
    }

    #[test]
    fn deferred_subscriber_holds_the_call_open() {
        let pending = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&pending);
        let caller = EventCaller::<Purchase>::new();
        caller.register(
            SubscriptionBuilder::new()
                .when_called_deferred(move |_: &mut Purchase| {
                    let completion = Completion::new();
                    *slot.lock().unwrap() = Some(completion.clone());
                    completion
                })
                .complete_subscription()
                .unwrap(),
        );

        let done = caller.call(&mut Purchase::default());
        assert!(!done.is_done());
        pending.lock().unwrap().take().unwrap().complete().unwrap();
        assert!(done.is_done());
    }

    #[test]
    fn callers_are_memoised() {
        let callers = Callers::new();
        assert!(callers.get::<Purchase>().is_none());
        let first = callers.get_or_create::<Purchase>().unwrap();
        let second = callers.get_or_create::<Purchase>().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(!callers.has_subscribers(&TypeId::of::<Purchase>()));

        first.register(subscriber(EventPriority::Normal, false, "x"));
        assert!(callers.has_subscribers(&TypeId::of::<Purchase>()));
        assert_eq!(callers.subscriber_count(&TypeId::of::<Purchase>()), 1);
        assert_eq!(callers.total_subscribers(), 1);
    }
}
