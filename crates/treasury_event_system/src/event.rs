//! # Event Traits
//!
//! Events form an explicit hierarchy. Every type that can be subscribed to
//! implements [`Event`]; this includes trait objects such as
//! `dyn Cancellable`, which act like interfaces shared by many concrete
//! events. Every type that can be *fired* additionally implements
//! [`Hierarchy`] and declares, once, the ancestor kinds it also satisfies.
//!
//! When a concrete event is fired, subscribers of each declared ancestor
//! that currently has subscribers (its "friend types") receive the event
//! through the declared upcast.
//!
//! ```rust
//! use treasury_event_system::{Cancellable, Event, Hierarchy, Supertypes};
//!
//! #[derive(Debug, Default)]
//! struct PaymentEvent {
//!     amount: u64,
//!     cancelled: bool,
//! }
//!
//! impl Cancellable for PaymentEvent {
//!     fn is_cancelled(&self) -> bool { self.cancelled }
//!     fn set_cancelled(&mut self, cancelled: bool) { self.cancelled = cancelled; }
//! }
//!
//! impl Event for PaymentEvent {
//!     fn as_cancellable(&self) -> Option<&dyn Cancellable> { Some(self) }
//! }
//!
//! impl Hierarchy for PaymentEvent {
//!     fn supertypes(types: &mut Supertypes<Self>) {
//!         types.cancellable();
//!     }
//! }
//! ```

use crate::caller::Callers;
use crate::completion::Completion;
use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// A type that subscribers can listen for.
///
/// Events must be `Send + Sync` because they are dispatched on a dedicated
/// executor thread and handed back through a [`FireCompletion`](crate::FireCompletion).
pub trait Event: Send + Sync + 'static {
    /// Cancellation view of this event, if it supports cancellation.
    fn as_cancellable(&self) -> Option<&dyn Cancellable> {
        None
    }
}

/// Events that later subscribers may skip once cancelled.
pub trait Cancellable: Send + Sync {
    fn is_cancelled(&self) -> bool;

    fn set_cancelled(&mut self, cancelled: bool);
}

impl Event for dyn Cancellable {
    fn as_cancellable(&self) -> Option<&dyn Cancellable> {
        Some(self)
    }
}

/// A concrete event that can be fired.
pub trait Hierarchy: Event + Sized {
    /// Declares the ancestor kinds this event also satisfies.
    fn supertypes(_types: &mut Supertypes<Self>) {}
}

/// Identity of an event kind.
#[derive(Clone, Copy)]
pub struct EventKey {
    id: TypeId,
    name: &'static str,
}

impl EventKey {
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without module path or generic arguments.
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        let base = base.trim_start_matches("dyn ");
        base.rsplit("::").next().unwrap_or(base)
    }
}

impl PartialEq for EventKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for EventKey {}

impl Hash for EventKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

type Dispatch<E> = Arc<dyn Fn(&Callers, &mut E) -> Option<Completion> + Send + Sync>;

/// Reads whether an event of kind `T` is currently cancelled.
pub(crate) type CancelCheck<T> = Arc<dyn Fn(&mut T) -> bool + Send + Sync>;

fn reported_cancellation<T: Event + ?Sized>(event: &mut T) -> bool {
    event
        .as_cancellable()
        .is_some_and(|cancellable| cancellable.is_cancelled())
}

/// One declared ancestor of `E` together with the route into its caller.
pub(crate) struct Supertype<E> {
    key: EventKey,
    dispatch: Dispatch<E>,
}

impl<E> Clone for Supertype<E> {
    fn clone(&self) -> Self {
        Self {
            key: self.key,
            dispatch: Arc::clone(&self.dispatch),
        }
    }
}

impl<E: Hierarchy> Supertype<E> {
    /// An ancestor whose subscribers read cancellation through `cancelled`.
    fn direct<T: Event + ?Sized>(upcast: fn(&mut E) -> &mut T, cancelled: CancelCheck<T>) -> Self {
        Self {
            key: EventKey::of::<T>(),
            dispatch: Arc::new(move |callers: &Callers, event: &mut E| {
                callers
                    .get::<T>()
                    .map(|caller| caller.call_with(upcast(event), cancelled.as_ref()))
            }),
        }
    }

    pub(crate) fn key(&self) -> EventKey {
        self.key
    }

    /// Runs the ancestor's subscribers against `event`, if it has any.
    pub(crate) fn dispatch(&self, callers: &Callers, event: &mut E) -> Option<Completion> {
        (self.dispatch)(callers, event)
    }
}

/// Everything a concrete event type declared about itself.
pub(crate) struct Declared<E> {
    /// Ancestors in declaration order, duplicates removed.
    pub(crate) supertypes: Vec<Supertype<E>>,
    cancellation: Option<CancelCheck<E>>,
}

impl<E: Event> Declared<E> {
    /// Whether `event` is cancelled, as seen by subscribers of `E` itself.
    ///
    /// A declared `dyn Cancellable` ancestor is authoritative; otherwise
    /// [`Event::as_cancellable`] is consulted.
    pub(crate) fn is_cancelled(&self, event: &mut E) -> bool {
        match &self.cancellation {
            Some(cancelled) => cancelled(event),
            None => reported_cancellation(event),
        }
    }
}

/// Collects the ancestors declared by [`Hierarchy::supertypes`].
pub struct Supertypes<E> {
    entries: Vec<Supertype<E>>,
    cancellation: Option<CancelCheck<E>>,
}

impl<E: Hierarchy> Supertypes<E> {
    pub(crate) fn declare() -> Declared<E> {
        let mut types = Self {
            entries: Vec::new(),
            cancellation: None,
        };
        E::supertypes(&mut types);
        Declared {
            supertypes: types.entries,
            cancellation: types.cancellation,
        }
    }

    /// Declares a fireable ancestor. Its own declared ancestors, and the
    /// way it reports cancellation, are inherited through `upcast`.
    pub fn extends<T: Hierarchy>(&mut self, upcast: fn(&mut E) -> &mut T) -> &mut Self {
        let parent = Arc::new(Supertypes::<T>::declare());

        let parent_view = Arc::clone(&parent);
        self.push(Supertype::direct(
            upcast,
            Arc::new(move |event: &mut T| parent_view.is_cancelled(event)),
        ));
        for inherited in &parent.supertypes {
            let key = inherited.key;
            let dispatch = Arc::clone(&inherited.dispatch);
            self.push(Supertype {
                key,
                dispatch: Arc::new(move |callers: &Callers, event: &mut E| {
                    dispatch(callers, upcast(event))
                }),
            });
        }
        if let Some(cancelled) = &parent.cancellation {
            let cancelled = Arc::clone(cancelled);
            self.declare_cancellation(Arc::new(move |event: &mut E| cancelled(upcast(event))));
        }
        self
    }

    /// Declares an ancestor view, typically a trait object.
    pub fn implements<T: Event + ?Sized>(&mut self, upcast: fn(&mut E) -> &mut T) -> &mut Self {
        self.push(Supertype::direct(upcast, Arc::new(reported_cancellation::<T>)));
        if TypeId::of::<T>() == TypeId::of::<dyn Cancellable>() {
            self.declare_cancellation(Arc::new(move |event: &mut E| {
                reported_cancellation(upcast(event))
            }));
        }
        self
    }

    /// Declares `dyn Cancellable` as an ancestor.
    ///
    /// Subscribers of `E` itself then honour cancellation even if `E` keeps
    /// the default [`Event::as_cancellable`].
    pub fn cancellable(&mut self) -> &mut Self
    where
        E: Cancellable,
    {
        self.implements::<dyn Cancellable>(cancellable_view::<E>)
    }

    /// First declaration wins, like ancestors themselves.
    fn declare_cancellation(&mut self, cancelled: CancelCheck<E>) {
        if self.cancellation.is_none() {
            self.cancellation = Some(cancelled);
        }
    }

    fn push(&mut self, supertype: Supertype<E>) {
        if supertype.key == EventKey::of::<E>()
            || self.entries.iter().any(|entry| entry.key == supertype.key)
        {
            return;
        }
        self.entries.push(supertype);
    }
}

fn cancellable_view<E: Cancellable + 'static>(event: &mut E) -> &mut (dyn Cancellable + 'static) {
    event
}
