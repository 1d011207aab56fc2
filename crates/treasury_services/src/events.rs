//! Notifications fired by the registry.
//!
//! Every registry event also satisfies `dyn ServiceEvent`, so one
//! subscription observes registrations and removals of every capability.

use crate::service::{Service, ServicePriority};
use std::fmt;
use treasury_event_system::{Event, Hierarchy, Supertypes};

/// Capability-independent view of a registry notification.
pub trait ServiceEvent: Send + Sync {
    /// Type name of the capability the service provides.
    fn capability_name(&self) -> &'static str;

    fn registrar_name(&self) -> &str;

    fn priority(&self) -> ServicePriority;

    /// `true` for registrations, `false` for removals.
    fn is_registration(&self) -> bool;
}

impl Event for dyn ServiceEvent {}

fn service_view<E: ServiceEvent + 'static>(event: &mut E) -> &mut (dyn ServiceEvent + 'static) {
    event
}

/// Fired after a service has been added to its capability bucket.
pub struct ServiceRegisteredEvent<C: ?Sized> {
    service: Service<C>,
}

impl<C: ?Sized> ServiceRegisteredEvent<C> {
    pub fn new(service: Service<C>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Service<C> {
        &self.service
    }
}

/// Fired after a service has been removed from its capability bucket.
pub struct ServiceUnregisteredEvent<C: ?Sized> {
    service: Service<C>,
}

impl<C: ?Sized> ServiceUnregisteredEvent<C> {
    pub fn new(service: Service<C>) -> Self {
        Self { service }
    }

    pub fn service(&self) -> &Service<C> {
        &self.service
    }
}

macro_rules! registry_event {
    ($event:ident, $registration:expr) => {
        impl<C: ?Sized + Send + Sync + 'static> ServiceEvent for $event<C> {
            fn capability_name(&self) -> &'static str {
                std::any::type_name::<C>()
            }

            fn registrar_name(&self) -> &str {
                self.service.registrar_name()
            }

            fn priority(&self) -> ServicePriority {
                self.service.priority()
            }

            fn is_registration(&self) -> bool {
                $registration
            }
        }

        impl<C: ?Sized + Send + Sync + 'static> Event for $event<C> {}

        impl<C: ?Sized + Send + Sync + 'static> Hierarchy for $event<C> {
            fn supertypes(types: &mut Supertypes<Self>) {
                types.implements::<dyn ServiceEvent>(service_view::<Self>);
            }
        }

        impl<C: ?Sized> fmt::Debug for $event<C> {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($event))
                    .field("service", &self.service)
                    .finish()
            }
        }
    };
}

registry_event!(ServiceRegisteredEvent, true);
registry_event!(ServiceUnregisteredEvent, false);
