//! Capability-keyed service registry.

use crate::error::ServiceError;
use crate::events::{ServiceRegisteredEvent, ServiceUnregisteredEvent};
use crate::service::{Service, ServicePriority};
use compact_str::CompactString;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use treasury_event_system::{Completion, EventBus, FireCompletion, SortedList};

/// Deferred fire of one removal notice.
type Notice = Box<dyn FnOnce(&EventBus) -> Completion + Send>;

/// A snapshot of one registered service, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub capability: &'static str,
    pub registrar: CompactString,
    pub priority: ServicePriority,
}

/// Type-erased access to a [`ServiceBucket`].
trait Bucket: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn is_empty(&self) -> bool;

    /// Removes every service owned by `registrar_name`, returning one removal
    /// notice per service in bucket order.
    fn remove_registrar(&mut self, registrar_name: &str) -> Vec<Notice>;

    fn registrations(&self) -> Vec<Registration>;
}

/// Services for one capability, highest priority first.
struct ServiceBucket<C: ?Sized> {
    services: SortedList<Service<C>>,
}

impl<C: ?Sized + Send + Sync + 'static> ServiceBucket<C> {
    fn new() -> Self {
        Self {
            services: SortedList::with_comparator(|a, b| b.priority().cmp(&a.priority())),
        }
    }
}

impl<C: ?Sized + Send + Sync + 'static> Bucket for ServiceBucket<C> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    fn remove_registrar(&mut self, registrar_name: &str) -> Vec<Notice> {
        self.services
            .remove_where(|service| service.registered_by(registrar_name))
            .into_iter()
            .map(|service| {
                Box::new(move |bus: &EventBus| {
                    bus.fire(ServiceUnregisteredEvent::new(service)).to_completion()
                }) as Notice
            })
            .collect()
    }

    fn registrations(&self) -> Vec<Registration> {
        self.services
            .iter()
            .map(|service| Registration {
                capability: std::any::type_name::<C>(),
                registrar: CompactString::new(service.registrar_name()),
                priority: service.priority(),
            })
            .collect()
    }
}

/// Registry of providers keyed by the capability they implement.
///
/// A capability is any `'static` type, usually a trait object such as
/// `dyn EconomyProvider`. Buckets are created on first registration and
/// dropped once empty. Mutations are applied synchronously; the matching
/// [`ServiceRegisteredEvent`] or [`ServiceUnregisteredEvent`] is then fired
/// through the bus and observed asynchronously.
pub struct ServiceRegistry {
    bus: Arc<EventBus>,
    buckets: DashMap<TypeId, Box<dyn Bucket>>,
}

impl ServiceRegistry {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            buckets: DashMap::new(),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Registers `payload` as a provider of capability `C`.
    ///
    /// The service is visible to lookups as soon as this returns; the
    /// returned completion tracks the registration event.
    ///
    /// # Arguments
    ///
    /// * `payload` - The provider implementation
    /// * `registrar_name` - Name of the plugin that owns the service, used by
    ///   [`unregister_all`](Self::unregister_all)
    /// * `priority` - Providers with higher priority are preferred by
    ///   [`service_for`](Self::service_for)
    ///
    /// # Returns
    ///
    /// The pending [`ServiceRegisteredEvent`] fire, or
    /// [`ServiceError::EmptyRegistrar`] if `registrar_name` is blank.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::sync::Arc;
    /// use treasury_event_system::EventBus;
    /// use treasury_services::{ServicePriority, ServiceRegistry};
    ///
    /// trait Economy: Send + Sync {}
    /// struct Vault;
    /// impl Economy for Vault {}
    ///
    /// let registry = ServiceRegistry::new(Arc::new(EventBus::new()));
    /// let vault: Arc<dyn Economy> = Arc::new(Vault);
    /// registry
    ///     .register_service(vault, "VaultPlugin", ServicePriority::High)
    ///     .unwrap();
    ///
    /// let best = registry.service_for::<dyn Economy>().unwrap();
    /// assert_eq!(best.registrar_name(), "VaultPlugin");
    /// registry.bus().shutdown();
    /// ```
    pub fn register_service<C>(
        &self,
        payload: Arc<C>,
        registrar_name: &str,
        priority: ServicePriority,
    ) -> Result<FireCompletion<ServiceRegisteredEvent<C>>, ServiceError>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        let capability = std::any::type_name::<C>();
        if registrar_name.trim().is_empty() {
            return Err(ServiceError::EmptyRegistrar { capability });
        }

        let service = Service::new(registrar_name, priority, payload);
        let position = {
            let mut bucket = self
                .buckets
                .entry(TypeId::of::<C>())
                .or_insert_with(|| Box::new(ServiceBucket::<C>::new()) as Box<dyn Bucket>);
            let bucket = bucket
                .as_any_mut()
                .downcast_mut::<ServiceBucket<C>>()
                .ok_or(ServiceError::CapabilityMismatch(capability))?;
            bucket.services.add(service.clone())
        };

        debug!(
            "📝 {} registered {} at {:?} priority (position {})",
            registrar_name, capability, priority, position
        );
        Ok(self.bus.fire(ServiceRegisteredEvent::new(service)))
    }

    /// Removes the service wrapping exactly `payload` from capability `C`.
    ///
    /// Returns `None` if no such service is registered.
    pub fn unregister<C>(
        &self,
        payload: &Arc<C>,
    ) -> Option<FireCompletion<ServiceUnregisteredEvent<C>>>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        // Removal and pruning share one shard lock, so no reader sees an
        // empty bucket.
        let removed = match self.buckets.entry(TypeId::of::<C>()) {
            Entry::Vacant(_) => return None,
            Entry::Occupied(mut entry) => {
                let removed = entry
                    .get_mut()
                    .as_any_mut()
                    .downcast_mut::<ServiceBucket<C>>()?
                    .services
                    .remove_first(|service| service.same_payload(payload))?;
                if entry.get().is_empty() {
                    entry.remove();
                }
                removed
            }
        };

        debug!(
            "🗑️ {} unregistered {}",
            removed.registrar_name(),
            std::any::type_name::<C>()
        );
        Some(self.bus.fire(ServiceUnregisteredEvent::new(removed)))
    }

    /// Removes every service registered by `registrar_name` (ignoring case)
    /// across all capabilities, firing one removal event per service.
    ///
    /// The returned completion finishes once every removal event has.
    pub fn unregister_all(&self, registrar_name: &str) -> Completion {
        let mut notices = Vec::new();
        self.buckets.retain(|_, bucket| {
            notices.extend(bucket.remove_registrar(registrar_name));
            !bucket.is_empty()
        });

        if !notices.is_empty() {
            info!(
                "🗑️ Unregistered {} service(s) owned by {}",
                notices.len(),
                registrar_name
            );
        }
        let bus: &EventBus = &self.bus;
        Completion::join(notices.into_iter().map(|notice| notice(bus)))
    }

    /// Whether any provider is registered for `C`.
    pub fn has_registration<C: ?Sized + 'static>(&self) -> bool {
        self.buckets.contains_key(&TypeId::of::<C>())
    }

    /// The highest priority provider of `C`. Among equal priorities the
    /// earliest registration wins.
    pub fn service_for<C>(&self) -> Option<Service<C>>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        let bucket = self.buckets.get(&TypeId::of::<C>())?;
        let best = bucket
            .as_any()
            .downcast_ref::<ServiceBucket<C>>()?
            .services
            .first()
            .cloned();
        best
    }

    /// Every provider of `C`, highest priority first.
    pub fn all_services_for<C>(&self) -> Vec<Service<C>>
    where
        C: ?Sized + Send + Sync + 'static,
    {
        self.buckets
            .get(&TypeId::of::<C>())
            .and_then(|bucket| {
                bucket
                    .as_any()
                    .downcast_ref::<ServiceBucket<C>>()
                    .map(|bucket| bucket.services.to_vec())
            })
            .unwrap_or_default()
    }

    /// Number of capabilities with at least one provider.
    pub fn capability_count(&self) -> usize {
        self.buckets.len()
    }

    /// Every registered service, grouped by capability name.
    pub fn registrations(&self) -> Vec<Registration> {
        let mut registrations: Vec<Registration> = self
            .buckets
            .iter()
            .flat_map(|bucket| bucket.registrations())
            .collect();
        // Stable sort keeps each bucket's priority order.
        registrations.sort_by_key(|registration| registration.capability);
        registrations
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("capabilities", &self.capability_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Economy: Send + Sync {
        fn name(&self) -> &str;
    }

    struct Provider(&'static str);

    impl Economy for Provider {
        fn name(&self) -> &str {
            self.0
        }
    }

    fn registry() -> ServiceRegistry {
        ServiceRegistry::new(Arc::new(EventBus::new()))
    }

    fn provider(name: &'static str) -> Arc<dyn Economy> {
        Arc::new(Provider(name))
    }

    #[test]
    fn highest_priority_wins_and_ties_keep_registration_order() {
        let registry = registry();
        registry
            .register_service(provider("normal-1"), "a", ServicePriority::Normal)
            .unwrap();
        registry
            .register_service(provider("low"), "b", ServicePriority::Low)
            .unwrap();
        registry
            .register_service(provider("normal-2"), "c", ServicePriority::Normal)
            .unwrap();
        registry
            .register_service(provider("high"), "d", ServicePriority::High)
            .unwrap();

        let best = registry.service_for::<dyn Economy>().unwrap();
        assert_eq!(best.payload().name(), "high");

        let names: Vec<String> = registry
            .all_services_for::<dyn Economy>()
            .iter()
            .map(|service| service.payload().name().to_string())
            .collect();
        assert_eq!(names, vec!["high", "normal-1", "normal-2", "low"]);
    }

    #[test]
    fn unregister_removes_by_identity_and_prunes() {
        let registry = registry();
        let first = provider("first");
        let twin = provider("first");
        registry
            .register_service(Arc::clone(&first), "a", ServicePriority::Normal)
            .unwrap();

        assert!(registry.unregister(&twin).is_none());
        assert!(registry.has_registration::<dyn Economy>());

        let removed = registry.unregister(&first).unwrap().wait().unwrap();
        assert_eq!(removed.service().registrar_name(), "a");
        assert!(!registry.has_registration::<dyn Economy>());
        assert_eq!(registry.capability_count(), 0);
        assert!(registry.unregister(&first).is_none());
    }

    #[test]
    fn readers_never_observe_empty_buckets() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::thread;

        let registry = registry();
        let done = AtomicBool::new(false);
        thread::scope(|scope| {
            let reader = scope.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    assert!(registry.buckets.iter().all(|bucket| !bucket.is_empty()));
                    thread::yield_now();
                }
            });

            let writers: Vec<_> = (0..3)
                .map(|worker| {
                    let registry = &registry;
                    scope.spawn(move || {
                        let registrar = format!("churn-{worker}");
                        for round in 0..200 {
                            let payload = provider("churn");
                            registry
                                .register_service(
                                    Arc::clone(&payload),
                                    &registrar,
                                    ServicePriority::Normal,
                                )
                                .unwrap();
                            if round % 2 == 0 {
                                assert!(registry.unregister(&payload).is_some());
                            } else {
                                registry.unregister_all(&registrar);
                            }
                        }
                    })
                })
                .collect();
            for writer in writers {
                writer.join().unwrap();
            }
            done.store(true, Ordering::SeqCst);
            reader.join().unwrap();
        });
        assert_eq!(registry.capability_count(), 0);
    }

    #[test]
    fn blank_registrar_is_rejected() {
        let registry = registry();
        let error = registry
            .register_service(provider("x"), "  ", ServicePriority::Normal)
            .unwrap_err();
        assert!(matches!(error, ServiceError::EmptyRegistrar { .. }));
        assert!(!registry.has_registration::<dyn Economy>());
    }

    #[test]
    fn registrations_snapshot() {
        let registry = registry();
        registry
            .register_service(provider("x"), "Bank", ServicePriority::Low)
            .unwrap();
        registry
            .register_service(Arc::new(7_u32), "Stats", ServicePriority::High)
            .unwrap();

        let registrations = registry.registrations();
        assert_eq!(registrations.len(), 2);
        assert!(registrations.contains(&Registration {
            capability: std::any::type_name::<u32>(),
            registrar: CompactString::new("Stats"),
            priority: ServicePriority::High,
        }));
        assert_eq!(registry.capability_count(), 2);
    }
}
