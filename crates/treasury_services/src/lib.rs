//! # Treasury Services
//!
//! A registry of economy providers keyed by the capability they implement.
//! Several plugins may provide the same capability; consumers ask for the
//! highest priority one with [`ServiceRegistry::service_for`] or for all of
//! them with [`ServiceRegistry::all_services_for`].
//!
//! Every change to the registry is announced through the shared
//! [`EventBus`](treasury_event_system::EventBus) as a
//! [`ServiceRegisteredEvent`] or [`ServiceUnregisteredEvent`].
//!
//! ```rust
//! use std::sync::Arc;
//! use treasury_event_system::EventBus;
//! use treasury_services::{ServicePriority, ServiceRegistry};
//!
//! trait EconomyProvider: Send + Sync {
//!     fn currency(&self) -> &str;
//! }
//!
//! struct Coins;
//! impl EconomyProvider for Coins {
//!     fn currency(&self) -> &str { "coins" }
//! }
//!
//! let registry = ServiceRegistry::new(Arc::new(EventBus::new()));
//! let provider: Arc<dyn EconomyProvider> = Arc::new(Coins);
//! registry.register_service(provider, "CoinsPlugin", ServicePriority::High)?;
//!
//! let service = registry.service_for::<dyn EconomyProvider>().unwrap();
//! assert_eq!(service.payload().currency(), "coins");
//! registry.bus().shutdown();
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod events;
pub mod registry;
pub mod service;

pub use error::ServiceError;
pub use events::{ServiceEvent, ServiceRegisteredEvent, ServiceUnregisteredEvent};
pub use registry::{Registration, ServiceRegistry};
pub use service::{Service, ServicePriority};
