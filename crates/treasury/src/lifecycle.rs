//! Construction and teardown of the shared Treasury core.
//!
//! The bus and registry are ordinary values owned by a [`Treasury`]. Code
//! that needs "the" running core receives it explicitly or reads it from a
//! [`Lifecycle`] slot owned by the host.

use crate::config::TreasuryConfig;
use crate::error::TreasuryError;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info};
use treasury_event_system::{Event, EventBus, EventBusStats, Hierarchy};
use treasury_services::ServiceRegistry;

/// Fired once a core has been started and installed.
#[derive(Debug, Clone)]
pub struct CoreStartedEvent {
    pub version: &'static str,
    pub executor_thread_prefix: String,
}

impl Event for CoreStartedEvent {}
impl Hierarchy for CoreStartedEvent {}

/// The event bus and service registry shared by every plugin.
pub struct Treasury {
    bus: Arc<EventBus>,
    services: Arc<ServiceRegistry>,
}

impl Treasury {
    /// Validates `config` and builds a fresh bus and registry.
    ///
    /// # Returns
    ///
    /// The running core, or [`TreasuryError::InvalidConfig`] describing the
    /// first invalid setting.
    pub fn start(config: &TreasuryConfig) -> Result<Self, TreasuryError> {
        config.validate().map_err(TreasuryError::InvalidConfig)?;

        let bus = Arc::new(EventBus::with_config(config.to_bus_config()));
        let services = Arc::new(ServiceRegistry::new(Arc::clone(&bus)));
        info!(
            "🚀 Treasury core started (executor prefix: {})",
            config.events.executor_thread_prefix
        );
        Ok(Self { bus, services })
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn services(&self) -> &Arc<ServiceRegistry> {
        &self.services
    }

    pub fn stats(&self) -> EventBusStats {
        self.bus.stats()
    }

    pub fn is_running(&self) -> bool {
        !self.bus.is_shut_down()
    }

    /// Drains and stops every event executor. Safe to call repeatedly.
    pub fn shutdown(&self) {
        if !self.is_running() {
            return;
        }
        let stats = self.bus.stats();
        info!(
            "📊 Final statistics: {} events fired, {} failed, {} subscribers, {} capabilities",
            stats.events_fired,
            stats.fires_failed,
            stats.total_subscribers,
            self.services.capability_count()
        );
        self.bus.shutdown();
        info!("🏁 Treasury core stopped");
    }
}

/// Holds at most one running [`Treasury`].
#[derive(Default)]
pub struct Lifecycle {
    slot: Mutex<Option<Arc<Treasury>>>,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Installs `treasury` as the running core.
    ///
    /// Fails with [`TreasuryError::AlreadyRunning`] if a core is installed.
    pub fn install(&self, treasury: Treasury) -> Result<Arc<Treasury>, TreasuryError> {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(TreasuryError::AlreadyRunning);
        }
        let treasury = Arc::new(treasury);
        *slot = Some(Arc::clone(&treasury));
        debug!("Treasury core installed");
        Ok(treasury)
    }

    pub fn current(&self) -> Option<Arc<Treasury>> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Removes the installed core and shuts it down.
    ///
    /// Returns `false` if nothing was installed.
    pub fn shutdown(&self) -> bool {
        let taken = self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match taken {
            Some(treasury) => {
                treasury.shutdown();
                true
            }
            None => false,
        }
    }
}
