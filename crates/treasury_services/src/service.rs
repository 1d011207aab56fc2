//! Registered service handles.

use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Ordering of providers registered for the same capability.
///
/// The highest priority provider is the one handed out by
/// [`ServiceRegistry::service_for`](crate::ServiceRegistry::service_for).
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ServicePriority {
    Low,
    #[default]
    Normal,
    High,
}

/// A provider registered for capability `C` by a named plugin.
pub struct Service<C: ?Sized> {
    registrar_name: CompactString,
    priority: ServicePriority,
    payload: Arc<C>,
}

impl<C: ?Sized> Service<C> {
    pub fn new(registrar_name: &str, priority: ServicePriority, payload: Arc<C>) -> Self {
        Self {
            registrar_name: CompactString::new(registrar_name),
            priority,
            payload,
        }
    }

    /// Name of the plugin that registered this service.
    pub fn registrar_name(&self) -> &str {
        &self.registrar_name
    }

    pub fn priority(&self) -> ServicePriority {
        self.priority
    }

    pub fn payload(&self) -> &Arc<C> {
        &self.payload
    }

    /// Case-insensitive registrar match.
    pub fn registered_by(&self, registrar_name: &str) -> bool {
        self.registrar_name
            .chars()
            .flat_map(char::to_lowercase)
            .eq(registrar_name.chars().flat_map(char::to_lowercase))
    }

    /// Whether this service wraps exactly `payload` (pointer identity).
    pub fn same_payload(&self, payload: &Arc<C>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.payload), Arc::as_ptr(payload))
    }
}

impl<C: ?Sized> Clone for Service<C> {
    fn clone(&self) -> Self {
        Self {
            registrar_name: self.registrar_name.clone(),
            priority: self.priority,
            payload: Arc::clone(&self.payload),
        }
    }
}

impl<C: ?Sized> fmt::Debug for Service<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("capability", &std::any::type_name::<C>())
            .field("registrar", &self.registrar_name)
            .field("priority", &self.priority)
            .finish()
    }
}
