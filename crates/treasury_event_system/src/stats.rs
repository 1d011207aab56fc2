//! Statistics tracking for the event bus.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of event bus activity.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBusStats {
    /// Events accepted by `fire` since the bus was created
    pub events_fired: u64,
    /// Fires that completed with at least one error
    pub fires_failed: u64,
    /// Subscribers across every event type
    pub total_subscribers: usize,
    /// Live per-type executors
    pub executors: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub(crate) events_fired: AtomicU64,
    pub(crate) fires_failed: AtomicU64,
}

impl Counters {
    pub(crate) fn record_fire(&self) {
        self.events_fired.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.fires_failed.fetch_add(1, Ordering::Relaxed);
    }
}
