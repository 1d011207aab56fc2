//! Shutdown coordination for the event bus.
//!
//! The bus moves through two phases: once shutdown is initiated no new fires
//! are accepted, and once it is complete every executor has been drained.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Shared shutdown flags for the bus and anything hosting it.
#[derive(Debug, Clone)]
pub struct ShutdownState {
    /// No new fires are accepted once set
    shutdown_initiated: Arc<AtomicBool>,
    /// Every executor has been closed and joined
    shutdown_complete: Arc<AtomicBool>,
}

impl ShutdownState {
    pub fn new() -> Self {
        Self {
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
            shutdown_complete: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_shutdown_initiated(&self) -> bool {
        self.shutdown_initiated.load(Ordering::Acquire)
    }

    pub fn is_shutdown_complete(&self) -> bool {
        self.shutdown_complete.load(Ordering::Acquire)
    }

    /// Initiates shutdown. Returns `false` if it was already initiated.
    pub fn initiate_shutdown(&self) -> bool {
        let first = !self.shutdown_initiated.swap(true, Ordering::AcqRel);
        if first {
            info!("🛑 Event bus shutdown initiated - no new events will be fired");
        }
        first
    }

    pub fn complete_shutdown(&self) {
        self.shutdown_complete.store(true, Ordering::Release);
        info!("✅ Event bus executors drained");
    }
}

impl Default for ShutdownState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initiates_once() {
        let state = ShutdownState::new();
        assert!(!state.is_shutdown_initiated());
        assert!(state.initiate_shutdown());
        assert!(!state.initiate_shutdown());
        assert!(state.is_shutdown_initiated());
        assert!(!state.is_shutdown_complete());
        state.complete_shutdown();
        assert!(state.clone().is_shutdown_complete());
    }
}
