//! In-memory state implementation for the Sluice flow execution engine
//!
//! This crate provides in-memory implementations of the store and queue
//! interfaces defined in the sluice-core crate. It is the reference
//! backend, useful for development, testing, and deployments where
//! persistence across restarts is not required.

use std::sync::Arc;
use std::time::Duration;

pub mod queue;
pub mod store;

pub use queue::{InMemoryFlowQueue, DEFAULT_VISIBILITY_TIMEOUT};
pub use store::InMemoryFlowStore;

use sluice_core::{FlowQueue, FlowStore};

/// Provider for a wired in-memory store and queue pair
pub struct InMemoryStateProvider {
    visibility_timeout: Duration,
}

impl InMemoryStateProvider {
    /// Create a provider with the given queue visibility timeout
    pub fn new(visibility_timeout: Duration) -> Self {
        Self { visibility_timeout }
    }

    /// Create a fresh store and queue for use with the queued executor
    pub fn create_state(&self) -> (Arc<dyn FlowStore>, Arc<dyn FlowQueue>) {
        (
            Arc::new(InMemoryFlowStore::new()),
            Arc::new(InMemoryFlowQueue::new(self.visibility_timeout)),
        )
    }
}

impl Default for InMemoryStateProvider {
    fn default() -> Self {
        Self::new(DEFAULT_VISIBILITY_TIMEOUT)
    }
}
