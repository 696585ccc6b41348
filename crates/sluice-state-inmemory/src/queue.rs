use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use sluice_core::{CoreError, FlowQueue, FlowRunId};

/// Default visibility timeout
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

/// Pending FIFO and in-progress set, guarded by one lock
struct QueueState {
    pending: VecDeque<FlowRunId>,
    in_progress: HashMap<FlowRunId, Instant>,
}

/// In-memory implementation of the flow queue
///
/// Both collections live behind a single mutex, so every operation is
/// serialized and `pop_pending`'s dequeue-plus-insert is indivisible to
/// all observers. Heartbeats are monotonic `Instant`s, immune to wall
/// clock adjustments.
pub struct InMemoryFlowQueue {
    visibility_timeout: Duration,
    state: Mutex<QueueState>,
}

impl InMemoryFlowQueue {
    /// Create an empty queue with the given visibility timeout
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            visibility_timeout,
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                in_progress: HashMap::new(),
            }),
        }
    }
}

impl Default for InMemoryFlowQueue {
    fn default() -> Self {
        Self::new(DEFAULT_VISIBILITY_TIMEOUT)
    }
}

#[async_trait]
impl FlowQueue for InMemoryFlowQueue {
    async fn push_pending(&self, id: &FlowRunId) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;
        state.pending.push_back(id.clone());
        Ok(())
    }

    async fn pop_pending(&self) -> Result<Option<FlowRunId>, CoreError> {
        let mut state = self.state.lock().await;

        match state.pending.pop_front() {
            Some(id) => {
                state.in_progress.insert(id.clone(), Instant::now());
                Ok(Some(id))
            }
            None => Ok(None),
        }
    }

    async fn push_in_progress(&self, id: &FlowRunId) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;
        state.in_progress.insert(id.clone(), Instant::now());
        Ok(())
    }

    async fn pop_in_progress(&self, id: &FlowRunId) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;
        state.in_progress.remove(id);
        Ok(())
    }

    async fn reset_heartbeat(&self, id: &FlowRunId) -> Result<(), CoreError> {
        let mut state = self.state.lock().await;

        if let Some(heartbeat) = state.in_progress.get_mut(id) {
            *heartbeat = Instant::now();
        }

        Ok(())
    }

    async fn requeue_expired(&self) -> Result<Vec<FlowRunId>, CoreError> {
        let mut state = self.state.lock().await;
        let now = Instant::now();

        let expired: Vec<FlowRunId> = state
            .in_progress
            .iter()
            .filter(|(_, heartbeat)| now.duration_since(**heartbeat) > self.visibility_timeout)
            .map(|(id, _)| id.clone())
            .collect();

        for id in &expired {
            state.in_progress.remove(id);
            state.pending.push_back(id.clone());
            debug!("Requeued expired flow run {}", id);
        }

        Ok(expired)
    }
}
