//! Repository traits for the Sluice core
//!
//! This module defines the persistence and scheduling seams used by the
//! queued executor. External crates implement these traits to provide
//! different backends; the reference implementations live in the
//! `sluice-state-inmemory` crate.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::flow_run::{ElementId, FlowElement, FlowRun, FlowRunId, FlowRunStatus};
use crate::{CoreError, DataPacket};

/// Authoritative store for runs, elements, and results
///
/// All operations must be safe under concurrent access by the
/// dispatcher, workers, and external readers. Reads signal "not found"
/// with `Ok(None)` or an empty list; writes against missing ids are
/// no-ops.
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Insert a new run; the id must be unique. Returns the id.
    async fn save_run(&self, run: &FlowRun) -> Result<FlowRunId, CoreError>;

    /// Find a run by id
    async fn find_run(&self, id: &FlowRunId) -> Result<Option<FlowRun>, CoreError>;

    /// List up to `limit` runs for a user, ordered by `created_at` descending
    async fn list_runs_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<FlowRun>, CoreError>;

    /// Atomic status transition
    ///
    /// Transitions out of a terminal status are silently ignored so
    /// completion is idempotent. Reaching any terminal status stamps
    /// `completed_at`.
    async fn update_run_status(
        &self,
        id: &FlowRunId,
        status: FlowRunStatus,
    ) -> Result<(), CoreError>;

    /// Overwrite a run's completion timestamp
    async fn update_run_completion_time(
        &self,
        id: &FlowRunId,
        completed_at: DateTime<Utc>,
    ) -> Result<(), CoreError>;

    /// Set a run's error message
    async fn update_run_error_message(
        &self,
        id: &FlowRunId,
        message: &str,
    ) -> Result<(), CoreError>;

    /// Append an element to its run's sequence
    ///
    /// Insertion order must be preserved for a given run under
    /// concurrent appenders. Returns the element id.
    async fn save_element(&self, element: &FlowElement) -> Result<ElementId, CoreError>;

    /// All elements for a run, ordered by `created_at` ascending
    ///
    /// Returns an empty list when the run has no elements or does not
    /// exist.
    async fn elements_for_run(&self, run_id: &FlowRunId) -> Result<Vec<FlowElement>, CoreError>;

    /// Record the terminal result payload and mirror it onto the run record
    async fn save_result(&self, run_id: &FlowRunId, result: DataPacket) -> Result<(), CoreError>;

    /// Find the terminal result for a run
    async fn find_result(&self, run_id: &FlowRunId) -> Result<Option<DataPacket>, CoreError>;
}

/// Scheduling queue over flow-run ids
///
/// The queue logically holds two disjoint collections: a pending FIFO
/// ordered by enqueue time, and an in-progress set carrying a
/// last-heartbeat timestamp per entry. An id appears in at most one of
/// the two at any moment observable by a caller. Implementations must
/// serialize their own operations; all of them are fast and never wait
/// on workers.
#[async_trait]
pub trait FlowQueue: Send + Sync {
    /// Enqueue at the tail of the pending FIFO
    async fn push_pending(&self, id: &FlowRunId) -> Result<(), CoreError>;

    /// Dequeue the head of pending and move it to in-progress with a
    /// fresh heartbeat
    ///
    /// The pop and the insert must be externally indivisible: no
    /// observer may see the id in both collections or in neither.
    /// Returns `None` without mutating anything when pending is empty.
    async fn pop_pending(&self) -> Result<Option<FlowRunId>, CoreError>;

    /// Insert into in-progress with a fresh heartbeat
    async fn push_in_progress(&self, id: &FlowRunId) -> Result<(), CoreError>;

    /// Remove from in-progress and forget its heartbeat; idempotent
    async fn pop_in_progress(&self, id: &FlowRunId) -> Result<(), CoreError>;

    /// Refresh the heartbeat of an in-progress id; no-op when absent
    async fn reset_heartbeat(&self, id: &FlowRunId) -> Result<(), CoreError>;

    /// Move every in-progress id whose heartbeat is older than the
    /// visibility timeout back to the tail of pending
    ///
    /// Completes within one call. Returns the requeued ids; the order
    /// of requeues among expired ids is unspecified.
    async fn requeue_expired(&self) -> Result<Vec<FlowRunId>, CoreError>;
}
