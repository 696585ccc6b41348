use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::DataPacket;

/// Flow run status
///
/// A run progresses monotonically `Pending -> Running -> {Completed |
/// Failed | Canceled}`. The string identifiers are stable and safe for
/// cross-process callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowRunStatus {
    /// Submitted and awaiting dispatch
    Pending,

    /// A worker is driving the flow
    Running,

    /// The element stream ended normally
    Completed,

    /// The flow raised an error
    Failed,

    /// The run was canceled while executing
    Canceled,
}

impl FlowRunStatus {
    /// Whether this status is terminal
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FlowRunStatus::Completed | FlowRunStatus::Failed | FlowRunStatus::Canceled
        )
    }

    /// Stable string identifier for this status
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowRunStatus::Pending => "pending",
            FlowRunStatus::Running => "running",
            FlowRunStatus::Completed => "completed",
            FlowRunStatus::Failed => "failed",
            FlowRunStatus::Canceled => "canceled",
        }
    }
}

impl fmt::Display for FlowRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value object: Flow run ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FlowRunId(pub String);

impl FlowRunId {
    /// Generate a fresh globally-unique run id
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for FlowRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FlowRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Value object: Flow element ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementId(pub String);

impl ElementId {
    /// Generate a fresh element id
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ElementId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Aggregate: one submission of a flow
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowRun {
    /// Unique identifier, assigned at submission
    pub id: FlowRunId,

    /// Name of the registered flow this run executes
    pub flow_name: String,

    /// Submitting user, kept for later filtering
    pub user_id: String,

    /// Current status
    pub status: FlowRunStatus,

    /// Submission timestamp
    pub created_at: DateTime<Utc>,

    /// Set when the run reaches a terminal status
    pub completed_at: Option<DateTime<Utc>>,

    /// Input payload, immutable once set
    pub input: DataPacket,

    /// Terminal result, present only when the flow set one
    pub result: Option<DataPacket>,

    /// Set only when the run failed
    pub error_message: Option<String>,
}

impl FlowRun {
    /// Create a new run in Pending status with a fresh id
    pub fn new(flow_name: &str, user_id: &str, input: DataPacket) -> Self {
        Self {
            id: FlowRunId::new(),
            flow_name: flow_name.to_string(),
            user_id: user_id.to_string(),
            status: FlowRunStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            input,
            result: None,
            error_message: None,
        }
    }

    /// Apply a status transition
    ///
    /// Transitions out of a terminal status are silently ignored so
    /// completion is idempotent. Returns whether the transition was
    /// applied. Reaching any terminal status stamps `completed_at`.
    pub fn advance_status(&mut self, status: FlowRunStatus) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        self.status = status;
        if status.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        true
    }

    /// Whether the run has reached a terminal status
    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// One intermediate value emitted by a flow during its execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowElement {
    /// Unique identifier
    pub id: ElementId,

    /// Owning run
    pub flow_run_id: FlowRunId,

    /// Emission timestamp
    pub created_at: DateTime<Utc>,

    /// Element payload
    pub content: DataPacket,
}

impl FlowElement {
    /// Create a new element for the given run
    pub fn new(flow_run_id: FlowRunId, content: DataPacket) -> Self {
        Self {
            id: ElementId::new(),
            flow_run_id,
            created_at: Utc::now(),
            content,
        }
    }
}
