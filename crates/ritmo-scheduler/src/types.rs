use chrono::{DateTime, Utc};
use ritmo_core::{RitmoError, RitmoResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

/// Observable status of a registered worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    /// Available for dispatch.
    Idle,
    /// Currently executing an invocation.
    Running,
    /// Last invocation ended in an error.
    Error,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerStatus::Idle => write!(f, "idle"),
            WorkerStatus::Running => write!(f, "running"),
            WorkerStatus::Error => write!(f, "error"),
        }
    }
}

/// Lowest allowed worker priority weight.
pub const MIN_WORKER_PRIORITY: u8 = 1;
/// Highest allowed worker priority weight.
pub const MAX_WORKER_PRIORITY: u8 = 5;

/// A named, capability-tagged unit of execution the scheduler dispatches to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    /// Unique worker name.
    pub name: String,
    /// Free-form capability/domain tag, e.g. `research` or `outreach`.
    pub capability: String,
    /// Current observable status.
    pub status: WorkerStatus,
    /// Selection weight, clamped to 1..=5.
    pub priority: u8,
    /// Last observed result text, if any invocation has completed.
    pub last_result: Option<String>,
}

impl Worker {
    /// Create an idle worker with the default mid-range priority.
    pub fn new(name: impl Into<String>, capability: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capability: capability.into(),
            status: WorkerStatus::Idle,
            priority: 3,
            last_result: None,
        }
    }
}

/// Priority class of a submitted task.
///
/// Dispatch rank is `Emergency > High > Low > Medium`: `low` deliberately
/// ranks ahead of `medium` to keep the historical dispatch order (see
/// DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    /// Preempts every other class.
    Emergency,
    /// Above medium and low.
    High,
    /// Routine work.
    Medium,
    /// Background work (dispatches ahead of medium; see type docs).
    Low,
}

impl TaskPriority {
    /// Dispatch rank; higher dispatches first.
    pub fn rank(self) -> u8 {
        match self {
            TaskPriority::Emergency => 3,
            TaskPriority::High => 2,
            TaskPriority::Low => 1,
            TaskPriority::Medium => 0,
        }
    }
}

impl std::fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskPriority::Emergency => write!(f, "emergency"),
            TaskPriority::High => write!(f, "high"),
            TaskPriority::Medium => write!(f, "medium"),
            TaskPriority::Low => write!(f, "low"),
        }
    }
}

impl FromStr for TaskPriority {
    type Err = RitmoError;

    fn from_str(s: &str) -> RitmoResult<Self> {
        match s {
            "emergency" => Ok(TaskPriority::Emergency),
            "high" => Ok(TaskPriority::High),
            "medium" => Ok(TaskPriority::Medium),
            "low" => Ok(TaskPriority::Low),
            other => Err(RitmoError::InvalidPriority(other.to_string())),
        }
    }
}

/// Status of a task in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for assignment.
    Pending,
    /// Handed to a worker, not yet started.
    Assigned,
    /// Being executed.
    InProgress,
    /// Terminal success.
    Completed,
    /// Terminal failure after the retry budget is spent.
    Failed {
        /// Why the final attempt failed.
        reason: String,
    },
}

/// Opaque task payload.
///
/// The scheduler routes payloads without interpreting them; known kinds
/// exist only so callers get a typed surface, and everything else travels
/// as [`TaskPayload::Opaque`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum TaskPayload {
    /// A plain-text instruction for the assigned worker.
    Directive(String),
    /// Context carried from one worker to another during a hand-off.
    Handoff {
        /// Name of the worker that produced the context.
        from: String,
        /// The prior worker's output.
        context: String,
    },
    /// Anything else; carried verbatim.
    Opaque(serde_json::Value),
}

impl Default for TaskPayload {
    fn default() -> Self {
        TaskPayload::Opaque(serde_json::Value::Null)
    }
}

/// A unit of queued work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Generated id.
    pub id: Uuid,
    /// Free-form task kind, e.g. `lead_generation`.
    pub kind: String,
    /// Priority class.
    pub priority: TaskPriority,
    /// Required worker capability; `None` means any idle worker may take it.
    pub capability: Option<String>,
    /// Name of the worker the task is assigned to, once assigned.
    pub assigned_to: Option<String>,
    /// Current status.
    pub status: TaskStatus,
    /// Opaque payload.
    pub payload: TaskPayload,
    /// Number of failed attempts so far.
    pub retry_count: u32,
    /// Retry budget before the task goes terminal.
    pub max_retries: u32,
    /// When the task was admitted.
    pub created_at: DateTime<Utc>,
    /// When the task reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a pending task with the default retry budget of 3.
    pub fn new(kind: impl Into<String>, priority: TaskPriority) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            priority,
            capability: None,
            assigned_to: None,
            status: TaskStatus::Pending,
            payload: TaskPayload::default(),
            retry_count: 0,
            max_retries: 3,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Require a worker capability for assignment.
    pub fn with_capability(mut self, tag: impl Into<String>) -> Self {
        self.capability = Some(tag.into());
        self
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: TaskPayload) -> Self {
        self.payload = payload;
        self
    }

    /// Override the retry budget.
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.max_retries = max;
        self
    }

    /// True when the task is in a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Completed | TaskStatus::Failed { .. }
        )
    }
}

/// Untyped admission form for a task, as it arrives from outside callers.
///
/// The priority class travels as a string and is validated at
/// [`crate::TaskQueue::submit`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Free-form task kind.
    pub kind: String,
    /// Priority class name; must be one of `low`, `medium`, `high`,
    /// `emergency`.
    pub priority: String,
    /// Required worker capability, if any.
    #[serde(default)]
    pub capability: Option<String>,
    /// Opaque payload.
    #[serde(default)]
    pub payload: TaskPayload,
    /// Retry budget override.
    #[serde(default)]
    pub max_retries: Option<u32>,
}

impl TaskSpec {
    /// Create a spec with the given kind and priority class name.
    pub fn new(kind: impl Into<String>, priority: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            priority: priority.into(),
            capability: None,
            payload: TaskPayload::default(),
            max_retries: None,
        }
    }

    /// Require a worker capability for assignment.
    pub fn with_capability(mut self, tag: impl Into<String>) -> Self {
        self.capability = Some(tag.into());
        self
    }

    /// Attach a payload.
    pub fn with_payload(mut self, payload: TaskPayload) -> Self {
        self.payload = payload;
        self
    }
}

/// Kind of a bus message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Ask a worker to perform work; the bus invokes the target's handler.
    TaskRequest,
    /// A synthesized reply to a `TaskRequest`.
    TaskResponse,
    /// Broadcast notification that a worker failed.
    ErrorAlert,
    /// Progress narration.
    StatusUpdate,
    /// Multi-party coordination context.
    Collaboration,
}

/// Addressing for a bus message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    /// A single named worker.
    Worker(String),
    /// Every worker the sender chose to fan out to.
    Broadcast,
}

/// A point-to-point or broadcast message routed by the bus.
///
/// Messages are ephemeral: routed synchronously, retained only in the bus's
/// bounded history ring, never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Generated id.
    pub id: Uuid,
    /// Name of the sending party.
    pub sender: String,
    /// Target worker or broadcast marker.
    pub recipient: Recipient,
    /// Message kind.
    pub kind: MessageKind,
    /// Opaque payload.
    pub payload: serde_json::Value,
    /// Priority class, used only for history inspection.
    pub priority: TaskPriority,
    /// UTC creation timestamp.
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a message addressed to a single worker.
    pub fn to_worker(
        sender: impl Into<String>,
        recipient: impl Into<String>,
        kind: MessageKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: sender.into(),
            recipient: Recipient::Worker(recipient.into()),
            kind,
            payload,
            priority: TaskPriority::Medium,
            timestamp: Utc::now(),
        }
    }

    /// Override the priority class.
    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }
}
