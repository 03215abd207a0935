//! Task identifiers, states and stored results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a task
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new random task ID
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for TaskId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for TaskId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Current state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    /// Waiting to be processed
    Pending,
    /// Received by a worker
    Received,
    /// Currently executing
    Running,
    /// Completed successfully
    Success,
    /// Failed with an error
    Failure,
    /// Scheduled for retry
    Retry,
    /// Revoked/cancelled
    Revoked,
}

impl TaskState {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Success | TaskState::Failure | TaskState::Revoked)
    }

    fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Received => "received",
            TaskState::Running => "running",
            TaskState::Success => "success",
            TaskState::Failure => "failure",
            TaskState::Retry => "retry",
            TaskState::Revoked => "revoked",
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TaskState {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s {
            "pending" => Ok(TaskState::Pending),
            "received" => Ok(TaskState::Received),
            "running" => Ok(TaskState::Running),
            "success" => Ok(TaskState::Success),
            "failure" => Ok(TaskState::Failure),
            "retry" => Ok(TaskState::Retry),
            "revoked" => Ok(TaskState::Revoked),
            other => Err(crate::Error::InvalidState(other.to_string())),
        }
    }
}

/// Bookkeeping stored under the meta key, written by whoever runs the task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskMeta {
    pub state: TaskState,
    pub retries: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Reported by the runner; opaque to the backend
    pub worker_id: Option<String>,
    pub error: Option<String>,
    pub traceback: Option<String>,
}

impl Default for TaskMeta {
    fn default() -> Self {
        Self {
            state: TaskState::Pending,
            retries: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            worker_id: None,
            error: None,
            traceback: None,
        }
    }
}

impl TaskMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `worker_id` picked the task up
    pub fn mark_started(&mut self, worker_id: impl Into<String>) {
        self.state = TaskState::Running;
        self.started_at = Some(Utc::now());
        self.worker_id = Some(worker_id.into());
    }
}

/// Outcome stored under the result key.
///
/// `result` holds the returned value for successes; `error` and `traceback`
/// describe failures and revocations. The value is kept as JSON so either
/// [`Serializer`](crate::Serializer) can carry it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub state: TaskState,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub traceback: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl TaskResult {
    pub fn success<T: Serialize>(task_id: TaskId, result: T) -> crate::Result<Self> {
        Ok(Self {
            task_id,
            state: TaskState::Success,
            result: Some(serde_json::to_value(result)?),
            error: None,
            traceback: None,
            created_at: Utc::now(),
        })
    }

    pub fn failure(task_id: TaskId, error: impl Into<String>, traceback: Option<String>) -> Self {
        Self {
            task_id,
            state: TaskState::Failure,
            result: None,
            error: Some(error.into()),
            traceback,
            created_at: Utc::now(),
        }
    }

    /// Result recorded for a task that was cancelled before finishing
    pub fn revoked(task_id: TaskId) -> Self {
        Self {
            task_id,
            state: TaskState::Revoked,
            result: None,
            error: Some("Task was revoked".to_string()),
            traceback: None,
            created_at: Utc::now(),
        }
    }

    /// Decode the stored value; failures surface their error message
    pub fn get<T: for<'de> Deserialize<'de>>(&self) -> crate::Result<T> {
        match &self.result {
            Some(value) => Ok(serde_json::from_value(value.clone())?),
            None => Err(crate::Error::TaskExecutionFailed(
                self.error.clone().unwrap_or_else(|| "No result".to_string()),
            )),
        }
    }
}
