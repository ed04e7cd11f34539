//! # Execution tasks, records, and results.
//!
//! [`ExecutionTask`] is what a caller submits: a name resolved through the
//! handler registry, an opaque JSON input, and optional knobs (priority,
//! per-task config, idempotency key, metadata).
//!
//! [`ExecutionRecord`] owns one task for the record's lifetime and tracks its
//! trip through the state machine:
//!
//! ```text
//! pending ──► running ──► completed
//!    │            │
//!    │            ├──► pending (retry scheduled, retries += 1)
//!    │            └──► failed  (retries exhausted / no handler)
//!    ├──► rate_limited  (submit-time gate; terminal)
//!    └──► cancelled     (also from rate_limited)
//! ```
//!
//! ## Rules
//! - Exactly one record exists per task id for the record's lifetime.
//! - `retries` is monotonically non-decreasing until a terminal status.
//! - Records are never physically deleted by the orchestrator core.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::TaskConfig;
use crate::error::ExecError;

/// Status of an execution record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to run (freshly submitted, or a retry is scheduled).
    Pending,
    /// A handler attempt is in flight.
    Running,
    /// Terminal: the handler returned output.
    Completed,
    /// Terminal: retries exhausted or the task is unservable.
    Failed,
    /// Terminal: cancelled by the caller before running.
    Cancelled,
    /// Terminal: denied by the rate limiter at submit time.
    RateLimited,
}

impl TaskStatus {
    /// Returns true for statuses from which no automatic transition occurs.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed
                | TaskStatus::Failed
                | TaskStatus::Cancelled
                | TaskStatus::RateLimited
        )
    }

    /// Short stable label (snake_case) for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::RateLimited => "rate_limited",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named unit of work submitted to the orchestrator.
///
/// ## Example
/// ```
/// use serde_json::json;
/// use taskdock::ExecutionTask;
///
/// let task = ExecutionTask::new("t1", "send-email", json!({"to": "a@b.c"}))
///     .with_priority(10)
///     .with_idempotency_key("welcome-a@b.c");
///
/// assert_eq!(task.name, "send-email");
/// assert_eq!(task.priority, 10);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionTask {
    /// Caller-supplied unique id. Immutable for the record's lifetime.
    pub id: String,
    /// Handler name, resolved through the registry at execution time.
    pub name: String,
    /// Opaque payload passed to the handler.
    #[serde(default)]
    pub input: Value,
    /// Optional per-task configuration override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<TaskConfig>,
    /// Scheduling priority; higher sorts first in listings.
    #[serde(default)]
    pub priority: i32,
    /// Optional token coalescing repeated submissions into one task id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    /// Free-form caller metadata, untouched by the orchestrator.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl ExecutionTask {
    /// Creates a task with the given id, handler name, and input payload.
    pub fn new(id: impl Into<String>, name: impl Into<String>, input: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            input,
            config: None,
            priority: 0,
            idempotency_key: None,
            metadata: BTreeMap::new(),
        }
    }

    /// Returns the task with a per-task configuration override.
    pub fn with_config(mut self, config: TaskConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Returns the task with the given priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Returns the task with an idempotency key.
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Returns the task with a metadata entry added.
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// Persisted lifecycle of one task.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// The submitted task.
    pub task: ExecutionTask,
    /// Current state.
    pub status: TaskStatus,
    /// Outcome of the most recent attempt, if one has finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ExecutionResult>,
    /// Failed attempts returned to `pending` so far.
    pub retries: u32,
    /// When the record was created.
    pub created_at: DateTime<Utc>,
    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
    /// Next scheduled retry time, if a retry is pending.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl ExecutionRecord {
    /// Creates a fresh record in the given status.
    pub(crate) fn new(task: ExecutionTask, status: TaskStatus, now: DateTime<Utc>) -> Self {
        Self {
            task,
            status,
            result: None,
            retries: 0,
            created_at: now,
            updated_at: now,
            scheduled_at: None,
        }
    }

    /// The task id this record owns.
    pub fn id(&self) -> &str {
        &self.task.id
    }
}

/// Outcome of a single execution attempt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionResult {
    /// Id of the task this attempt belongs to.
    pub task_id: String,
    /// Record status after this attempt was interpreted.
    pub status: TaskStatus,
    /// Handler output on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    /// Failure message, if the attempt did not succeed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Optional failure detail supplied by the handler.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Value of `retries` when this attempt ran.
    pub retries: u32,
    /// When the attempt started.
    pub started_at: DateTime<Utc>,
    /// When the attempt finished.
    pub completed_at: DateTime<Utc>,
    /// Wall-clock duration of the attempt in milliseconds.
    pub duration_ms: u64,
    /// True when the submission was denied by the rate limiter.
    pub was_rate_limited: bool,
    /// When the next retry is due, if one was scheduled.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl ExecutionResult {
    fn base(
        task_id: &str,
        status: TaskStatus,
        retries: u32,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: task_id.to_string(),
            status,
            output: None,
            error: None,
            stack: None,
            retries,
            started_at,
            completed_at,
            duration_ms: (completed_at - started_at).num_milliseconds().max(0) as u64,
            was_rate_limited: false,
            next_retry_at: None,
        }
    }

    /// Result of a successful attempt.
    pub(crate) fn success(
        task_id: &str,
        output: Value,
        retries: u32,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        let mut res = Self::base(task_id, TaskStatus::Completed, retries, started_at, completed_at);
        res.output = Some(output);
        res
    }

    /// Result of a failed attempt; `status` distinguishes a scheduled retry
    /// (`pending`) from a terminal failure.
    pub(crate) fn failure(
        task_id: &str,
        status: TaskStatus,
        err: &ExecError,
        retries: u32,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        next_retry_at: Option<DateTime<Utc>>,
    ) -> Self {
        let mut res = Self::base(task_id, status, retries, started_at, completed_at);
        res.error = Some(err.as_message());
        res.stack = err.stack().map(str::to_string);
        res.next_retry_at = next_retry_at;
        res
    }

    /// Result of a submission denied by the rate limiter.
    pub(crate) fn rate_limited(task_id: &str, err: &ExecError, now: DateTime<Utc>) -> Self {
        let mut res = Self::base(task_id, TaskStatus::RateLimited, 0, now, now);
        res.error = Some(err.as_message());
        res.was_rate_limited = true;
        res
    }
}

/// Filters for [`Orchestrator::list_records`](crate::Orchestrator::list_records).
///
/// Records matching every set field are returned, sorted by priority
/// descending, then `created_at` descending.
#[derive(Clone, Debug, Default)]
pub struct ListFilter {
    /// Only records in this status.
    pub status: Option<TaskStatus>,
    /// Only records whose task has this handler name.
    pub name: Option<String>,
    /// Maximum number of records to return.
    pub limit: Option<usize>,
}

impl ListFilter {
    /// An unrestricted filter.
    pub fn all() -> Self {
        Self::default()
    }

    /// Restricts to records in `status`.
    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Restricts to records whose task name equals `name`.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Caps the number of returned records.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `record` passes the status/name filters.
    pub(crate) fn matches(&self, record: &ExecutionRecord) -> bool {
        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }
        if let Some(name) = &self.name {
            if record.task.name != *name {
                return false;
            }
        }
        true
    }
}
