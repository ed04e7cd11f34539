//! Error types used by the orchestrator and by task execution attempts.
//!
//! This module defines two main error enums:
//!
//! - [`OrchestratorError`] — errors raised by the orchestration layer itself
//!   (storage, codec, unknown records, invalid transitions).
//! - [`ExecError`] — failures of individual execution attempts, the taxonomy
//!   that drives retry decisions.
//!
//! Both types provide helper methods (`as_label`, `as_message`) for
//! logging/metrics, and [`ExecError::is_retryable`] classifies which attempt
//! failures are eligible for backoff-and-retry.

use std::time::Duration;
use thiserror::Error;

use crate::store::StoreError;
use crate::tasks::TaskStatus;

/// # Errors returned to callers of the orchestrator API.
///
/// These represent failures of the orchestration layer, never of the task
/// handlers themselves: handler outcomes are captured into
/// [`ExecutionResult`](crate::ExecutionResult) and persisted on the record.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// The task store rejected or failed an operation.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A persisted record or state value could not be encoded/decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// No record exists for the given task id.
    #[error("no record for task {id:?}")]
    RecordNotFound {
        /// The task id that was looked up.
        id: String,
    },

    /// The requested transition is not valid from the record's current status.
    #[error("task {id:?} cannot transition from {from}")]
    InvalidTransition {
        /// The task id.
        id: String,
        /// The status the record was in.
        from: TaskStatus,
    },
}

impl OrchestratorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            OrchestratorError::Store(_) => "store_error",
            OrchestratorError::Codec(_) => "codec_error",
            OrchestratorError::RecordNotFound { .. } => "record_not_found",
            OrchestratorError::InvalidTransition { .. } => "invalid_transition",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }
}

/// # Failures of a single execution attempt.
///
/// An attempt either times out, fails inside the handler, is denied by the
/// rate limiter, or names a task no handler is registered for. Only the first
/// two are retryable; the rest are terminal the moment they occur.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use taskdock::ExecError;
///
/// let err = ExecError::Timeout { timeout: Duration::from_millis(50) };
/// assert!(err.is_retryable());
/// assert!(err.to_string().contains("timeout"));
/// ```
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ExecError {
    /// The handler did not finish within the configured bound.
    ///
    /// Retried exactly like a handler failure. The message deliberately
    /// contains the substring `timeout` so callers can tell it apart from
    /// ordinary handler errors.
    #[error("timeout after {timeout:?}")]
    Timeout {
        /// The timeout duration that was exceeded.
        timeout: Duration,
    },

    /// The handler returned an error (or panicked).
    #[error("execution failed: {error}")]
    Handler {
        /// The underlying error message.
        error: String,
        /// Optional stack/detail supplied by the handler.
        stack: Option<String>,
    },

    /// The submission was denied by the fixed-window rate limiter.
    ///
    /// Terminal: a rate-limited task is never auto-retried and requires an
    /// explicit caller-initiated `retry()` or resubmission.
    #[error("rate limit exceeded: {max_executions} executions per {window_ms}ms")]
    RateLimited {
        /// Window capacity that was exhausted.
        max_executions: u32,
        /// Window length in milliseconds.
        window_ms: u64,
    },

    /// No handler is registered under the task's name.
    ///
    /// A configuration error: the record fails immediately and is not
    /// counted as a retryable condition.
    #[error("no handler registered for task {name:?}")]
    UnknownHandler {
        /// The task name that failed to resolve.
        name: String,
    },
}

impl ExecError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use taskdock::ExecError;
    ///
    /// let err = ExecError::UnknownHandler { name: "send-email".into() };
    /// assert_eq!(err.as_label(), "unknown_handler");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ExecError::Timeout { .. } => "timeout",
            ExecError::Handler { .. } => "handler_failed",
            ExecError::RateLimited { .. } => "rate_limited",
            ExecError::UnknownHandler { .. } => "unknown_handler",
        }
    }

    /// Returns the message persisted into
    /// [`ExecutionResult::error`](crate::ExecutionResult): the raw handler
    /// message for handler failures, the display form otherwise.
    pub fn as_message(&self) -> String {
        match self {
            ExecError::Handler { error, .. } => error.clone(),
            other => other.to_string(),
        }
    }

    /// Indicates whether the failure is eligible for backoff-and-retry.
    ///
    /// Returns `true` for [`ExecError::Handler`] and [`ExecError::Timeout`],
    /// `false` otherwise.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecError::Handler { .. } | ExecError::Timeout { .. })
    }

    /// Optional stack/detail attached to the failure, if any.
    pub fn stack(&self) -> Option<&str> {
        match self {
            ExecError::Handler { stack, .. } => stack.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        let handler = ExecError::Handler {
            error: "boom".into(),
            stack: None,
        };
        let timeout = ExecError::Timeout {
            timeout: Duration::from_millis(50),
        };
        let limited = ExecError::RateLimited {
            max_executions: 2,
            window_ms: 1000,
        };
        let unknown = ExecError::UnknownHandler { name: "nope".into() };

        assert!(handler.is_retryable());
        assert!(timeout.is_retryable());
        assert!(!limited.is_retryable());
        assert!(!unknown.is_retryable());
    }

    #[test]
    fn timeout_message_is_recognizable() {
        let err = ExecError::Timeout {
            timeout: Duration::from_millis(50),
        };
        assert!(err.to_string().to_lowercase().contains("timeout"));
    }

    #[test]
    fn labels_are_stable() {
        let err = ExecError::RateLimited {
            max_executions: 1,
            window_ms: 500,
        };
        assert_eq!(err.as_label(), "rate_limited");

        let err = OrchestratorError::RecordNotFound { id: "t1".into() };
        assert_eq!(err.as_label(), "record_not_found");
    }
}
