//! # Execution configuration.
//!
//! Provides [`ExecConfig`], the complete per-instance defaults, and
//! [`TaskConfig`], a partial JSON-serializable override carried by an
//! individual task.
//!
//! Configuration is layered exactly once per task: the engine computes
//! `defaults.merged(task.config)` when a task is submitted and threads the
//! resulting immutable [`ExecConfig`] through the whole attempt. There is no
//! global mutable configuration.
//!
//! ## Sentinel values
//! - `timeout = 0` → no per-attempt timeout (treated as `None` by
//!   [`ExecConfig::attempt_timeout`])
//! - `rate_limit = None` → unlimited admission
//!
//! ## Example
//! ```
//! use taskdock::{ExecConfig, TaskConfig};
//!
//! let defaults = ExecConfig::default();
//! let patch = TaskConfig {
//!     max_retries: Some(5),
//!     initial_retry_delay_ms: Some(10),
//!     ..TaskConfig::default()
//! };
//!
//! let merged = defaults.merged(Some(&patch));
//! assert_eq!(merged.max_retries, 5);
//! // Unset fields keep the instance defaults.
//! assert_eq!(merged.backoff_multiplier, defaults.backoff_multiplier);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policies::RetryPolicy;

/// Complete execution configuration for one task attempt chain.
///
/// Defines:
/// - **Retry behavior**: `max_retries`, `initial_retry_delay`,
///   `backoff_multiplier`, `max_retry_delay`
/// - **Timeout**: per-attempt bound (`Duration::ZERO` = unbounded)
/// - **Admission**: optional fixed-window rate limit
#[derive(Clone, Debug)]
pub struct ExecConfig {
    /// Maximum number of retry attempts beyond the initial run.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_retry_delay: Duration,
    /// Multiplicative growth factor for successive retry delays.
    pub backoff_multiplier: f64,
    /// Cap applied to the computed retry delay (before jitter).
    pub max_retry_delay: Duration,
    /// Per-attempt execution timeout (`Duration::ZERO` = no timeout).
    pub timeout: Duration,
    /// Fixed-window rate limit applied at submit time (`None` = unlimited).
    pub rate_limit: Option<RateLimitConfig>,
}

impl Default for ExecConfig {
    /// Default configuration:
    ///
    /// - `max_retries = 3`
    /// - `initial_retry_delay = 1s`
    /// - `backoff_multiplier = 2.0`
    /// - `max_retry_delay = 60s`
    /// - `timeout = 30s`
    /// - `rate_limit = None` (unlimited)
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_retry_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            max_retry_delay: Duration::from_secs(60),
            timeout: Duration::from_secs(30),
            rate_limit: None,
        }
    }
}

impl ExecConfig {
    /// Returns the per-attempt timeout as an `Option`.
    ///
    /// - `None` → no timeout
    /// - `Some(d)` → handler races against `d`
    #[inline]
    pub fn attempt_timeout(&self) -> Option<Duration> {
        if self.timeout == Duration::ZERO {
            None
        } else {
            Some(self.timeout)
        }
    }

    /// Returns the retry policy derived from the delay knobs.
    #[inline]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            first: self.initial_retry_delay,
            max: self.max_retry_delay,
            factor: self.backoff_multiplier,
        }
    }

    /// Layers a partial [`TaskConfig`] over these defaults.
    ///
    /// Every field the patch sets wins; unset fields keep the defaults.
    /// Computed once per task at submit time.
    pub fn merged(&self, patch: Option<&TaskConfig>) -> ExecConfig {
        let Some(p) = patch else {
            return self.clone();
        };
        ExecConfig {
            max_retries: p.max_retries.unwrap_or(self.max_retries),
            initial_retry_delay: p
                .initial_retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(self.initial_retry_delay),
            backoff_multiplier: p.backoff_multiplier.unwrap_or(self.backoff_multiplier),
            max_retry_delay: p
                .max_retry_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(self.max_retry_delay),
            timeout: p
                .timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(self.timeout),
            rate_limit: p.rate_limit.clone().or_else(|| self.rate_limit.clone()),
        }
    }
}

/// Partial per-task configuration override.
///
/// Carried on [`ExecutionTask`](crate::ExecutionTask) and accepted by
/// [`Orchestrator::configure`](crate::Orchestrator::configure). All fields
/// are optional; durations travel as millisecond integers so the struct
/// round-trips through JSON untouched.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct TaskConfig {
    /// Maximum retry attempts beyond the initial run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    /// Delay before the first retry, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_retry_delay_ms: Option<u64>,
    /// Multiplicative growth factor for successive retry delays.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backoff_multiplier: Option<f64>,
    /// Cap on the computed retry delay, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_retry_delay_ms: Option<u64>,
    /// Per-attempt timeout in milliseconds (`0` = no timeout).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Fixed-window rate limit for submissions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_limit: Option<RateLimitConfig>,
}

/// Fixed-window rate limit configuration.
///
/// At most `max_executions` attempts may start within any window of
/// `window_ms` milliseconds. State is kept per `key`; tasks that share a key
/// share a window. When `key` is absent the instance-wide default window is
/// used.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RateLimitConfig {
    /// Window capacity.
    pub max_executions: u32,
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// Window identity; tasks sharing a key share the window.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl RateLimitConfig {
    /// Window length as a [`Duration`].
    #[inline]
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Window identity, falling back to the shared default.
    #[inline]
    pub fn key(&self) -> &str {
        self.key.as_deref().unwrap_or("default")
    }
}
