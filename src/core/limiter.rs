//! # Fixed-window rate limiter.
//!
//! Window state is persisted in the task store under `ratelimit:<key>`; one
//! state per distinct rate-limit key, shared by every task configured with
//! that key.
//!
//! Two separate phases, two separate store operations:
//! - [`check_allowance`] at submit time decides `rate_limited` vs `pending`.
//!   An expired window is reset (and persisted) before the decision.
//! - [`record_execution`] at the start of each actual attempt appends the
//!   execution to the window.
//!
//! The pair is deliberately not one atomic operation; the engine's actor
//! gate serializes both phases of a submission before the next submission is
//! admitted, which keeps serialized bursts within `max_executions`.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::config::RateLimitConfig;
use crate::error::OrchestratorError;
use crate::store::{TaskStore, keys};

/// Persisted window state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub(crate) struct RateLimitState {
    /// Ids of executions admitted in the current window.
    pub executions: Vec<String>,
    /// When the current window opened.
    pub window_start: DateTime<Utc>,
    /// Window length in milliseconds.
    pub window_ms: u64,
    /// Window capacity.
    pub max_executions: u32,
}

impl RateLimitState {
    fn fresh(cfg: &RateLimitConfig, now: DateTime<Utc>) -> Self {
        Self {
            executions: Vec::new(),
            window_start: now,
            window_ms: cfg.window_ms,
            max_executions: cfg.max_executions,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.window_start >= TimeDelta::milliseconds(self.window_ms as i64)
    }
}

async fn load(
    store: &dyn TaskStore,
    key: &str,
) -> Result<Option<RateLimitState>, OrchestratorError> {
    match store.get(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Submit-time allowance decision.
///
/// Resets an expired (or absent) window and allows, otherwise allows iff the
/// window still has capacity. Does **not** record the execution.
pub(crate) async fn check_allowance(
    store: &dyn TaskStore,
    cfg: &RateLimitConfig,
    now: DateTime<Utc>,
) -> Result<bool, OrchestratorError> {
    let key = keys::rate_limit(cfg.key());
    match load(store, &key).await? {
        Some(state) if !state.is_expired(now) => {
            Ok((state.executions.len() as u32) < cfg.max_executions)
        }
        _ => {
            let fresh = RateLimitState::fresh(cfg, now);
            store.put(&key, serde_json::to_value(&fresh)?).await?;
            Ok(cfg.max_executions > 0)
        }
    }
}

/// Records one execution in the window at the start of an actual attempt.
pub(crate) async fn record_execution(
    store: &dyn TaskStore,
    cfg: &RateLimitConfig,
    execution_id: &str,
    now: DateTime<Utc>,
) -> Result<(), OrchestratorError> {
    let key = keys::rate_limit(cfg.key());
    let mut state = match load(store, &key).await? {
        Some(state) if !state.is_expired(now) => state,
        _ => RateLimitState::fresh(cfg, now),
    };
    state.executions.push(execution_id.to_string());
    store.put(&key, serde_json::to_value(&state)?).await?;
    Ok(())
}
