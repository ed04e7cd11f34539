//! # Orchestrator: the execution engine state machine.
//!
//! One [`Orchestrator`] instance is one logical actor owning one task group:
//! every read-modify-write against the task store runs under an internal
//! gate, so state transitions are serialized without any further locking.
//! Handler execution itself runs **outside** the gate, detached from the
//! submitting caller.
//!
//! ## State machine
//! ```text
//! submit ──► idempotency gate ──► rate-limit gate ──► pending record
//!                 │ hit                  │ denied           │
//!                 ▼                      ▼                  ▼ claim
//!         existing record        rate_limited (terminal)  running
//!                                                           │
//!                               ┌───────────────────────────┤
//!                               ▼                           ▼
//!                        handler Ok                  handler Err / timeout
//!                               │                           │
//!                               ▼                 retries < max_retries?
//!                          completed              ├─ yes ─► pending
//!                                                 │         (retries += 1,
//!                                                 │          wake timer armed)
//!                                                 └─ no ──► failed
//!
//! cancel():  pending | rate_limited ──► cancelled   (running: refused)
//! retry():   failed | cancelled | rate_limited ──► pending (retries = 0)
//! ```
//!
//! ## Rules
//! - The engine never re-enters execution for a record that is not
//!   `pending`: at most one attempt runs per task id at any time.
//! - Handler failures never propagate to the `submit`/`retry` caller; they
//!   are captured into the record's [`ExecutionResult`].
//! - `retries` increments only when a failed attempt is returned to
//!   `pending`; an attempt always runs at the pre-increment value.
//! - Consumers observe progress by polling (`get_status`, `list_records`);
//!   there is no completion callback surface.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::{ExecConfig, TaskConfig};
use crate::error::{ExecError, OrchestratorError};
use crate::store::{TaskStore, keys};
use crate::tasks::{
    ExecutionRecord, ExecutionResult, ExecutionTask, HandlerRegistry, ListFilter, TaskStatus,
};

use super::metrics::{self, ExecMetrics};
use super::scheduler::{self, WakeTimer};
use super::{limiter, runner};

/// A claimed execution: the snapshot the detached run needs.
struct Claim {
    task: ExecutionTask,
}

struct Inner {
    store: Arc<dyn TaskStore>,
    handlers: HandlerRegistry,
    defaults: RwLock<ExecConfig>,
    /// Actor gate: serializes every read-modify-write sequence.
    gate: Mutex<()>,
    wake: WakeTimer,
    token: CancellationToken,
}

/// Task execution orchestrator.
///
/// Owns one task group: accepts named tasks, runs them through the injected
/// [`HandlerRegistry`], and manages retry-with-backoff, per-key rate
/// limiting, idempotent resubmission, execution timeouts, and cancellation,
/// all persisted through the [`TaskStore`] contract.
///
/// Cloning is cheap and shares the instance. Construction spawns the wake
/// loop, so an orchestrator must be created inside a tokio runtime; call
/// [`Orchestrator::shutdown`] to stop it.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    /// Creates an orchestrator with default configuration.
    pub fn new(store: Arc<dyn TaskStore>, handlers: HandlerRegistry) -> Self {
        Self::with_defaults(store, handlers, ExecConfig::default())
    }

    /// Creates an orchestrator with explicit instance defaults.
    pub fn with_defaults(
        store: Arc<dyn TaskStore>,
        handlers: HandlerRegistry,
        defaults: ExecConfig,
    ) -> Self {
        let (wake, wake_rx) = WakeTimer::new();
        let token = CancellationToken::new();
        let orchestrator = Self {
            inner: Arc::new(Inner {
                store,
                handlers,
                defaults: RwLock::new(defaults),
                gate: Mutex::new(()),
                wake,
                token: token.clone(),
            }),
        };
        scheduler::spawn_wake_loop(orchestrator.clone(), wake_rx, token);
        orchestrator
    }

    /// Stops the wake loop. In-flight handler attempts still settle.
    pub fn shutdown(&self) {
        self.inner.token.cancel();
    }

    /// Merges a partial configuration into the instance defaults and returns
    /// the resulting configuration.
    ///
    /// Tasks submitted afterwards merge their per-task override over the new
    /// defaults; tasks already dispatched keep the configuration they were
    /// submitted with.
    pub fn configure(&self, patch: TaskConfig) -> ExecConfig {
        let mut defaults = self.inner.defaults.write().expect("defaults lock poisoned");
        *defaults = defaults.merged(Some(&patch));
        defaults.clone()
    }

    /// Submits a task for execution.
    ///
    /// Gates in order: idempotency (a known key returns the existing record
    /// unchanged: no new record, no rate-limit check, no execution), then
    /// rate-limit allowance (denied submissions get a terminal
    /// `rate_limited` record). Admitted tasks are persisted as `pending`,
    /// claimed, and run detached; the returned record is the `pending`
    /// snapshot and the caller never awaits completion.
    pub async fn submit(&self, task: ExecutionTask) -> Result<ExecutionRecord, OrchestratorError> {
        let (snapshot, dispatch) = {
            let _gate = self.inner.gate.lock().await;

            if let Some(key) = &task.idempotency_key {
                if let Some(existing) = self.lookup_idempotent(key).await? {
                    tracing::debug!(
                        task = %existing.task.id,
                        key = %key,
                        "resubmission coalesced onto existing record"
                    );
                    return Ok(existing);
                }
            }

            let cfg = self.merged_config(task.config.as_ref());
            let now = Utc::now();

            if let Some(rl) = &cfg.rate_limit {
                if !limiter::check_allowance(self.inner.store.as_ref(), rl, now).await? {
                    let err = ExecError::RateLimited {
                        max_executions: rl.max_executions,
                        window_ms: rl.window_ms,
                    };
                    let mut record = ExecutionRecord::new(task, TaskStatus::RateLimited, now);
                    record.result = Some(ExecutionResult::rate_limited(&record.task.id, &err, now));
                    self.persist_new(&record).await?;
                    tracing::warn!(task = %record.task.id, "submission rate limited");
                    return Ok(record);
                }
            }

            let record = ExecutionRecord::new(task, TaskStatus::Pending, now);
            self.persist_new(&record).await?;
            tracing::debug!(task = %record.task.id, name = %record.task.name, "task submitted");

            // Claim before returning so the window increment is visible to
            // the next serialized submission.
            let claim = self.claim_due(record.id(), &cfg).await?;
            (record, claim.map(|c| (c, cfg)))
        };

        if let Some((claim, cfg)) = dispatch {
            self.spawn_run(claim, cfg);
        }
        Ok(snapshot)
    }

    /// Returns the record for `id`, if one exists.
    pub async fn get_status(&self, id: &str) -> Result<Option<ExecutionRecord>, OrchestratorError> {
        let _gate = self.inner.gate.lock().await;
        self.load_record(id).await
    }

    /// Cancels a task that has not started running.
    ///
    /// Returns `true` and transitions to `cancelled` from `pending` or
    /// `rate_limited`. Returns `false` for anything else: cancellation is
    /// non-cooperative, a running handler cannot be interrupted.
    pub async fn cancel(&self, id: &str) -> Result<bool, OrchestratorError> {
        let _gate = self.inner.gate.lock().await;
        let mut record = self
            .load_record(id)
            .await?
            .ok_or_else(|| OrchestratorError::RecordNotFound { id: id.to_string() })?;

        match record.status {
            TaskStatus::Pending | TaskStatus::RateLimited => {
                record.status = TaskStatus::Cancelled;
                record.scheduled_at = None;
                record.updated_at = Utc::now();
                self.store_record(&record).await?;
                tracing::info!(task = %id, "task cancelled");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Manually re-dispatches a terminal task, resetting its retry counter.
    ///
    /// Valid from `failed`, `cancelled`, and `rate_limited`; other statuses
    /// yield [`OrchestratorError::InvalidTransition`]. The rate-limit
    /// allowance is not re-checked (that gate belongs to `submit`), but the
    /// attempt is still recorded in the window when it starts.
    pub async fn retry(&self, id: &str) -> Result<ExecutionRecord, OrchestratorError> {
        let (snapshot, dispatch) = {
            let _gate = self.inner.gate.lock().await;
            let mut record = self
                .load_record(id)
                .await?
                .ok_or_else(|| OrchestratorError::RecordNotFound { id: id.to_string() })?;

            if !matches!(
                record.status,
                TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::RateLimited
            ) {
                return Err(OrchestratorError::InvalidTransition {
                    id: id.to_string(),
                    from: record.status,
                });
            }

            record.status = TaskStatus::Pending;
            record.retries = 0;
            record.scheduled_at = None;
            record.updated_at = Utc::now();
            self.store_record(&record).await?;
            tracing::info!(task = %id, "manual retry requested");

            let cfg = self.merged_config(record.task.config.as_ref());
            let claim = self.claim_due(id, &cfg).await?;
            (record, claim.map(|c| (c, cfg)))
        };

        if let Some((claim, cfg)) = dispatch {
            self.spawn_run(claim, cfg);
        }
        Ok(snapshot)
    }

    /// Lists records matching `filter`, sorted by priority descending, then
    /// creation time descending.
    pub async fn list_records(
        &self,
        filter: &ListFilter,
    ) -> Result<Vec<ExecutionRecord>, OrchestratorError> {
        let _gate = self.inner.gate.lock().await;
        let mut records = self.load_records().await?;
        records.retain(|r| filter.matches(r));
        records.sort_by(|a, b| {
            b.task
                .priority
                .cmp(&a.task.priority)
                .then(b.created_at.cmp(&a.created_at))
        });
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    /// Computes metrics over every stored record.
    pub async fn get_metrics(&self) -> Result<ExecMetrics, OrchestratorError> {
        let _gate = self.inner.gate.lock().await;
        let records = self.load_records().await?;
        Ok(metrics::aggregate(&records))
    }

    // ---------------------------
    // Wake plumbing
    // ---------------------------

    /// Re-scans pending records and dispatches everything due.
    ///
    /// Called by the wake loop when the timer fires. Clears the persisted
    /// slot, claims every `pending` record with `scheduled_at <= now`, and
    /// re-arms the slot to the earliest remaining future `scheduled_at` so
    /// that wakes overwritten by later targets are recovered.
    pub(crate) async fn on_wake(&self) -> Result<(), OrchestratorError> {
        let mut due: Vec<(Claim, ExecConfig)> = Vec::new();
        {
            let _gate = self.inner.gate.lock().await;
            self.inner.store.clear_wake_timer().await?;

            let now = Utc::now();
            let mut next: Option<DateTime<Utc>> = None;
            let records = self.load_records().await?;

            for record in records.iter().filter(|r| r.status == TaskStatus::Pending) {
                let Some(at) = record.scheduled_at else {
                    continue;
                };
                if at <= now {
                    let cfg = self.merged_config(record.task.config.as_ref());
                    if let Some(claim) = self.claim_due(record.id(), &cfg).await? {
                        due.push((claim, cfg));
                    }
                } else {
                    next = Some(next.map_or(at, |n| n.min(at)));
                }
            }

            if let Some(at) = next {
                self.inner.store.set_wake_timer(at).await?;
                self.inner.wake.arm(at);
            }
            tracing::debug!(dispatched = due.len(), "wake scan complete");
        }

        for (claim, cfg) in due {
            self.spawn_run(claim, cfg);
        }
        Ok(())
    }

    /// Reads the persisted wake target (startup recovery).
    pub(crate) async fn persisted_wake_target(
        &self,
    ) -> Result<Option<DateTime<Utc>>, OrchestratorError> {
        Ok(self.inner.store.get_wake_timer().await?)
    }

    /// Arms the in-process slot without touching the store (recovery path).
    pub(crate) fn arm_wake_local(&self, at: DateTime<Utc>) {
        self.inner.wake.arm(at);
    }

    /// Clears the in-process slot (the loop does this right before a scan).
    pub(crate) fn disarm_wake_local(&self) {
        self.inner.wake.disarm();
    }

    // ---------------------------
    // Execution internals
    // ---------------------------

    /// Claims a `pending` record for execution: transitions it to `running`
    /// and records the attempt in the rate-limit window.
    ///
    /// Returns `None` if the record is absent or not `pending`; the engine
    /// never re-enters execution for a record already claimed. The caller
    /// must hold the actor gate.
    async fn claim_due(
        &self,
        id: &str,
        cfg: &ExecConfig,
    ) -> Result<Option<Claim>, OrchestratorError> {
        let Some(mut record) = self.load_record(id).await? else {
            return Ok(None);
        };
        if record.status != TaskStatus::Pending {
            return Ok(None);
        }

        record.status = TaskStatus::Running;
        record.updated_at = Utc::now();
        if let Some(rl) = &cfg.rate_limit {
            limiter::record_execution(self.inner.store.as_ref(), rl, id, record.updated_at).await?;
        }
        self.store_record(&record).await?;
        Ok(Some(Claim { task: record.task }))
    }

    /// Runs a claimed task detached from the caller.
    fn spawn_run(&self, claim: Claim, cfg: ExecConfig) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(err) = this.run_and_settle(claim, cfg).await {
                tracing::error!(error = %err, "execution settle failed");
            }
        });
    }

    async fn run_and_settle(&self, claim: Claim, cfg: ExecConfig) -> Result<(), OrchestratorError> {
        let started = Utc::now();
        let outcome = match self.inner.handlers.resolve(&claim.task.name) {
            Some(handler) => {
                runner::run_once(&handler, claim.task.input.clone(), cfg.attempt_timeout()).await
            }
            None => Err(ExecError::UnknownHandler {
                name: claim.task.name.clone(),
            }),
        };
        let completed = Utc::now();
        self.settle(&claim.task.id, outcome, &cfg, started, completed)
            .await
    }

    /// Interprets an attempt outcome and persists the transition.
    async fn settle(
        &self,
        id: &str,
        outcome: Result<Value, ExecError>,
        cfg: &ExecConfig,
        started: DateTime<Utc>,
        completed: DateTime<Utc>,
    ) -> Result<(), OrchestratorError> {
        let _gate = self.inner.gate.lock().await;
        let Some(mut record) = self.load_record(id).await? else {
            return Err(OrchestratorError::RecordNotFound { id: id.to_string() });
        };
        if record.status != TaskStatus::Running {
            tracing::debug!(task = %id, status = %record.status, "stale settle ignored");
            return Ok(());
        }

        let mut arm_at: Option<DateTime<Utc>> = None;
        match outcome {
            Ok(output) => {
                record.result = Some(ExecutionResult::success(
                    id,
                    output,
                    record.retries,
                    started,
                    completed,
                ));
                record.status = TaskStatus::Completed;
                record.scheduled_at = None;
                tracing::debug!(task = %id, "task completed");
            }
            Err(err) if err.is_retryable() && record.retries < cfg.max_retries => {
                let delay = cfg.retry_policy().next(record.retries);
                let delta = TimeDelta::from_std(delay).unwrap_or(TimeDelta::MAX);
                let next_at = completed
                    .checked_add_signed(delta)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);

                record.result = Some(ExecutionResult::failure(
                    id,
                    TaskStatus::Pending,
                    &err,
                    record.retries,
                    started,
                    completed,
                    Some(next_at),
                ));
                record.retries += 1;
                record.status = TaskStatus::Pending;
                record.scheduled_at = Some(next_at);
                arm_at = Some(next_at);
                tracing::warn!(
                    task = %id,
                    retries = record.retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "execution failed, retry scheduled"
                );
            }
            Err(err) => {
                record.result = Some(ExecutionResult::failure(
                    id,
                    TaskStatus::Failed,
                    &err,
                    record.retries,
                    started,
                    completed,
                    None,
                ));
                record.status = TaskStatus::Failed;
                record.scheduled_at = None;
                tracing::error!(task = %id, retries = record.retries, error = %err, "task failed");
            }
        }

        record.updated_at = completed;
        self.store_record(&record).await?;
        if let Some(at) = arm_at {
            self.inner.store.set_wake_timer(at).await?;
            self.inner.wake.arm(at);
        }
        Ok(())
    }

    // ---------------------------
    // Store helpers
    // ---------------------------

    fn merged_config(&self, patch: Option<&TaskConfig>) -> ExecConfig {
        self.inner
            .defaults
            .read()
            .expect("defaults lock poisoned")
            .merged(patch)
    }

    async fn lookup_idempotent(
        &self,
        key: &str,
    ) -> Result<Option<ExecutionRecord>, OrchestratorError> {
        let Some(value) = self.inner.store.get(&keys::idempotency(key)).await? else {
            return Ok(None);
        };
        let Some(id) = value.as_str() else {
            return Ok(None);
        };
        // A mapping whose record vanished is treated as absent.
        self.load_record(id).await
    }

    /// Persists a freshly created record plus its idempotency mapping.
    async fn persist_new(&self, record: &ExecutionRecord) -> Result<(), OrchestratorError> {
        let mut entries = vec![(keys::task(record.id()), serde_json::to_value(record)?)];
        if let Some(key) = &record.task.idempotency_key {
            entries.push((
                keys::idempotency(key),
                Value::String(record.id().to_string()),
            ));
        }
        self.inner.store.put_many(entries).await?;
        Ok(())
    }

    async fn load_record(&self, id: &str) -> Result<Option<ExecutionRecord>, OrchestratorError> {
        match self.inner.store.get(&keys::task(id)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    async fn store_record(&self, record: &ExecutionRecord) -> Result<(), OrchestratorError> {
        self.inner
            .store
            .put(&keys::task(record.id()), serde_json::to_value(record)?)
            .await?;
        Ok(())
    }

    async fn load_records(&self) -> Result<Vec<ExecutionRecord>, OrchestratorError> {
        let entries = self.inner.store.list(keys::TASK_PREFIX).await?;
        entries
            .into_values()
            .map(|value| serde_json::from_value(value).map_err(OrchestratorError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RateLimitConfig;
    use crate::store::MemoryStore;
    use crate::tasks::HandlerError;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time;

    fn orchestrator(handlers: HandlerRegistry) -> Orchestrator {
        Orchestrator::new(Arc::new(MemoryStore::new()), handlers)
    }

    fn echo_registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("echo", |input: Value| async move { Ok(json!({ "echo": input })) });
        registry
    }

    fn boom_registry() -> HandlerRegistry {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("boom", |_input: Value| async move {
            Err::<Value, _>(HandlerError::new("boom"))
        });
        registry
    }

    fn retry_fast() -> TaskConfig {
        TaskConfig {
            max_retries: Some(2),
            initial_retry_delay_ms: Some(10),
            ..TaskConfig::default()
        }
    }

    async fn await_status(
        orc: &Orchestrator,
        id: &str,
        status: TaskStatus,
        deadline_ms: u64,
    ) -> ExecutionRecord {
        let deadline = time::Instant::now() + Duration::from_millis(deadline_ms);
        loop {
            if let Some(record) = orc.get_status(id).await.unwrap() {
                if record.status == status {
                    return record;
                }
            }
            assert!(
                time::Instant::now() < deadline,
                "task {id} did not reach {status} within {deadline_ms}ms"
            );
            time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn submit_runs_handler_to_completion() {
        let orc = orchestrator(echo_registry());
        let submitted = orc
            .submit(ExecutionTask::new("t1", "echo", json!({"n": 1})))
            .await
            .unwrap();
        assert_eq!(submitted.status, TaskStatus::Pending);

        let record = await_status(&orc, "t1", TaskStatus::Completed, 2000).await;
        let result = record.result.unwrap();
        assert_eq!(result.output, Some(json!({ "echo": {"n": 1} })));
        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(result.retries, 0);
        assert!(!result.was_rate_limited);
        assert_eq!(record.retries, 0);
        orc.shutdown();
    }

    #[tokio::test]
    async fn failing_handler_exhausts_retries() {
        // The §8-style scenario: max_retries = 2, handler always throws.
        let orc = orchestrator(boom_registry());
        orc.submit(ExecutionTask::new("t1", "boom", Value::Null).with_config(retry_fast()))
            .await
            .unwrap();

        let record = await_status(&orc, "t1", TaskStatus::Failed, 3000).await;
        assert_eq!(record.retries, 2);

        let result = record.result.unwrap();
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert_eq!(result.retries, 2);
        assert_eq!(result.status, TaskStatus::Failed);
        assert!(result.next_retry_at.is_none());
        orc.shutdown();
    }

    #[tokio::test]
    async fn retry_is_scheduled_with_backoff_state() {
        let orc = orchestrator(boom_registry());
        let cfg = TaskConfig {
            max_retries: Some(1),
            initial_retry_delay_ms: Some(60_000),
            ..TaskConfig::default()
        };
        orc.submit(ExecutionTask::new("t1", "boom", Value::Null).with_config(cfg))
            .await
            .unwrap();

        let record = await_status(&orc, "t1", TaskStatus::Pending, 2000).await;
        assert_eq!(record.retries, 1);
        let scheduled = record.scheduled_at.expect("retry must be scheduled");
        assert!(scheduled > Utc::now());

        let result = record.result.unwrap();
        assert_eq!(result.status, TaskStatus::Pending);
        assert_eq!(result.retries, 0);
        assert_eq!(result.next_retry_at, Some(scheduled));
        orc.shutdown();
    }

    #[tokio::test]
    async fn idempotent_resubmission_returns_first_record() {
        let orc = orchestrator(echo_registry());
        let first = orc
            .submit(
                ExecutionTask::new("a", "echo", json!(1)).with_idempotency_key("K"),
            )
            .await
            .unwrap();
        let second = orc
            .submit(
                ExecutionTask::new("b", "echo", json!(2)).with_idempotency_key("K"),
            )
            .await
            .unwrap();

        assert_eq!(first.task.id, "a");
        assert_eq!(second.task.id, "a");
        assert!(orc.get_status("b").await.unwrap().is_none());
        orc.shutdown();
    }

    #[tokio::test]
    async fn third_submission_in_window_is_rate_limited() {
        let orc = orchestrator(echo_registry());
        let cfg = TaskConfig {
            rate_limit: Some(RateLimitConfig {
                max_executions: 2,
                window_ms: 60_000,
                key: None,
            }),
            ..TaskConfig::default()
        };

        for id in ["t1", "t2", "t3"] {
            orc.submit(ExecutionTask::new(id, "echo", Value::Null).with_config(cfg.clone()))
                .await
                .unwrap();
        }

        let limited = await_status(&orc, "t3", TaskStatus::RateLimited, 1000).await;
        let result = limited.result.unwrap();
        assert!(result.was_rate_limited);
        assert!(result.error.unwrap().contains("rate limit exceeded"));

        await_status(&orc, "t1", TaskStatus::Completed, 2000).await;
        await_status(&orc, "t2", TaskStatus::Completed, 2000).await;

        let all_limited = orc
            .list_records(&ListFilter::all().with_status(TaskStatus::RateLimited))
            .await
            .unwrap();
        assert_eq!(all_limited.len(), 1);
        orc.shutdown();
    }

    #[tokio::test]
    async fn timeout_is_reported_and_terminal_without_retries() {
        let mut registry = HandlerRegistry::new();
        registry.register_fn("stuck", |_input: Value| async move {
            time::sleep(Duration::from_secs(3600)).await;
            Ok(Value::Null)
        });
        let orc = orchestrator(registry);
        let cfg = TaskConfig {
            max_retries: Some(0),
            timeout_ms: Some(50),
            ..TaskConfig::default()
        };
        orc.submit(ExecutionTask::new("t1", "stuck", Value::Null).with_config(cfg))
            .await
            .unwrap();

        let record = await_status(&orc, "t1", TaskStatus::Failed, 3000).await;
        assert_eq!(record.retries, 0);
        let error = record.result.unwrap().error.unwrap();
        assert!(error.to_lowercase().contains("timeout"), "got: {error}");
        orc.shutdown();
    }

    #[tokio::test]
    async fn cancel_pending_succeeds_cancel_running_is_refused() {
        let mut registry = boom_registry();
        registry.register_fn("slow", |_input: Value| async move {
            time::sleep(Duration::from_millis(400)).await;
            Ok(json!("done"))
        });
        let orc = orchestrator(registry);

        // A scheduled retry far in the future keeps this record pending.
        let cfg = TaskConfig {
            max_retries: Some(1),
            initial_retry_delay_ms: Some(60_000),
            ..TaskConfig::default()
        };
        orc.submit(ExecutionTask::new("p1", "boom", Value::Null).with_config(cfg))
            .await
            .unwrap();
        await_status(&orc, "p1", TaskStatus::Pending, 2000).await;
        assert!(orc.cancel("p1").await.unwrap());
        let record = await_status(&orc, "p1", TaskStatus::Cancelled, 500).await;
        assert!(record.scheduled_at.is_none());

        // Cancelling again is a no-op on the terminal record.
        assert!(!orc.cancel("p1").await.unwrap());

        // A running handler cannot be interrupted.
        orc.submit(ExecutionTask::new("r1", "slow", Value::Null))
            .await
            .unwrap();
        await_status(&orc, "r1", TaskStatus::Running, 1000).await;
        assert!(!orc.cancel("r1").await.unwrap());
        await_status(&orc, "r1", TaskStatus::Completed, 2000).await;

        // Unknown ids are an error, not `false`.
        let err = orc.cancel("ghost").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::RecordNotFound { .. }));
        orc.shutdown();
    }

    #[tokio::test]
    async fn manual_retry_resurrects_rate_limited_record() {
        let orc = orchestrator(echo_registry());
        let cfg = TaskConfig {
            rate_limit: Some(RateLimitConfig {
                max_executions: 0,
                window_ms: 60_000,
                key: None,
            }),
            ..TaskConfig::default()
        };
        let record = orc
            .submit(ExecutionTask::new("t1", "echo", json!(7)).with_config(cfg))
            .await
            .unwrap();
        assert_eq!(record.status, TaskStatus::RateLimited);
        assert!(record.result.unwrap().was_rate_limited);

        let resurrected = orc.retry("t1").await.unwrap();
        assert_eq!(resurrected.retries, 0);

        let record = await_status(&orc, "t1", TaskStatus::Completed, 2000).await;
        let result = record.result.unwrap();
        assert!(!result.was_rate_limited);
        assert_eq!(result.output, Some(json!({ "echo": 7 })));
        orc.shutdown();
    }

    #[tokio::test]
    async fn retry_refuses_non_terminal_records() {
        let orc = orchestrator(echo_registry());
        orc.submit(ExecutionTask::new("t1", "echo", Value::Null))
            .await
            .unwrap();
        await_status(&orc, "t1", TaskStatus::Completed, 2000).await;

        let err = orc.retry("t1").await.unwrap_err();
        assert!(matches!(
            err,
            OrchestratorError::InvalidTransition {
                from: TaskStatus::Completed,
                ..
            }
        ));
        orc.shutdown();
    }

    #[tokio::test]
    async fn unknown_handler_fails_immediately() {
        let orc = orchestrator(HandlerRegistry::new());
        orc.submit(ExecutionTask::new("t1", "ghost", Value::Null))
            .await
            .unwrap();

        let record = await_status(&orc, "t1", TaskStatus::Failed, 2000).await;
        assert_eq!(record.retries, 0);
        let error = record.result.unwrap().error.unwrap();
        assert!(error.contains("no handler registered"), "got: {error}");
        orc.shutdown();
    }

    #[tokio::test]
    async fn wake_scan_recovers_overwritten_schedules() {
        // Two tasks retry on different schedules. Whichever failure arms the
        // slot last overwrites the other's target; the wake scan must still
        // complete both.
        let mut registry = HandlerRegistry::new();
        for (name, calls) in [("flaky-a", Arc::new(AtomicU32::new(0))), ("flaky-b", Arc::new(AtomicU32::new(0)))] {
            registry.register_fn(name, move |_input: Value| {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(HandlerError::new("transient"))
                    } else {
                        Ok(json!("recovered"))
                    }
                }
            });
        }
        let orc = orchestrator(registry);

        let short = TaskConfig {
            max_retries: Some(2),
            initial_retry_delay_ms: Some(100),
            ..TaskConfig::default()
        };
        let long = TaskConfig {
            max_retries: Some(2),
            initial_retry_delay_ms: Some(400),
            ..TaskConfig::default()
        };
        orc.submit(ExecutionTask::new("a", "flaky-a", Value::Null).with_config(short))
            .await
            .unwrap();
        orc.submit(ExecutionTask::new("b", "flaky-b", Value::Null).with_config(long))
            .await
            .unwrap();

        await_status(&orc, "a", TaskStatus::Completed, 4000).await;
        await_status(&orc, "b", TaskStatus::Completed, 4000).await;
        orc.shutdown();
    }

    #[tokio::test]
    async fn list_records_sorts_by_priority_then_recency() {
        let orc = orchestrator(echo_registry());
        for (id, priority) in [("low", 1), ("high", 5), ("mid", 3)] {
            orc.submit(ExecutionTask::new(id, "echo", Value::Null).with_priority(priority))
                .await
                .unwrap();
            await_status(&orc, id, TaskStatus::Completed, 2000).await;
        }

        let records = orc.list_records(&ListFilter::all()).await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec!["high", "mid", "low"]);

        let limited = orc
            .list_records(&ListFilter::all().with_limit(2))
            .await
            .unwrap();
        assert_eq!(limited.len(), 2);

        let named = orc
            .list_records(&ListFilter::all().with_name("echo"))
            .await
            .unwrap();
        assert_eq!(named.len(), 3);
        orc.shutdown();
    }

    #[tokio::test]
    async fn metrics_cover_every_status_bucket() {
        let mut registry = echo_registry();
        registry.register_fn("boom", |_input: Value| async move {
            Err::<Value, _>(HandlerError::new("boom"))
        });
        let orc = orchestrator(registry);

        orc.submit(ExecutionTask::new("done", "echo", Value::Null))
            .await
            .unwrap();
        await_status(&orc, "done", TaskStatus::Completed, 2000).await;

        orc.submit(
            ExecutionTask::new("dead", "boom", Value::Null).with_config(TaskConfig {
                max_retries: Some(0),
                ..TaskConfig::default()
            }),
        )
        .await
        .unwrap();
        await_status(&orc, "dead", TaskStatus::Failed, 2000).await;

        orc.submit(
            ExecutionTask::new("limited", "echo", Value::Null).with_config(TaskConfig {
                rate_limit: Some(RateLimitConfig {
                    max_executions: 0,
                    window_ms: 60_000,
                    key: None,
                }),
                ..TaskConfig::default()
            }),
        )
        .await
        .unwrap();

        orc.submit(
            ExecutionTask::new("waiting", "boom", Value::Null).with_config(TaskConfig {
                max_retries: Some(3),
                initial_retry_delay_ms: Some(60_000),
                ..TaskConfig::default()
            }),
        )
        .await
        .unwrap();
        await_status(&orc, "waiting", TaskStatus::Pending, 2000).await;

        let metrics = orc.get_metrics().await.unwrap();
        assert_eq!(metrics.total, 4);
        assert_eq!(metrics.completed, 1);
        assert_eq!(metrics.failed, 1);
        assert_eq!(metrics.rate_limited, 1);
        assert_eq!(metrics.pending, 1);
        assert_eq!(metrics.running, 0);
        assert_eq!(metrics.cancelled, 0);
        // one record at retries=1, three at 0
        assert!((metrics.average_retries - 0.25).abs() < 1e-9);
        orc.shutdown();
    }

    #[tokio::test]
    async fn configure_updates_instance_defaults() {
        let orc = orchestrator(boom_registry());
        let updated = orc.configure(TaskConfig {
            max_retries: Some(0),
            ..TaskConfig::default()
        });
        assert_eq!(updated.max_retries, 0);

        orc.submit(ExecutionTask::new("t1", "boom", Value::Null))
            .await
            .unwrap();
        let record = await_status(&orc, "t1", TaskStatus::Failed, 2000).await;
        assert_eq!(record.retries, 0);
        orc.shutdown();
    }
}
