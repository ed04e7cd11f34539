//! # taskdock
//!
//! **Taskdock** is a durable task execution orchestrator for Rust.
//!
//! One orchestrator instance is a single logical actor that accepts named
//! tasks, runs them through a pluggable handler registry, and manages
//! retry-with-backoff, per-key rate limiting, idempotent resubmission,
//! execution timeouts, and cancellation, all backed by a key/value store
//! contract and a single wake-timer primitive.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!    caller                      caller                     caller
//!      │ submit / cancel / retry   │ get_status / list        │ get_metrics
//!      ▼                           ▼                          ▼
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │  Orchestrator (single logical actor)                                  │
//! │  - idempotency gate   (idempotency:<key> index)                       │
//! │  - rate-limit gate    (fixed window per key, persisted)               │
//! │  - state machine      (pending → running → terminal, persisted)       │
//! │  - wake timer         (one slot; re-arm overwrites)                   │
//! └──────┬──────────────────────────┬──────────────────────────┬──────────┘
//!        ▼                          ▼                          ▼
//! ┌──────────────┐          ┌──────────────┐          ┌─────────────────┐
//! │ HandlerRegistry│        │  TaskStore   │          │   wake loop     │
//! │ name → handler │        │ task:<id>    │          │ sleep → re-scan │
//! │ (injected)     │        │ ratelimit:<k>│          │ pending records │
//! └──────────────┘          └──────────────┘          └─────────────────┘
//! ```
//!
//! ### Lifecycle
//! ```text
//! submit(task)
//!   ├─► idempotency key known? ──► return existing record (nothing runs)
//!   ├─► rate window full?      ──► rate_limited record (terminal)
//!   ├─► persist pending record
//!   ├─► claim: pending → running, record attempt in window
//!   └─► detached run:
//!         handler raced against timeout
//!           ├─ Ok        ─► completed (output, duration)
//!           └─ Err/panic ─► retries < max_retries?
//!                ├─ yes ─► pending again (retries += 1,
//!                │         delay = min(first × factor^k, max) + 0–25% jitter,
//!                │         wake timer armed to next_retry_at)
//!                └─ no ──► failed
//!
//! wake fires ─► clear slot ─► scan pending where scheduled_at <= now
//!            ─► claim + run each ─► re-arm to earliest remaining schedule
//! ```
//!
//! ## Features
//! | Area              | Description                                                    | Key types / traits                       |
//! |-------------------|----------------------------------------------------------------|------------------------------------------|
//! | **Handlers**      | Business logic plugged in by name at construction.             | [`Handler`], [`HandlerFn`], [`HandlerRegistry`] |
//! | **Persistence**   | Key/value + wake-timer contract; bring your own backend.       | [`TaskStore`], [`MemoryStore`]           |
//! | **Retries**       | Exponential backoff with additive jitter, capped.              | [`RetryPolicy`], [`ExecConfig`]          |
//! | **Rate limiting** | Fixed window per key, persisted, submit-time admission.        | [`RateLimitConfig`]                      |
//! | **Idempotency**   | Caller-supplied keys coalesce resubmissions.                   | [`ExecutionTask::with_idempotency_key`]  |
//! | **Observation**   | Polling surface plus scanned metrics.                          | [`ExecutionRecord`], [`ExecMetrics`]     |
//! | **Errors**        | Typed taxonomy driving retry decisions.                        | [`ExecError`], [`OrchestratorError`]     |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use serde_json::{json, Value};
//! use taskdock::{ExecutionTask, HandlerRegistry, MemoryStore, Orchestrator, TaskStatus};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut handlers = HandlerRegistry::new();
//!     handlers.register_fn("greet", |input: Value| async move {
//!         let name = input["name"].as_str().unwrap_or("world").to_string();
//!         Ok(json!({ "greeting": format!("hello, {name}") }))
//!     });
//!
//!     let orchestrator = Orchestrator::new(Arc::new(MemoryStore::new()), handlers);
//!
//!     let record = orchestrator
//!         .submit(ExecutionTask::new("t1", "greet", json!({ "name": "ada" })))
//!         .await?;
//!     assert_eq!(record.status, TaskStatus::Pending);
//!
//!     // Submission is fire-and-forget; consumers poll for progress.
//!     loop {
//!         let record = orchestrator.get_status("t1").await?.expect("record exists");
//!         if record.status.is_terminal() {
//!             assert_eq!(record.status, TaskStatus::Completed);
//!             break;
//!         }
//!         tokio::time::sleep(std::time::Duration::from_millis(5)).await;
//!     }
//!
//!     orchestrator.shutdown();
//!     Ok(())
//! }
//! ```

mod config;
mod core;
mod error;
mod policies;
mod store;
mod tasks;

// ---- Public re-exports ----

pub use config::{ExecConfig, RateLimitConfig, TaskConfig};
pub use crate::core::{ExecMetrics, Orchestrator};
pub use error::{ExecError, OrchestratorError};
pub use policies::RetryPolicy;
pub use store::{MemoryStore, StoreError, TaskStore};
pub use tasks::{
    BoxHandlerFuture, ExecutionRecord, ExecutionResult, ExecutionTask, Handler, HandlerError,
    HandlerFn, HandlerRef, HandlerRegistry, ListFilter, TaskStatus,
};
