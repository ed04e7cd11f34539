//! # Task store contract.
//!
//! [`TaskStore`] is the only seam between the orchestrator and persistence:
//! keyed JSON values plus one wake-timer slot. All calls are executed
//! serially with respect to the owning orchestrator (the engine holds its
//! actor gate across every read-modify-write sequence), so implementations do
//! not need their own transaction machinery.
//!
//! ## Rules
//! - Values are opaque [`serde_json::Value`]s; the engine owns the schema.
//! - `list(prefix)` returns every entry whose key starts with `prefix`,
//!   ordered by key.
//! - The wake timer is a **single slot**: `set_wake_timer` overwrites any
//!   previous target unconditionally.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

/// Errors surfaced by a [`TaskStore`] backend.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum StoreError {
    /// A stored value could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The backend failed an operation (I/O, connection, ...).
    #[error("backend error: {0}")]
    Backend(String),
}

/// Key/value persistence plus a single wake-timer slot.
///
/// The orchestrator stores execution records under `task:<id>`, the
/// idempotency index under `idempotency:<key>`, and rate-limit windows under
/// `ratelimit:<key>`.
#[async_trait]
pub trait TaskStore: Send + Sync + 'static {
    /// Reads a single value.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Reads several values at once; missing keys are absent from the map.
    async fn get_many(&self, keys: &[String]) -> Result<HashMap<String, Value>, StoreError>;

    /// Writes a single value.
    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Writes several values at once.
    async fn put_many(&self, entries: Vec<(String, Value)>) -> Result<(), StoreError>;

    /// Deletes a single key; returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Deletes several keys; returns how many existed.
    async fn delete_many(&self, keys: &[String]) -> Result<usize, StoreError>;

    /// Returns every entry whose key starts with `prefix`, ordered by key.
    async fn list(&self, prefix: &str) -> Result<BTreeMap<String, Value>, StoreError>;

    /// Arms the wake-timer slot, overwriting any previous target.
    async fn set_wake_timer(&self, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Reads the currently armed wake target, if any.
    async fn get_wake_timer(&self) -> Result<Option<DateTime<Utc>>, StoreError>;

    /// Clears the wake-timer slot.
    async fn clear_wake_timer(&self) -> Result<(), StoreError>;
}
