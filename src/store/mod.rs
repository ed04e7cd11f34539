//! Durable state: the key/value + wake-timer contract and its in-process
//! reference implementation.
//!
//! This module contains:
//! - [`TaskStore`]: the persistence contract the orchestrator is written
//!   against, plain keyed JSON values plus a single wake-timer slot;
//! - [`StoreError`]: failures a backend may surface;
//! - [`MemoryStore`]: a complete in-process implementation, used by the test
//!   suite and suitable for embedding;
//! - `keys`: the key-namespace builders (`task:`, `idempotency:`,
//!   `ratelimit:`).
//!
//! Backends against real persistence (an embedded KV store, a relational
//! table, Redis) implement [`TaskStore`] and plug in unchanged: the engine
//! serializes every read-modify-write sequence itself, so a backend only has
//! to execute individual calls faithfully.

mod contract;
pub(crate) mod keys;
mod memory;

pub use contract::{StoreError, TaskStore};
pub use memory::MemoryStore;
