//! Retry policies.
//!
//! This module groups the knobs that control **how long** to wait between
//! execution attempts.
//!
//! ## Contents
//! - [`RetryPolicy`] how retry delays evolve (first / factor / max + jitter)
//!
//! ## Quick wiring
//! ```text
//! ExecConfig { initial_retry_delay, backoff_multiplier, max_retry_delay }
//!      └─► config.retry_policy() ─► core::engine settle path:
//!           - policy.next(record.retries) to schedule the next attempt
//!           - the wake timer is armed to now + delay
//! ```
//!
//! ## Defaults
//! Derived from [`ExecConfig::default`](crate::ExecConfig::default):
//! first=1s, factor=2.0, max=60s. Jitter is fixed at 0–25% additive.

mod backoff;

pub use backoff::RetryPolicy;
