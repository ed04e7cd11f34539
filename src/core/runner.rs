//! # Run a single handler attempt.
//!
//! Executes one attempt of a task handler with an optional timeout bound.
//!
//! - **Timeout race**: whichever of (handler resolves) or (timer fires)
//!   completes first wins; on timeout the handler future is dropped and the
//!   attempt reports [`ExecError::Timeout`], whose message contains the
//!   substring `timeout`.
//! - **Panic capture**: a panicking handler is contained and reported as an
//!   ordinary retryable [`ExecError::Handler`] failure.
//!
//! ## Rules
//! - A timed-out attempt is treated exactly like a thrown handler error for
//!   retry purposes.
//! - `timeout = None` means the handler runs unbounded.

use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use serde_json::Value;
use tokio::time;

use crate::error::ExecError;
use crate::tasks::HandlerRef;

/// Executes a single attempt of `handler` against `input`.
pub(crate) async fn run_once(
    handler: &HandlerRef,
    input: Value,
    timeout: Option<Duration>,
) -> Result<Value, ExecError> {
    let attempt = AssertUnwindSafe(handler.invoke(input)).catch_unwind();

    let outcome = match timeout {
        Some(dur) => match time::timeout(dur, attempt).await {
            Ok(res) => res,
            Err(_elapsed) => return Err(ExecError::Timeout { timeout: dur }),
        },
        None => attempt.await,
    };

    match outcome {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(err)) => Err(ExecError::Handler {
            error: err.message,
            stack: err.stack,
        }),
        Err(panic) => Err(ExecError::Handler {
            error: panic_message(panic),
            stack: None,
        }),
    }
}

/// Best-effort extraction of a panic payload message.
fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}
