//! # Wake-timer loop.
//!
//! The orchestrator owns exactly **one** timer slot. Arming it overwrites
//! any previous target; there is no priority queue of wake times. The
//! engine stays correct anyway because every fire triggers a full re-scan of
//! pending records ([`Orchestrator::on_wake`]), which dispatches everything
//! due and re-arms the slot to the earliest remaining `scheduled_at`.
//!
//! ## Flow
//! ```text
//! settle(failure) ──► store.set_wake_timer(next_retry_at)
//!                 ──► WakeTimer::arm(next_retry_at)   (watch channel)
//!                                 │
//!                                 ▼
//!                     wake loop: sleep until target
//!                                 │ fires
//!                                 ▼
//!                     on_wake(): clear slot ─► scan pending ─► dispatch due
//!                                 └─► re-arm to earliest future scheduled_at
//! ```
//!
//! ## Rules
//! - The latest armed value always wins (watch semantics).
//! - A target already in the past fires immediately.
//! - On startup the persisted slot is recovered, so retries scheduled before
//!   a restart resume.
//! - The loop exits when the orchestrator's runtime token is cancelled.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::time;
use tokio_util::sync::CancellationToken;

use super::engine::Orchestrator;

/// Handle for arming the single wake-timer slot.
pub(crate) struct WakeTimer {
    tx: watch::Sender<Option<DateTime<Utc>>>,
}

impl WakeTimer {
    /// Creates the timer handle and the receiver the wake loop listens on.
    pub(crate) fn new() -> (Self, watch::Receiver<Option<DateTime<Utc>>>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, rx)
    }

    /// Arms the slot to `at`, overwriting any previous target.
    pub(crate) fn arm(&self, at: DateTime<Utc>) {
        let _ = self.tx.send(Some(at));
    }

    /// Clears the slot.
    pub(crate) fn disarm(&self) {
        let _ = self.tx.send(None);
    }
}

/// Spawns the wake loop for `orchestrator`.
///
/// Recovers the persisted wake target first, then sleeps towards whatever
/// the slot currently holds, re-evaluating on every re-arm.
pub(crate) fn spawn_wake_loop(
    orchestrator: Orchestrator,
    mut rx: watch::Receiver<Option<DateTime<Utc>>>,
    token: CancellationToken,
) {
    tokio::spawn(async move {
        match orchestrator.persisted_wake_target().await {
            Ok(Some(at)) => {
                tracing::debug!(wake_at = %at, "recovered persisted wake timer");
                orchestrator.arm_wake_local(at);
            }
            Ok(None) => {}
            Err(err) => {
                tracing::warn!(error = %err, "failed to recover persisted wake timer");
            }
        }

        loop {
            let target = *rx.borrow_and_update();
            match target {
                None => {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        changed = rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
                Some(at) => {
                    let delay = (at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                    tokio::select! {
                        _ = token.cancelled() => break,
                        changed = rx.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                        _ = time::sleep(delay) => {
                            // Clear the slot before scanning; the scan re-arms
                            // if later retries remain.
                            orchestrator.disarm_wake_local();
                            if let Err(err) = orchestrator.on_wake().await {
                                tracing::error!(error = %err, "wake scan failed");
                            }
                        }
                    }
                }
            }
        }
    });
}
