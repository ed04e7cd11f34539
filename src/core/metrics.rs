//! Metrics aggregation over stored execution records.
//!
//! [`ExecMetrics`] is a point-in-time snapshot computed by scanning every
//! record: total count, per-status counts, mean attempt duration over
//! completed records, and mean retries over all records. The scan is O(n);
//! the record set of one orchestrator instance is bounded by its task group.

use serde::Serialize;

use crate::tasks::{ExecutionRecord, TaskStatus};

/// Point-in-time execution metrics.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ExecMetrics {
    /// Number of records in the store.
    pub total: usize,
    /// Records in `completed`.
    pub completed: usize,
    /// Records in `failed`.
    pub failed: usize,
    /// Records in `pending`.
    pub pending: usize,
    /// Records in `running`.
    pub running: usize,
    /// Records in `rate_limited`.
    pub rate_limited: usize,
    /// Records in `cancelled`.
    pub cancelled: usize,
    /// Mean `result.duration_ms` over completed records.
    pub average_duration_ms: f64,
    /// Mean `retries` over all records.
    pub average_retries: f64,
}

/// Computes metrics from a full record scan.
pub(crate) fn aggregate(records: &[ExecutionRecord]) -> ExecMetrics {
    let mut metrics = ExecMetrics {
        total: records.len(),
        ..ExecMetrics::default()
    };

    let mut completed_duration_sum = 0u64;
    let mut retries_sum = 0u64;

    for record in records {
        match record.status {
            TaskStatus::Pending => metrics.pending += 1,
            TaskStatus::Running => metrics.running += 1,
            TaskStatus::Completed => {
                metrics.completed += 1;
                if let Some(result) = &record.result {
                    completed_duration_sum += result.duration_ms;
                }
            }
            TaskStatus::Failed => metrics.failed += 1,
            TaskStatus::Cancelled => metrics.cancelled += 1,
            TaskStatus::RateLimited => metrics.rate_limited += 1,
        }
        retries_sum += u64::from(record.retries);
    }

    if metrics.completed > 0 {
        metrics.average_duration_ms = completed_duration_sum as f64 / metrics.completed as f64;
    }
    if metrics.total > 0 {
        metrics.average_retries = retries_sum as f64 / metrics.total as f64;
    }
    metrics
}
