//! Key-namespace builders for the task store.
//!
//! Every datum the orchestrator persists lives under one of three prefixes:
//! execution records, the idempotency index, and rate-limit windows.

/// Prefix for execution records.
pub(crate) const TASK_PREFIX: &str = "task:";

/// Prefix for the idempotency-key index.
pub(crate) const IDEMPOTENCY_PREFIX: &str = "idempotency:";

/// Prefix for rate-limit window state.
pub(crate) const RATE_LIMIT_PREFIX: &str = "ratelimit:";

/// Key of the execution record for `id`.
pub(crate) fn task(id: &str) -> String {
    format!("{TASK_PREFIX}{id}")
}

/// Key of the idempotency mapping for `key`.
pub(crate) fn idempotency(key: &str) -> String {
    format!("{IDEMPOTENCY_PREFIX}{key}")
}

/// Key of the rate-limit window state for `key`.
pub(crate) fn rate_limit(key: &str) -> String {
    format!("{RATE_LIMIT_PREFIX}{key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespaces_do_not_collide() {
        assert_eq!(task("a"), "task:a");
        assert_eq!(idempotency("a"), "idempotency:a");
        assert_eq!(rate_limit("a"), "ratelimit:a");
        assert!(!task("x").starts_with(IDEMPOTENCY_PREFIX));
    }
}
