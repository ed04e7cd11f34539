//! # Backoff policy for retrying failed executions.
//!
//! [`RetryPolicy`] controls how retry delays grow after repeated failures.
//! It is parameterized by:
//! - [`RetryPolicy::first`] the initial delay;
//! - [`RetryPolicy::factor`] the multiplicative growth factor;
//! - [`RetryPolicy::max`] the maximum delay cap.
//!
//! The base delay for retry `k` is `first × factor^k`, clamped to `max`.
//! Jitter then adds a random 0–25% on top of the base. It is only ever
//! added, never subtracted, so the jittered delay for retry `k` always lies
//! in `[base, base × 1.25]`. Because the base is derived purely from the
//! retry count, jitter output never feeds back into subsequent calculations.
//!
//! # Example
//! ```
//! use std::time::Duration;
//! use taskdock::RetryPolicy;
//!
//! let policy = RetryPolicy {
//!     first: Duration::from_millis(100),
//!     max: Duration::from_secs(10),
//!     factor: 2.0,
//! };
//!
//! // Retry 0 — uses `first` (100ms)
//! assert_eq!(policy.base(0), Duration::from_millis(100));
//!
//! // Retry 1 — first × factor^1 = 200ms
//! assert_eq!(policy.base(1), Duration::from_millis(200));
//!
//! // Retry 10 — 100ms × 2^10 = 102_400ms → capped at max=10s
//! assert_eq!(policy.base(10), Duration::from_secs(10));
//! ```

use std::time::Duration;

use rand::Rng;

/// Retry backoff policy.
///
/// Encapsulates parameters that determine how retry delays grow:
/// - [`RetryPolicy::first`] — the initial delay;
/// - [`RetryPolicy::factor`] — multiplicative growth factor;
/// - [`RetryPolicy::max`] — the maximum delay cap.
#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    /// Initial delay before the first retry.
    pub first: Duration,
    /// Maximum delay cap (applied before jitter).
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
}

impl RetryPolicy {
    /// Computes the un-jittered base delay for the given retry count
    /// (0-indexed: the first retry uses `first`).
    ///
    /// The base is `first × factor^retries`, clamped to [`RetryPolicy::max`].
    /// Non-finite or overflowing intermediate values clamp to `max`.
    pub fn base(&self, retries: u32) -> Duration {
        let max_secs = self.max.as_secs_f64();
        let exp = retries.min(i32::MAX as u32) as i32;
        let unclamped_secs = self.first.as_secs_f64() * self.factor.powi(exp);

        if !unclamped_secs.is_finite() || unclamped_secs < 0.0 || unclamped_secs > max_secs {
            self.max
        } else {
            Duration::from_secs_f64(unclamped_secs)
        }
    }

    /// Computes the jittered delay for the given retry count.
    ///
    /// Adds a random 0–25% of the base on top of it. The result lies in
    /// `[base(retries), base(retries) × 1.25]`.
    pub fn next(&self, retries: u32) -> Duration {
        let base = self.base(retries);
        let mut rng = rand::rng();
        base + base.mul_f64(0.25 * rng.random::<f64>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn policy_ms(first: u64, max: u64, factor: f64) -> RetryPolicy {
        RetryPolicy {
            first: Duration::from_millis(first),
            max: Duration::from_millis(max),
            factor,
        }
    }

    #[test]
    fn test_retry_zero_returns_first() {
        let policy = policy_ms(100, 30_000, 2.0);
        assert_eq!(policy.base(0), Duration::from_millis(100));
    }

    #[test]
    fn test_exponential_growth() {
        let policy = policy_ms(100, 30_000, 2.0);
        assert_eq!(policy.base(0), Duration::from_millis(100));
        assert_eq!(policy.base(1), Duration::from_millis(200));
        assert_eq!(policy.base(2), Duration::from_millis(400));
        assert_eq!(policy.base(3), Duration::from_millis(800));
        assert_eq!(policy.base(4), Duration::from_millis(1600));
    }

    #[test]
    fn test_constant_factor() {
        let policy = policy_ms(500, 30_000, 1.0);
        for retries in 0..10 {
            assert_eq!(
                policy.base(retries),
                Duration::from_millis(500),
                "retry {} should stay constant at 500ms",
                retries
            );
        }
    }

    #[test]
    fn test_clamped_to_max() {
        let policy = policy_ms(100, 1000, 2.0);
        assert_eq!(policy.base(10), Duration::from_millis(1000));
    }

    #[test]
    fn test_first_exceeds_max() {
        let policy = policy_ms(10_000, 5000, 2.0);
        assert_eq!(policy.base(0), Duration::from_millis(5000));
    }

    #[test]
    fn test_huge_retry_count_clamps_to_max() {
        let policy = policy_ms(100, 60_000, 2.0);
        assert_eq!(policy.base(100), Duration::from_millis(60_000));
        assert_eq!(policy.base(u32::MAX), Duration::from_millis(60_000));
    }

    #[test]
    fn test_jitter_is_additive_only() {
        let policy = policy_ms(100, 30_000, 2.0);
        for retries in 0..10 {
            let base = policy.base(retries);
            let delay = policy.next(retries);
            assert!(
                delay >= base,
                "retry {}: jittered {:?} below base {:?}",
                retries,
                delay,
                base
            );
            assert!(
                delay <= base.mul_f64(1.25),
                "retry {}: jittered {:?} above base × 1.25",
                retries,
                delay
            );
        }
    }

    proptest! {
        // Pins the spec bound: delay for retry k lies within
        // [first × factor^k, first × factor^k × 1.25], capped at max.
        #[test]
        fn prop_jitter_within_bounds(
            first in 1u64..5000,
            max in 1u64..120_000,
            factor in 1.0f64..4.0,
            retries in 0u32..32,
        ) {
            let policy = policy_ms(first, max, factor);
            let base = policy.base(retries);
            let delay = policy.next(retries);
            prop_assert!(base <= policy.max);
            prop_assert!(delay >= base);
            prop_assert!(delay <= base.mul_f64(1.25) + Duration::from_nanos(1));
        }
    }
}
