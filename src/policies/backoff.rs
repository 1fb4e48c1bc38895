//! # Delay between revival attempts.
//!
//! When one attempt to revive a unit fails (probe timeout, handshake
//! failure, immediate re-crash), the supervisor waits `next(attempt)` before
//! trying again. The base delay grows geometrically from `first` and is
//! capped at `max`; jitter is applied on top of the capped base and never
//! fed back.
//!
//! ```rust
//! use std::time::Duration;
//! use threadvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(50),
//!     max: Duration::from_millis(300),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//! assert_eq!(backoff.next(1), Duration::from_millis(50));
//! assert_eq!(backoff.next(2), Duration::from_millis(100));
//! assert_eq!(backoff.next(5), Duration::from_millis(300));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Geometric backoff with optional jitter.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BackoffPolicy {
    /// Delay after the first failed attempt.
    pub first: Duration,
    /// Upper bound of the base delay.
    pub max: Duration,
    /// Growth factor per attempt (`1.0` keeps the delay constant).
    pub factor: f64,
    /// Randomization applied to the base delay.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// `first = 100ms`, `factor = 2.0`, `max = 2s`, no jitter.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(100),
            max: Duration::from_secs(2),
            factor: 2.0,
            jitter: JitterPolicy::None,
        }
    }
}

impl BackoffPolicy {
    /// Constant delay.
    pub fn constant(delay: Duration) -> Self {
        Self {
            first: delay,
            max: delay,
            factor: 1.0,
            jitter: JitterPolicy::None,
        }
    }

    /// Delay to wait after failed attempt number `attempt` (1-based; `0` is treated as `1`).
    pub fn next(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        let base = if secs.is_finite() && secs >= 0.0 && secs < self.max.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            self.max
        };
        self.jitter.apply(base.min(self.max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(jitter: JitterPolicy) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(100),
            max: Duration::from_secs(1),
            factor: 2.0,
            jitter,
        }
    }

    #[test]
    fn test_growth_then_cap() {
        let p = policy(JitterPolicy::None);
        assert_eq!(p.next(0), Duration::from_millis(100));
        assert_eq!(p.next(1), Duration::from_millis(100));
        assert_eq!(p.next(3), Duration::from_millis(400));
        assert_eq!(p.next(5), Duration::from_secs(1));
        assert_eq!(p.next(u32::MAX), Duration::from_secs(1));
    }

    #[test]
    fn test_first_above_max_is_capped() {
        let p = BackoffPolicy {
            first: Duration::from_secs(5),
            ..policy(JitterPolicy::None)
        };
        assert_eq!(p.next(1), Duration::from_secs(1));
    }

    #[test]
    fn test_constant() {
        let p = BackoffPolicy::constant(Duration::from_millis(30));
        assert!((1..10).all(|n| p.next(n) == Duration::from_millis(30)));
    }

    #[test]
    fn test_equal_jitter_stays_in_upper_half() {
        let p = policy(JitterPolicy::Equal);
        for attempt in 1..8 {
            let base = policy(JitterPolicy::None).next(attempt);
            let delay = p.next(attempt);
            assert!(delay >= base / 2 && delay <= base, "attempt {attempt}: {delay:?} vs {base:?}");
        }
    }
}
