//! # Jitter for revival delays.
//!
//! Spreads revival attempts of units that crashed together, so they do not
//! hit the execution runtime in lockstep.

use std::time::Duration;

use rand::Rng;

/// Randomization of a delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Exact delay.
    #[default]
    None,
    /// Uniform in `[0, delay]`.
    Full,
    /// `delay/2` plus uniform in `[0, delay/2]`.
    Equal,
}

impl JitterPolicy {
    /// Applies the jitter to `delay`.
    pub fn apply(&self, delay: Duration) -> Duration {
        let ms = delay.as_millis().min(u128::from(u64::MAX)) as u64;
        if ms == 0 {
            return delay;
        }
        let mut rng = rand::rng();
        match self {
            JitterPolicy::None => delay,
            JitterPolicy::Full => Duration::from_millis(rng.random_range(0..=ms)),
            JitterPolicy::Equal => {
                let half = ms / 2;
                Duration::from_millis(ms - half + rng.random_range(0..=half))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        let d = Duration::from_millis(200);
        for _ in 0..100 {
            assert!(JitterPolicy::Full.apply(d) <= d);
            let eq = JitterPolicy::Equal.apply(d);
            assert!(eq >= Duration::from_millis(100) && eq <= d);
        }
        assert_eq!(JitterPolicy::None.apply(d), d);
        assert_eq!(JitterPolicy::Full.apply(Duration::ZERO), Duration::ZERO);
    }
}
