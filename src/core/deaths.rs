//! Sliding-window crash-loop detector shared by all units.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

/// Counts recoverable deaths inside a sliding time window.
#[derive(Debug)]
pub(crate) struct DeathWindow {
    threshold: Option<usize>,
    window: Duration,
    deaths: VecDeque<Instant>,
}

impl DeathWindow {
    pub(crate) fn new(threshold: Option<usize>, window: Duration) -> Self {
        Self {
            threshold,
            window,
            deaths: VecDeque::new(),
        }
    }

    /// Records a death at `now`; returns the in-window count once it reaches the threshold.
    pub(crate) fn record(&mut self, now: Instant) -> Option<usize> {
        let threshold = self.threshold?;
        while let Some(&oldest) = self.deaths.front() {
            if now.saturating_duration_since(oldest) >= self.window {
                self.deaths.pop_front();
            } else {
                break;
            }
        }
        self.deaths.push_back(now);
        (self.deaths.len() >= threshold).then_some(self.deaths.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_four_deaths_in_window_trip() {
        let t0 = Instant::now();
        let mut w = DeathWindow::new(Some(4), ms(2000));
        assert_eq!(w.record(t0), None);
        assert_eq!(w.record(t0 + ms(500)), None);
        assert_eq!(w.record(t0 + ms(1000)), None);
        assert_eq!(w.record(t0 + ms(1500)), Some(4));
    }

    #[test]
    fn test_expired_deaths_do_not_count() {
        let t0 = Instant::now();
        let mut w = DeathWindow::new(Some(4), ms(2000));
        assert_eq!(w.record(t0), None);
        assert_eq!(w.record(t0 + ms(100)), None);
        assert_eq!(w.record(t0 + ms(200)), None);
        assert_eq!(w.record(t0 + ms(2300)), None);
    }

    #[test]
    fn test_disabled() {
        let t0 = Instant::now();
        let mut w = DeathWindow::new(None, ms(10));
        assert!((0..10).all(|i| w.record(t0 + ms(i)).is_none()));
    }
}
