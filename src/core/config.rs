//! # Supervisor configuration.
//!
//! [`SupervisorConfig`] carries every knob of one supervisor instance: the
//! graceful-exit sentinel, start and control deadlines, revival bounds, the
//! crash-loop window and the channel defaults handed to every unit.
//!
//! ## Sentinel values
//! - `death_threshold = 0` → crash-loop detection disabled
//! - `bus_capacity = 0` → clamped to 1

use std::time::Duration;

use crate::channel::ChannelConfig;
use crate::error::ConfigError;
use crate::policies::BackoffPolicy;

/// Configuration of one supervisor.
///
/// ## Field semantics
/// - `terminate_code`: exit code meaning "stopped on request", never a crash
/// - `start_timeout`: bound on spawn + liveness probe, at boot and per revival attempt
/// - `control_timeout`: bound on channel updates and on the Init go-ahead (added to `channel.init_timeout`)
/// - `max_revive_attempts`: revival attempts per death before `FailedRevive`
/// - `death_threshold` / `death_window`: crash-loop detection across all units
/// - `revive_backoff`: wait between failed revival attempts
/// - `grace`: default deadline for units to answer a terminate request
#[derive(Clone, Debug)]
pub struct SupervisorConfig {
    /// Exit code of a graceful stop.
    pub terminate_code: i32,
    /// Deadline for a unit to come online.
    pub start_timeout: Duration,
    /// Deadline for out-of-band control requests.
    pub control_timeout: Duration,
    /// Revival attempts per death (at least 1).
    pub max_revive_attempts: u32,
    /// Deaths inside `death_window` that count as a crash loop (`0` = off).
    pub death_threshold: usize,
    /// Sliding window for crash-loop detection.
    pub death_window: Duration,
    /// Delay between failed revival attempts.
    pub revive_backoff: BackoffPolicy,
    /// Terminate deadline used by `run()`.
    pub grace: Duration,
    /// Event bus ring buffer size.
    pub bus_capacity: usize,
    /// Channel defaults for every unit.
    pub channel: ChannelConfig,
}

impl SupervisorConfig {
    /// Checks deadlines and counters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration { field: "start_timeout" });
        }
        if self.control_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "control_timeout",
            });
        }
        if self.max_revive_attempts == 0 {
            return Err(ConfigError::ZeroCount {
                field: "max_revive_attempts",
            });
        }
        if self.death_threshold > 0 && self.death_window.is_zero() {
            return Err(ConfigError::ZeroDuration { field: "death_window" });
        }
        self.channel.validate()
    }

    /// Crash-loop threshold as an `Option` (`None` when disabled).
    #[inline]
    pub fn death_limit(&self) -> Option<usize> {
        if self.death_threshold == 0 {
            None
        } else {
            Some(self.death_threshold)
        }
    }

    /// Bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Deadline for the Init go-ahead: handshake deadline plus control slack.
    #[inline]
    pub(crate) fn init_deadline(&self) -> Duration {
        self.channel.init_timeout + self.control_timeout
    }
}

impl Default for SupervisorConfig {
    /// - `terminate_code = 1984`
    /// - `start_timeout = 4s`, `control_timeout = 1s`
    /// - `max_revive_attempts = 4`
    /// - `death_threshold = 4` within `death_window = 2s`
    /// - `revive_backoff = BackoffPolicy::default()`
    /// - `grace = 1s`, `bus_capacity = 1024`
    /// - `channel = ChannelConfig::default()`
    fn default() -> Self {
        Self {
            terminate_code: 1984,
            start_timeout: Duration::from_secs(4),
            control_timeout: Duration::from_secs(1),
            max_revive_attempts: 4,
            death_threshold: 4,
            death_window: Duration::from_secs(2),
            revive_backoff: BackoffPolicy::default(),
            grace: Duration::from_secs(1),
            bus_capacity: 1024,
            channel: ChannelConfig::default(),
        }
    }
}
