//! Error types used by the threadvisor runtime, its channels and unit entry points.
//!
//! This module defines the error enums:
//!
//! - [`ChannelError`] per-operation failures returned to the immediate caller
//!   (`send`/`post`/routing); they never crash the system.
//! - [`RuntimeError`] lifecycle failures raised by the supervisor. The fatal
//!   ones are published on the event bus and returned from
//!   [`Supervisor::wait_fatal`](crate::Supervisor::wait_fatal).
//! - [`UnitError`] errors returned by a unit entry point; they become the
//!   unit's exit code.
//! - [`TopologyError`] / [`ConfigError`] declaration and configuration errors.
//!
//! All types provide `as_label` (stable snake_case) for logs and metrics.

use std::time::Duration;

use thiserror::Error;

use crate::topology::Addressee;

/// # Errors returned by channel operations and recipient selection.
///
/// These are caller-recoverable (or programming errors in the case of
/// unknown pools/instances) and are never escalated by the runtime.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// A `post` was attempted while the channel to `peer` was inactive.
    #[error("channel to {peer} is not active")]
    NotActive {
        /// Remote unit of the channel.
        peer: Addressee,
    },

    /// A `post` or handshake did not receive its answer in time.
    #[error("no answer from {peer} within {timeout:?}")]
    TimeoutExpired {
        /// Remote unit of the channel.
        peer: Addressee,
        /// The deadline that expired.
        timeout: Duration,
    },

    /// The selector referenced an instance that does not exist in the pool.
    #[error("thread {pool}#{number} does not exist")]
    ThreadNotExists {
        /// Pool name.
        pool: String,
        /// Requested instance number.
        number: u32,
    },

    /// The selector referenced an unknown pool.
    #[error("thread pool {pool:?} does not exist")]
    ThreadPoolNotExists {
        /// Requested pool name.
        pool: String,
    },

    /// The channel was destroyed while the operation was pending.
    #[error("channel to {peer} was destroyed")]
    Destroyed {
        /// Remote unit of the channel.
        peer: Addressee,
    },
}

impl ChannelError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use threadvisor::{Addressee, ChannelError};
    ///
    /// let err = ChannelError::NotActive { peer: Addressee::new("db", 1) };
    /// assert_eq!(err.as_label(), "channel_not_active");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            ChannelError::NotActive { .. } => "channel_not_active",
            ChannelError::TimeoutExpired { .. } => "channel_timeout_expired",
            ChannelError::ThreadNotExists { .. } => "thread_not_exists",
            ChannelError::ThreadPoolNotExists { .. } => "thread_pool_not_exists",
            ChannelError::Destroyed { .. } => "channel_destroyed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }

    /// True if retrying the same operation later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ChannelError::NotActive { .. } | ChannelError::TimeoutExpired { .. }
        )
    }
}

/// # Errors produced by the supervisor lifecycle.
///
/// `DeathBeforeInitialization`, `FailedRevive`, `ExceededDeathsCount` and
/// `StartTimeout` are fatal: the runtime does not recover from them.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// Supervisor configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// Topology declaration failed validation.
    #[error("invalid topology: {0}")]
    InvalidTopology(#[from] TopologyError),

    /// The supervisor was started twice.
    #[error("supervisor already started")]
    AlreadyStarted,

    /// A unit did not answer the liveness probe within the start timeout.
    #[error("unit {unit} did not come online within {timeout:?}")]
    StartTimeout {
        /// Unit that failed to start.
        unit: Addressee,
        /// Configured start timeout.
        timeout: Duration,
    },

    /// A unit died before the whole topology reached "running".
    #[error("unit {unit} died before initialization (exit code {code})")]
    DeathBeforeInitialization {
        /// Unit that died.
        unit: Addressee,
        /// Its exit code.
        code: i32,
    },

    /// Revival attempts for a unit were exhausted.
    #[error("failed to revive {unit} after {attempts} attempts")]
    FailedRevive {
        /// Unit that could not be revived.
        unit: Addressee,
        /// Number of attempts made.
        attempts: u32,
    },

    /// Too many recoverable deaths inside the sliding window.
    #[error("{total} deaths within {window:?} (last: {unit}, {deaths} deaths)")]
    ExceededDeathsCount {
        /// Unit whose death crossed the threshold.
        unit: Addressee,
        /// That unit's own death counter.
        deaths: u32,
        /// Deaths counted inside the window.
        total: usize,
        /// Configured window.
        window: Duration,
    },

    /// A control request to a unit was not answered in time.
    #[error("{request} request to {unit} timed out after {timeout:?}")]
    ControlTimeout {
        /// Target unit.
        unit: Addressee,
        /// Control request kind.
        request: &'static str,
        /// Deadline that expired.
        timeout: Duration,
    },

    /// The unit's control endpoint is gone (the unit exited).
    #[error("unit {unit} is unavailable")]
    UnitUnavailable {
        /// Target unit.
        unit: Addressee,
    },

    /// A unit failed its channel handshakes.
    #[error("handshake of {unit} failed: {source}")]
    Handshake {
        /// Unit whose handshake failed.
        unit: Addressee,
        /// Underlying channel error.
        source: ChannelError,
    },
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use threadvisor::{Addressee, RuntimeError};
    ///
    /// let err = RuntimeError::FailedRevive { unit: Addressee::new("db", 1), attempts: 4 };
    /// assert_eq!(err.as_label(), "runtime_failed_revive");
    /// assert!(err.is_fatal());
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::InvalidConfig(_) => "runtime_invalid_config",
            RuntimeError::InvalidTopology(_) => "runtime_invalid_topology",
            RuntimeError::AlreadyStarted => "runtime_already_started",
            RuntimeError::StartTimeout { .. } => "runtime_start_timeout",
            RuntimeError::DeathBeforeInitialization { .. } => "runtime_death_before_init",
            RuntimeError::FailedRevive { .. } => "runtime_failed_revive",
            RuntimeError::ExceededDeathsCount { .. } => "runtime_exceeded_deaths",
            RuntimeError::ControlTimeout { .. } => "runtime_control_timeout",
            RuntimeError::UnitUnavailable { .. } => "runtime_unit_unavailable",
            RuntimeError::Handshake { .. } => "runtime_handshake_failed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        self.to_string()
    }

    /// True for lifecycle errors the runtime never recovers from.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RuntimeError::StartTimeout { .. }
                | RuntimeError::DeathBeforeInitialization { .. }
                | RuntimeError::FailedRevive { .. }
                | RuntimeError::ExceededDeathsCount { .. }
        )
    }
}

/// # Errors returned by a unit entry point.
///
/// The error decides the unit's exit code, and the exit code decides how
/// the supervisor classifies the exit (graceful stop vs. crash).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum UnitError {
    /// Exit with an explicit code.
    #[error("exit with code {code}")]
    Exit {
        /// Exit code reported to the supervisor.
        code: i32,
    },

    /// Execution failed.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// A channel operation failed and the entry propagated it.
    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl UnitError {
    /// Shorthand for [`UnitError::Fail`].
    pub fn fail(error: impl Into<String>) -> Self {
        UnitError::Fail {
            error: error.into(),
        }
    }

    /// Exit code this error maps to (`Exit` keeps its code, everything else is `1`).
    pub fn exit_code(&self) -> i32 {
        match self {
            UnitError::Exit { code } => *code,
            UnitError::Fail { .. } | UnitError::Channel(_) => 1,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            UnitError::Exit { .. } => "unit_exit",
            UnitError::Fail { .. } => "unit_failed",
            UnitError::Channel(_) => "unit_channel_error",
        }
    }
}

/// # Topology declaration errors.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TopologyError {
    /// No group declared.
    #[error("topology declares no groups")]
    Empty,

    /// A group has an empty name.
    #[error("group name must not be empty")]
    EmptyName,

    /// A group uses the name reserved for the supervisor endpoint.
    #[error("group name {name:?} is reserved")]
    ReservedName {
        /// Offending name.
        name: String,
    },

    /// The same group name is declared twice.
    #[error("group {name:?} declared twice")]
    Duplicate {
        /// Offending name.
        name: String,
    },

    /// A group declares zero instances.
    #[error("group {name:?} must have at least one instance")]
    NoInstances {
        /// Offending name.
        name: String,
    },
}

/// # Configuration validation errors.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A duration that must be positive is zero.
    #[error("{field} must be greater than zero")]
    ZeroDuration {
        /// Field name.
        field: &'static str,
    },

    /// A counter that must be positive is zero.
    #[error("{field} must be at least 1")]
    ZeroCount {
        /// Field name.
        field: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_error_exit_codes() {
        assert_eq!(UnitError::Exit { code: 7 }.exit_code(), 7);
        assert_eq!(UnitError::fail("boom").exit_code(), 1);

        let peer = Addressee::new("b", 1);
        let err: UnitError = ChannelError::NotActive { peer }.into();
        assert_eq!(err.exit_code(), 1);
        assert_eq!(err.as_label(), "unit_channel_error");
    }

    #[test]
    fn test_fatal_classification() {
        let unit = Addressee::new("a", 1);
        assert!(
            RuntimeError::DeathBeforeInitialization {
                unit: unit.clone(),
                code: 1
            }
            .is_fatal()
        );
        assert!(!RuntimeError::UnitUnavailable { unit }.is_fatal());
        assert!(!RuntimeError::AlreadyStarted.is_fatal());
    }

    #[test]
    fn test_retryable_channel_errors() {
        let peer = Addressee::new("b", 2);
        assert!(ChannelError::NotActive { peer: peer.clone() }.is_retryable());
        assert!(
            !ChannelError::ThreadNotExists {
                pool: "b".into(),
                number: 9
            }
            .is_retryable()
        );
        assert_eq!(
            ChannelError::ThreadNotExists {
                pool: "b".into(),
                number: 9
            }
            .to_string(),
            "thread b#9 does not exist"
        );
    }
}
