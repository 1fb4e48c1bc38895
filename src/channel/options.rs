//! # Channel configuration and per-call options.
//!
//! [`ChannelConfig`] holds the per-channel defaults; [`SendOptions`] and
//! [`PostOptions`] override them for a single call.
//!
//! ## Sentinel values
//! - `SendOptions::retry_delay = Some(0s)` → unconfirmed send (no retry, dropped while inactive)
//! - `ChannelConfig::ready_window = 0s` → no receiver-side deduplication

use std::time::Duration;

use crate::error::ConfigError;

/// Per-channel timing defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Default delay between retransmissions of an unconfirmed send.
    pub send_retry: Duration,
    /// Default deadline for a `post` answer.
    pub post_timeout: Duration,
    /// How long a delivered send id is remembered for duplicate suppression.
    pub ready_window: Duration,
    /// Deadline for the Init handshake answer.
    pub init_timeout: Duration,
}

impl ChannelConfig {
    /// Checks that the deadlines are usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.post_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "channel.post_timeout",
            });
        }
        if self.init_timeout.is_zero() {
            return Err(ConfigError::ZeroDuration {
                field: "channel.init_timeout",
            });
        }
        Ok(())
    }

    /// Dedup window as an `Option` (`None` when disabled).
    #[inline]
    pub fn dedup_window(&self) -> Option<Duration> {
        if self.ready_window.is_zero() {
            None
        } else {
            Some(self.ready_window)
        }
    }
}

impl Default for ChannelConfig {
    /// - `send_retry = 200ms`
    /// - `post_timeout = 200ms`
    /// - `ready_window = 400ms`
    /// - `init_timeout = 1s`
    fn default() -> Self {
        Self {
            send_retry: Duration::from_millis(200),
            post_timeout: Duration::from_millis(200),
            ready_window: Duration::from_millis(400),
            init_timeout: Duration::from_secs(1),
        }
    }
}

/// Options for a single `send`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Retry delay; `None` uses [`ChannelConfig::send_retry`], zero disables confirmation.
    pub retry_delay: Option<Duration>,
    /// How long the receiver suppresses duplicates of this send; `None` uses
    /// the receiver's [`ChannelConfig::ready_window`], zero disables suppression.
    pub confirm_duration: Option<Duration>,
}

impl SendOptions {
    /// Confirmed send retried every `delay`.
    pub fn retry(delay: Duration) -> Self {
        Self {
            retry_delay: Some(delay),
            ..Self::default()
        }
    }

    /// Unconfirmed send: transmitted once if the channel is active, dropped otherwise.
    pub fn unconfirmed() -> Self {
        Self {
            retry_delay: Some(Duration::ZERO),
            ..Self::default()
        }
    }

    /// Overrides the receiver's duplicate window for this send.
    pub fn confirm_duration(mut self, window: Duration) -> Self {
        self.confirm_duration = Some(window);
        self
    }
}

/// Options for a single `post`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PostOptions {
    /// Answer deadline; `None` uses [`ChannelConfig::post_timeout`].
    pub timeout: Option<Duration>,
}

impl PostOptions {
    /// Post with an explicit deadline.
    pub fn timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }
}

/// Immediate result of a `send`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SendStatus {
    /// Transmitted on an active channel (confirmation may still be pending).
    Delivered,
    /// Stored in the outbox until the channel becomes active.
    Queued,
    /// Discarded: unconfirmed send to an inactive or destroyed channel.
    Dropped,
}
