//! # Lifecycle events emitted by the supervisor.
//!
//! The [`EventKind`] enum classifies events into four groups:
//! - **Subscriber events**: fan-out problems (overflow, panic)
//! - **Boot events**: units spawned, online, system running
//! - **Failure events**: unit exits, revival progress, fatal lifecycle errors
//! - **Shutdown events**: terminate requested, timed out, all stopped
//!
//! The [`Event`] struct carries the affected unit and optional metadata
//! (exit code, attempt, death count, delay, reason).
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use threadvisor::{Addressee, Event, EventKind};
//!
//! let ev = Event::new(EventKind::ReviveAttemptFailed)
//!     .with_unit(Addressee::new("worker", 2))
//!     .with_attempt(1)
//!     .with_delay(Duration::from_millis(100))
//!     .with_reason("probe timed out");
//!
//! assert_eq!(ev.kind, EventKind::ReviveAttemptFailed);
//! assert_eq!(ev.unit, Some(Addressee::new("worker", 2)));
//! assert_eq!(ev.delay_ms, Some(100));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::topology::Addressee;

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of lifecycle events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets: `subscriber`, `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets: `subscriber`, `reason` ("full" or "closed").
    SubscriberOverflow,

    // === Boot events ===
    /// A unit incarnation was handed to the execution runtime.
    ///
    /// Sets: `unit`, `deaths`.
    UnitSpawned,

    /// The runtime reported the unit as created.
    ///
    /// Sets: `unit`.
    UnitOnline,

    /// The unit's entry failed or panicked (an exit follows).
    ///
    /// Sets: `unit`, `reason`.
    UnitError,

    /// Every unit passed its probe and handshakes; the system is running.
    SystemInit,

    // === Failure events ===
    /// A unit crashed after the system started running.
    ///
    /// Sets: `unit`, `code`, `deaths` (including this one).
    ThreadExit,

    /// A unit died before the system started running (fatal).
    ///
    /// Sets: `unit`, `code`, `reason`.
    DeathBeforeInitialization,

    /// Revival of a dead unit started.
    ///
    /// Sets: `unit`, `deaths`.
    ReviveStarted,

    /// One revival attempt failed; another follows after `delay_ms`.
    ///
    /// Sets: `unit`, `attempt`, `delay_ms`, `reason`.
    ReviveAttemptFailed,

    /// The unit was revived and re-wired.
    ///
    /// Sets: `unit`, `attempt`, `deaths`.
    Revived,

    /// Every revival attempt failed (fatal).
    ///
    /// Sets: `unit`, `attempt`, `reason`.
    FailedRevive,

    /// Too many deaths inside the death window (fatal).
    ///
    /// Sets: `unit` (the last to die), `deaths` (count in window), `reason`.
    ExceededDeathsCount,

    /// A start-sequence step failed (fatal).
    ///
    /// Sets: `unit`, `reason`.
    StartFailed,

    // === Shutdown events ===
    /// Shutdown requested (OS signal or `terminate_all`).
    ShutdownRequested,

    /// A unit exited cleanly (terminate code or during shutdown).
    ///
    /// Sets: `unit`, `code`.
    UnitStopped,

    /// A unit did not answer its terminate request in time and was killed.
    ///
    /// Sets: `unit`, `delay_ms` (the grace that expired).
    TerminateTimedOut,

    /// All units were stopped.
    AllStopped,
}

/// Lifecycle event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Affected unit, if any.
    pub unit: Option<Addressee>,
    /// Subscriber name (subscriber events only).
    pub subscriber: Option<Arc<str>>,
    /// Exit code.
    pub code: Option<i32>,
    /// Revival attempt (1-based).
    pub attempt: Option<u32>,
    /// Death count.
    pub deaths: Option<u32>,
    /// Delay in milliseconds (compact).
    pub delay_ms: Option<u32>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates an event of the given kind with the current timestamp and the next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            unit: None,
            subscriber: None,
            code: None,
            attempt: None,
            deaths: None,
            delay_ms: None,
            reason: None,
        }
    }

    #[inline]
    pub fn with_unit(mut self, unit: Addressee) -> Self {
        self.unit = Some(unit);
        self
    }

    #[inline]
    pub fn with_code(mut self, code: i32) -> Self {
        self.code = Some(code);
        self
    }

    #[inline]
    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    #[inline]
    pub fn with_deaths(mut self, deaths: u32) -> Self {
        self.deaths = Some(deaths);
        self
    }

    /// Attaches a delay (stored as milliseconds, saturating).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.delay_ms = Some(ms);
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub(crate) fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        let mut ev = Event::new(EventKind::SubscriberOverflow).with_reason(reason);
        ev.subscriber = Some(Arc::from(subscriber));
        ev
    }

    pub(crate) fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        let mut ev = Event::new(EventKind::SubscriberPanicked).with_reason(info);
        ev.subscriber = Some(Arc::from(subscriber));
        ev
    }

    /// True for the three fatal lifecycle kinds and a failed start.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            EventKind::DeathBeforeInitialization
                | EventKind::FailedRevive
                | EventKind::ExceededDeathsCount
                | EventKind::StartFailed
        )
    }
}
