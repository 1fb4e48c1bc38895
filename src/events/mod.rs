//! Lifecycle events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `Supervisor` (boot, unit monitors, revival, shutdown) and
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the supervisor's subscriber listener, and any receiver
//!   obtained from `Supervisor::events()`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
