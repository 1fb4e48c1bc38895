//! # Event bus for lifecycle events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`]: the supervisor, its unit monitors
//! and the revival loop publish; the supervisor's listener forwards every
//! event to the [`SubscriberSet`](crate::SubscriberSet).
//!
//! ```text
//!   boot sequence ──┐
//!   unit monitors ──┼──► Bus ──► subscriber listener ──► SubscriberSet
//!   revival loop  ──┤
//!   terminate_all ──┘
//! ```
//!
//! ## Rules
//! - `publish()` never blocks.
//! - Slow receivers observe `RecvError::Lagged(n)` and skip the `n` oldest events.
//! - Events published while nobody listens are lost.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for lifecycle events. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus; capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel::<Event>(capacity.max(1));
        Self { tx }
    }

    /// Publishes `ev` to every current receiver.
    pub fn publish(&self, ev: Event) {
        tracing::trace!(kind = ?ev.kind, seq = ev.seq, "event");
        let _ = self.tx.send(ev);
    }

    /// New receiver observing events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[tokio::test]
    async fn test_publish_reaches_receivers() {
        let bus = Bus::new(0);
        let mut rx = bus.subscribe();
        bus.publish(Event::new(EventKind::SystemInit));
        assert_eq!(rx.recv().await.unwrap().kind, EventKind::SystemInit);
    }
}
