//! # SubscriberSet: non-blocking fan-out over subscribers.
//!
//! ```text
//! emit(&Event)
//!     ├──► [queue S1] ──► worker S1 ──► on_event()   panic → SubscriberPanicked
//!     ├──► [queue S2] ──► worker S2 ──► on_event()
//!     └──► [queue SN] ──► worker SN ──► on_event()
//! ```
//!
//! - `emit()` returns immediately (`try_send`).
//! - Per-subscriber FIFO; no ordering across subscribers.
//! - Overflow drops the event for that subscriber only and publishes
//!   `SubscriberOverflow` (never for an overflow event itself).

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::channel::panic_message;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

struct Lane {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Fan-out coordinator for event subscribers.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Spawns one worker per subscriber.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut lanes = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));
            let worker_bus = bus.clone();

            workers.push(tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let handled = AssertUnwindSafe(sub.on_event(&ev)).catch_unwind().await;
                    if let Err(panic) = handled {
                        worker_bus.publish(Event::subscriber_panicked(name, panic_message(&*panic)));
                    }
                }
            }));
            lanes.push(Lane { name, tx });
        }
        Self { lanes, workers, bus }
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    /// True if there are no subscribers.
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    /// Queues `event` for every subscriber without waiting.
    pub fn emit(&self, event: &Event) {
        let event = Arc::new(event.clone());
        let is_overflow = event.kind == EventKind::SubscriberOverflow;

        for lane in &self.lanes {
            let reason = match lane.tx.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if !is_overflow {
                self.bus.publish(Event::subscriber_overflow(lane.name, reason));
            }
        }
    }

    /// Closes every queue and waits for the workers to drain.
    pub async fn shutdown(self) {
        drop(self.lanes);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Subscribe for Recorder {
        async fn on_event(&self, ev: &Event) {
            self.0.lock().push(ev.kind);
        }
        fn name(&self) -> &'static str {
            "recorder"
        }
    }

    struct Panicky;

    #[async_trait]
    impl Subscribe for Panicky {
        async fn on_event(&self, _ev: &Event) {
            panic!("subscriber bug");
        }
        fn name(&self) -> &'static str {
            "panicky"
        }
    }

    #[tokio::test]
    async fn test_fifo_delivery_and_panic_isolation() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let recorder = Arc::new(Recorder::default());
        let set = SubscriberSet::new(vec![recorder.clone(), Arc::new(Panicky)], bus);

        set.emit(&Event::new(EventKind::UnitSpawned));
        set.emit(&Event::new(EventKind::SystemInit));
        set.shutdown().await;

        assert_eq!(*recorder.0.lock(), vec![EventKind::UnitSpawned, EventKind::SystemInit]);
        let ev = rx.recv().await.unwrap();
        assert_eq!(ev.kind, EventKind::SubscriberPanicked);
        assert_eq!(ev.subscriber.as_deref(), Some("panicky"));
        assert_eq!(ev.reason.as_deref(), Some("subscriber bug"));
    }
}
