//! # Event subscriber trait.
//!
//! [`Subscribe`] is the extension point for observing supervisor lifecycle
//! events (spawns, crashes, revivals, shutdown).
//!
//! Each subscriber gets a dedicated worker task fed by a bounded queue
//! ([`Subscribe::queue_capacity`]). A slow subscriber only affects its own
//! queue; on overflow the event is dropped for that subscriber and
//! `EventKind::SubscriberOverflow` is published. Panics are caught and
//! published as `EventKind::SubscriberPanicked`.
//!
//! ## Example
//! ```rust
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use async_trait::async_trait;
//! use threadvisor::{Event, EventKind, Subscribe};
//!
//! #[derive(Default)]
//! struct CrashCounter(AtomicU32);
//!
//! #[async_trait]
//! impl Subscribe for CrashCounter {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::ThreadExit {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "crash-counter" }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Lifecycle event subscriber.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Processes one event. Called sequentially from the subscriber's worker.
    async fn on_event(&self, event: &Event);

    /// Name used in overflow/panic events. Defaults to the type name.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Preferred queue capacity (clamped to at least 1). Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
