//! # Lifecycle event subscribers.
//!
//! ```text
//! Supervisor ── publish(Event) ──► Bus ──► listener ──► SubscriberSet
//!                                                        ├──► LogWriter
//!                                                        └──► custom Subscribe impls
//! ```
//!
//! - [`Subscribe`] the extension trait
//! - [`SubscriberSet`] bounded per-subscriber queues with panic isolation
//! - `LogWriter` (feature `logging`) renders events through `tracing`

#[cfg(feature = "logging")]
mod log;
mod set;
mod subscribe;

#[cfg(feature = "logging")]
pub use log::LogWriter;
pub use set::SubscriberSet;
pub use subscribe::Subscribe;
