//! Per-peer reliability protocol.
//!
//! This module groups the wire model and the [`Channel`] that runs the
//! delivery protocol over one Port.
//!
//! ## Contents
//! - [`Envelope`], [`EnvelopeId`], [`Payload`] wire model
//! - [`ChannelConfig`], [`SendOptions`], [`PostOptions`], [`SendStatus`] knobs and results
//! - [`Channel`], [`ChannelStatus`], [`ChannelStats`] the protocol endpoint
//! - [`Reply`] future of one `post`
//! - [`Delivery`], [`Responder`] what application handlers receive
//!
//! ## Quick reference
//! ```text
//! send(confirmed)   Active   ─► Send{confirm} ─► retry every delay until Confirm
//!                   Inactive ─► outbox (FIFO) ─► drained on activation
//! send(unconfirmed) Active   ─► Send once;  Inactive ─► dropped
//! post              Active   ─► Post ─► Answer | TimeoutExpired
//!                   Inactive ─► NotActive (never queued)
//! ```

mod delivery;
mod envelope;
mod options;
mod protocol;
mod reply;

pub use delivery::{Delivery, Handler, Responder};
pub use envelope::{Envelope, EnvelopeId, Payload};
pub use options::{ChannelConfig, PostOptions, SendOptions, SendStatus};
pub use protocol::{Channel, ChannelStats, ChannelStatus};
pub use reply::Reply;

pub(crate) use delivery::{Dispatcher, panic_message};
