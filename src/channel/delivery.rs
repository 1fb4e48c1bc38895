//! # Inbound delivery to application handlers.
//!
//! Every unit has one [`Dispatcher`] shared by all its channels. Handlers are
//! registered per event name and invoked synchronously on the channel's
//! reader task, so deliveries on one channel reach the handler in order.
//!
//! A handler receives a [`Delivery`]. Deliveries that originate from a
//! `post` carry a [`Responder`]: a one-shot answer handle. The first
//! `answer` transmits; later calls are no-ops returning `false`.
//!
//! A panicking handler crashes its unit (exit code 1).

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};

use crate::channel::envelope::{Envelope, EnvelopeId, Payload};
use crate::channel::protocol::ChannelInner;
use crate::thread::Scope;
use crate::topology::Addressee;

/// Application handler for one event name.
pub type Handler = Arc<dyn Fn(Delivery) + Send + Sync>;

/// One inbound `send` or `post`, as seen by the application.
pub struct Delivery {
    /// Event name.
    pub event: String,
    /// Application data.
    pub payload: Payload,
    /// Sending unit.
    pub from: Addressee,
    /// Answer handle; present only for `post` deliveries.
    pub responder: Option<Responder>,
}

impl Delivery {
    /// Answers the originating `post`.
    ///
    /// Returns `false` for `send` deliveries or if already answered.
    pub fn answer(&self, payload: Payload) -> bool {
        self.responder
            .as_ref()
            .is_some_and(|responder| responder.answer(payload))
    }

    /// True if the sender expects an answer.
    pub fn is_post(&self) -> bool {
        self.responder.is_some()
    }
}

/// One-shot answer handle for a `post`.
///
/// Cloning shares the same underlying slot: whichever clone answers first wins.
#[derive(Clone)]
pub struct Responder {
    slot: Arc<Mutex<Option<(Weak<ChannelInner>, EnvelopeId)>>>,
}

impl Responder {
    pub(crate) fn new(channel: Weak<ChannelInner>, id: EnvelopeId) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some((channel, id)))),
        }
    }

    /// Transmits the answer. Returns `false` if already used.
    ///
    /// If the channel is gone or inactive the answer is lost and the
    /// requester times out.
    pub fn answer(&self, payload: Payload) -> bool {
        let Some((channel, id)) = self.slot.lock().take() else {
            return false;
        };
        if let Some(channel) = channel.upgrade() {
            channel.reply(Envelope::Answer { id, payload });
        }
        true
    }
}

/// Event name → handler table of one unit.
pub(crate) struct Dispatcher {
    handlers: RwLock<HashMap<String, Handler>>,
    scope: Scope,
}

impl Dispatcher {
    pub(crate) fn new(scope: Scope) -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
            scope,
        }
    }

    /// Registers (or replaces) the handler for `event`.
    pub(crate) fn on(&self, event: String, handler: Handler) {
        self.handlers.write().insert(event, handler);
    }

    pub(crate) fn clear(&self) {
        self.handlers.write().clear();
    }

    pub(crate) fn dispatch(&self, delivery: Delivery) {
        let handler = self.handlers.read().get(&delivery.event).cloned();
        let Some(handler) = handler else {
            tracing::debug!(event = %delivery.event, from = %delivery.from, "no handler registered");
            return;
        };
        let event = delivery.event.clone();
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| handler(delivery))) {
            let info = panic_message(&*panic);
            tracing::error!(%event, %info, "handler panicked; crashing unit");
            self.scope.exit(1);
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
