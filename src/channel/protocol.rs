//! # Channel: reliability protocol over one Port.
//!
//! A [`Channel`] pairs the local unit with one remote unit. It owns the
//! replaceable Port sender, the reader task for the inbound side, and four
//! pieces of protocol state:
//!
//! ```text
//! outbox            confirmed sends waiting for the channel to become Active (FIFO)
//! awaiting_confirm  id → retry timer, sends transmitted but not yet confirmed (send order)
//! awaiting_answer   id → (resolver, timeout timer), posts and Init handshakes
//! delivered         id → expiry timer, inbound send ids already handed to the application
//! ```
//!
//! ## State machine
//! ```text
//!             Init received / Init answered
//!   Inactive ───────────────────────────────► Active
//!      ▲                                        │
//!      └──────── port closed / set_port ────────┘
//! ```
//! On becoming Active the outbox is drained through the normal send path.
//! On losing the Port, in-flight sends move back to the *front* of the
//! outbox (original order, same ids) so they are retransmitted after the next
//! handshake. Pending answers survive and resolve by answer or timeout.
//!
//! ## Rules
//! - The state lock is never held while application handlers run.
//! - Every timer is a task in the unit's scope holding a `Weak` reference:
//!   a destroyed or dropped channel leaks no timers.
//! - Receiver confirms every flagged send, duplicates included; duplicates
//!   inside the ready window (or the send's own `window_ms`) are not
//!   delivered again.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Duration;

use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::AbortHandle;

use crate::channel::delivery::{Delivery, Dispatcher, Responder};
use crate::channel::envelope::{Envelope, EnvelopeId, Payload};
use crate::channel::options::{ChannelConfig, PostOptions, SendOptions, SendStatus};
use crate::channel::reply::{AnswerTx, Reply};
use crate::error::ChannelError;
use crate::port::PortEnd;
use crate::thread::Scope;
use crate::topology::Addressee;

/// Reachability of the remote unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelStatus {
    /// No handshake on the current Port yet (or the Port closed).
    Inactive,
    /// Handshake completed; sends and posts are transmitted immediately.
    Active,
}

/// Snapshot of a channel's queue sizes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ChannelStats {
    /// Sends waiting in the outbox.
    pub queued: usize,
    /// Transmitted sends without a confirm yet.
    pub awaiting_confirm: usize,
    /// Posts and handshakes without an answer yet.
    pub awaiting_answer: usize,
    /// Inbound send ids inside the dedup window.
    pub recently_delivered: usize,
}

struct Outgoing {
    id: EnvelopeId,
    event: String,
    payload: Payload,
    retry: Duration,
    window: Option<Duration>,
}

impl Outgoing {
    fn confirmed(&self) -> bool {
        !self.retry.is_zero()
    }

    fn envelope(&self) -> Envelope {
        Envelope::Send {
            id: self.id,
            event: self.event.clone(),
            payload: self.payload.clone(),
            confirm: self.confirmed(),
            window_ms: self.window.map(|w| u64::try_from(w.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

struct InFlight {
    out: Outgoing,
    timer: Option<AbortHandle>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Awaiting {
    Handshake,
    Request,
}

struct Waiter {
    kind: Awaiting,
    tx: AnswerTx,
    timer: AbortHandle,
}

struct ChannelState {
    status: ChannelStatus,
    port: Option<mpsc::UnboundedSender<Envelope>>,
    reader: Option<AbortHandle>,
    epoch: u64,
    outbox: VecDeque<Outgoing>,
    awaiting_confirm: IndexMap<EnvelopeId, InFlight>,
    awaiting_answer: HashMap<EnvelopeId, Waiter>,
    delivered: HashMap<EnvelopeId, AbortHandle>,
    destroyed: bool,
}

pub(crate) struct ChannelInner {
    local: Addressee,
    peer: Addressee,
    cfg: ChannelConfig,
    dispatcher: Arc<Dispatcher>,
    scope: Scope,
    state: Mutex<ChannelState>,
}

/// Reliable endpoint from the local unit to one remote unit.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    pub(crate) fn new(
        local: Addressee,
        peer: Addressee,
        cfg: ChannelConfig,
        dispatcher: Arc<Dispatcher>,
        scope: Scope,
    ) -> Self {
        let state = ChannelState {
            status: ChannelStatus::Inactive,
            port: None,
            reader: None,
            epoch: 0,
            outbox: VecDeque::new(),
            awaiting_confirm: IndexMap::new(),
            awaiting_answer: HashMap::new(),
            delivered: HashMap::new(),
            destroyed: false,
        };
        Self {
            inner: Arc::new(ChannelInner {
                local,
                peer,
                cfg,
                dispatcher,
                scope,
                state: Mutex::new(state),
            }),
        }
    }

    /// Remote unit.
    pub fn peer(&self) -> &Addressee {
        &self.inner.peer
    }

    /// Local unit.
    pub fn local(&self) -> &Addressee {
        &self.inner.local
    }

    /// Current status.
    pub fn status(&self) -> ChannelStatus {
        self.inner.state.lock().status
    }

    /// True if the last handshake on the current Port succeeded.
    pub fn is_active(&self) -> bool {
        self.status() == ChannelStatus::Active
    }

    /// Queue sizes.
    pub fn stats(&self) -> ChannelStats {
        let st = self.inner.state.lock();
        ChannelStats {
            queued: st.outbox.len(),
            awaiting_confirm: st.awaiting_confirm.len(),
            awaiting_answer: st.awaiting_answer.len(),
            recently_delivered: st.delivered.len(),
        }
    }

    /// Replaces the Port.
    ///
    /// Protocol state is kept; the channel becomes Inactive until the next
    /// handshake, and in-flight sends are queued again in order.
    pub(crate) fn set_port(&self, end: PortEnd) {
        let (tx, rx) = end.split();
        let mut st = self.inner.state.lock();
        if st.destroyed {
            return;
        }
        if let Some(reader) = st.reader.take() {
            reader.abort();
        }
        self.inner.close(&mut st);
        st.epoch += 1;
        st.port = Some(tx);
        st.reader = Some(self.inner.spawn_reader(rx, st.epoch));
        tracing::debug!(local = %self.inner.local, peer = %self.inner.peer, epoch = st.epoch, "port attached");
    }

    /// Fire-and-forget send.
    ///
    /// - Active: transmitted now; confirmed sends are retransmitted every
    ///   retry delay until confirmed.
    /// - Inactive: confirmed sends are queued, unconfirmed ones dropped.
    pub fn send(&self, event: impl Into<String>, payload: Payload, opts: &SendOptions) -> SendStatus {
        let out = Outgoing {
            id: EnvelopeId::new(),
            event: event.into(),
            payload,
            retry: opts.retry_delay.unwrap_or(self.inner.cfg.send_retry),
            window: opts.confirm_duration,
        };
        let mut st = self.inner.state.lock();
        if st.destroyed {
            return SendStatus::Dropped;
        }
        if st.status == ChannelStatus::Active {
            return self.inner.transmit_send(&mut st, out);
        }
        if out.confirmed() {
            st.outbox.push_back(out);
            SendStatus::Queued
        } else {
            tracing::debug!(peer = %self.inner.peer, event = %out.event, "dropping unconfirmed send to inactive channel");
            SendStatus::Dropped
        }
    }

    /// Request/response. Fails immediately with `NotActive` on an inactive channel.
    pub fn post(&self, event: impl Into<String>, payload: Payload, opts: &PostOptions) -> Reply {
        let peer = self.inner.peer.clone();
        let timeout = opts.timeout.unwrap_or(self.inner.cfg.post_timeout);
        let mut st = self.inner.state.lock();
        if st.destroyed {
            return Reply::failed(peer.clone(), ChannelError::Destroyed { peer });
        }
        if st.status != ChannelStatus::Active {
            return Reply::failed(peer.clone(), ChannelError::NotActive { peer });
        }

        let id = EnvelopeId::new();
        let rx = self.inner.register(&mut st, id, Awaiting::Request, timeout);
        let env = Envelope::Post {
            id,
            event: event.into(),
            payload,
        };
        if !self.inner.transmit(&mut st, env) {
            self.inner.unregister(&mut st, id);
            return Reply::failed(peer.clone(), ChannelError::NotActive { peer });
        }
        Reply::waiting(peer, rx)
    }

    /// Runs the Init handshake on the current Port.
    ///
    /// Fails with `NotActive` if no live Port is attached and with
    /// `TimeoutExpired` if the peer does not answer within `init_timeout`.
    pub(crate) async fn init(&self) -> Result<(), ChannelError> {
        let peer = self.inner.peer.clone();
        let rx = {
            let mut st = self.inner.state.lock();
            if st.destroyed {
                return Err(ChannelError::Destroyed { peer });
            }
            if st.port.is_none() {
                return Err(ChannelError::NotActive { peer });
            }
            let id = EnvelopeId::new();
            let rx = self
                .inner
                .register(&mut st, id, Awaiting::Handshake, self.inner.cfg.init_timeout);
            if !self.inner.transmit(&mut st, Envelope::Init { id }) {
                self.inner.unregister(&mut st, id);
                return Err(ChannelError::NotActive { peer });
            }
            rx
        };
        match rx.await {
            Ok(result) => result.map(|_| ()),
            Err(_) => Err(ChannelError::Destroyed { peer }),
        }
    }

    /// Drops the Port, cancels every timer and fails pending answers.
    pub(crate) fn destroy(&self) {
        let mut st = self.inner.state.lock();
        if st.destroyed {
            return;
        }
        st.destroyed = true;
        st.status = ChannelStatus::Inactive;
        st.port = None;
        if let Some(reader) = st.reader.take() {
            reader.abort();
        }
        st.outbox.clear();
        for (_, flight) in st.awaiting_confirm.drain(..) {
            if let Some(timer) = flight.timer {
                timer.abort();
            }
        }
        for (_, waiter) in st.awaiting_answer.drain() {
            waiter.timer.abort();
            let _ = waiter.tx.send(Err(ChannelError::Destroyed {
                peer: self.inner.peer.clone(),
            }));
        }
        for (_, timer) in st.delivered.drain() {
            timer.abort();
        }
    }
}

impl ChannelInner {
    /// Writes to the Port; a failed write means the peer is gone.
    fn transmit(&self, st: &mut ChannelState, env: Envelope) -> bool {
        tracing::trace!(local = %self.local, peer = %self.peer, kind = env.kind(), id = %env.id(), "transmit");
        let sent = st.port.as_ref().is_some_and(|tx| tx.send(env).is_ok());
        if !sent && st.port.is_some() {
            tracing::debug!(local = %self.local, peer = %self.peer, "port closed on transmit");
            self.close(st);
        }
        sent
    }

    /// Inactive without a Port; in-flight sends go back to the front of the outbox.
    fn close(&self, st: &mut ChannelState) {
        st.status = ChannelStatus::Inactive;
        st.port = None;
        let inflight: Vec<Outgoing> = st
            .awaiting_confirm
            .drain(..)
            .map(|(_, flight)| {
                if let Some(timer) = flight.timer {
                    timer.abort();
                }
                flight.out
            })
            .collect();
        for out in inflight.into_iter().rev() {
            st.outbox.push_front(out);
        }
    }

    fn activate(self: &Arc<Self>, st: &mut ChannelState) {
        if st.status != ChannelStatus::Active {
            tracing::debug!(local = %self.local, peer = %self.peer, queued = st.outbox.len(), "channel active");
        }
        st.status = ChannelStatus::Active;
        while st.status == ChannelStatus::Active {
            let Some(out) = st.outbox.pop_front() else {
                break;
            };
            self.transmit_send(st, out);
        }
    }

    fn transmit_send(self: &Arc<Self>, st: &mut ChannelState, out: Outgoing) -> SendStatus {
        let env = out.envelope();
        if !out.confirmed() {
            return if self.transmit(st, env) {
                SendStatus::Delivered
            } else {
                SendStatus::Dropped
            };
        }

        // Registered before transmitting so a failed write requeues it in order.
        let (id, retry) = (out.id, out.retry);
        st.awaiting_confirm.insert(id, InFlight { out, timer: None });
        if !self.transmit(st, env) {
            return SendStatus::Queued;
        }
        let timer = self.schedule_retry(id, retry);
        if let Some(flight) = st.awaiting_confirm.get_mut(&id) {
            flight.timer = Some(timer);
        }
        SendStatus::Delivered
    }

    fn register(
        self: &Arc<Self>,
        st: &mut ChannelState,
        id: EnvelopeId,
        kind: Awaiting,
        timeout: Duration,
    ) -> oneshot::Receiver<Result<Payload, ChannelError>> {
        let (tx, rx) = oneshot::channel();
        let timer = self.schedule_expiry(id, timeout);
        st.awaiting_answer.insert(id, Waiter { kind, tx, timer });
        rx
    }

    fn unregister(&self, st: &mut ChannelState, id: EnvelopeId) {
        if let Some(waiter) = st.awaiting_answer.remove(&id) {
            waiter.timer.abort();
        }
    }

    fn schedule_retry(self: &Arc<Self>, id: EnvelopeId, delay: Duration) -> AbortHandle {
        let weak = Arc::downgrade(self);
        self.scope.spawn(async move {
            loop {
                tokio::time::sleep(delay).await;
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                if !inner.retransmit(id) {
                    return;
                }
            }
        })
    }

    /// Returns `true` while the send still awaits its confirm.
    fn retransmit(&self, id: EnvelopeId) -> bool {
        let mut st = self.state.lock();
        let Some(flight) = st.awaiting_confirm.get(&id) else {
            return false;
        };
        let env = flight.out.envelope();
        tracing::trace!(peer = %self.peer, %id, "retransmitting unconfirmed send");
        self.transmit(&mut st, env)
    }

    fn schedule_expiry(self: &Arc<Self>, id: EnvelopeId, after: Duration) -> AbortHandle {
        let weak = Arc::downgrade(self);
        self.scope.spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(inner) = weak.upgrade() {
                inner.expire(id, after);
            }
        })
    }

    fn expire(&self, id: EnvelopeId, after: Duration) {
        let waiter = self.state.lock().awaiting_answer.remove(&id);
        if let Some(waiter) = waiter {
            tracing::debug!(peer = %self.peer, %id, "answer timed out");
            let _ = waiter.tx.send(Err(ChannelError::TimeoutExpired {
                peer: self.peer.clone(),
                timeout: after,
            }));
        }
    }

    fn schedule_forget(self: &Arc<Self>, id: EnvelopeId, after: Duration) -> AbortHandle {
        let weak = Arc::downgrade(self);
        self.scope.spawn(async move {
            tokio::time::sleep(after).await;
            if let Some(inner) = weak.upgrade() {
                inner.state.lock().delivered.remove(&id);
            }
        })
    }

    fn spawn_reader(
        self: &Arc<Self>,
        mut rx: mpsc::UnboundedReceiver<Envelope>,
        epoch: u64,
    ) -> AbortHandle {
        let weak: Weak<ChannelInner> = Arc::downgrade(self);
        self.scope.spawn(async move {
            while let Some(env) = rx.recv().await {
                let Some(inner) = weak.upgrade() else {
                    return;
                };
                inner.receive(env);
            }
            if let Some(inner) = weak.upgrade() {
                inner.port_closed(epoch);
            }
        })
    }

    fn port_closed(&self, epoch: u64) {
        let mut st = self.state.lock();
        if st.destroyed || st.epoch != epoch {
            return;
        }
        st.reader = None;
        if st.port.is_some() {
            tracing::debug!(local = %self.local, peer = %self.peer, "port closed; channel inactive");
            self.close(&mut st);
        }
    }

    fn receive(self: &Arc<Self>, env: Envelope) {
        tracing::trace!(local = %self.local, peer = %self.peer, kind = env.kind(), id = %env.id(), "receive");
        let delivery = {
            let mut st = self.state.lock();
            if st.destroyed {
                return;
            }
            match env {
                Envelope::Init { id } => {
                    self.activate(&mut st);
                    self.transmit(
                        &mut st,
                        Envelope::Answer {
                            id,
                            payload: Value::Null,
                        },
                    );
                    None
                }
                Envelope::Send {
                    id,
                    event,
                    payload,
                    confirm,
                    window_ms,
                } => {
                    if confirm {
                        self.transmit(&mut st, Envelope::Confirm { id });
                    }
                    let window = match window_ms {
                        Some(ms) => Some(Duration::from_millis(ms)).filter(|w| !w.is_zero()),
                        None => self.cfg.dedup_window(),
                    };
                    match window {
                        Some(window) if confirm => {
                            if st.delivered.contains_key(&id) {
                                tracing::trace!(peer = %self.peer, %id, "duplicate send suppressed");
                                None
                            } else {
                                let timer = self.schedule_forget(id, window);
                                st.delivered.insert(id, timer);
                                Some(self.delivery(event, payload, None))
                            }
                        }
                        _ => Some(self.delivery(event, payload, None)),
                    }
                }
                Envelope::Confirm { id } => {
                    if let Some(flight) = st.awaiting_confirm.shift_remove(&id) {
                        if let Some(timer) = flight.timer {
                            timer.abort();
                        }
                    }
                    None
                }
                Envelope::Post { id, event, payload } => {
                    let responder = Responder::new(Arc::downgrade(self), id);
                    Some(self.delivery(event, payload, Some(responder)))
                }
                Envelope::Answer { id, payload } => {
                    if let Some(waiter) = st.awaiting_answer.remove(&id) {
                        waiter.timer.abort();
                        if waiter.kind == Awaiting::Handshake {
                            self.activate(&mut st);
                        }
                        let _ = waiter.tx.send(Ok(payload));
                    }
                    None
                }
            }
        };
        if let Some(delivery) = delivery {
            self.dispatcher.dispatch(delivery);
        }
    }

    fn delivery(&self, event: String, payload: Payload, responder: Option<Responder>) -> Delivery {
        Delivery {
            event,
            payload,
            from: self.peer.clone(),
            responder,
        }
    }

    /// Transmits an answer produced by a [`Responder`].
    pub(crate) fn reply(&self, env: Envelope) {
        let mut st = self.state.lock();
        if !st.destroyed {
            self.transmit(&mut st, env);
        }
    }
}
