//! # In-process duplex port.
//!
//! A [`Port`] links exactly two endpoints with a pair of unbounded FIFO
//! queues. Each side gets one [`PortEnd`]: the sender for its outbound
//! direction and the receiver for its inbound direction.
//!
//! ```text
//!   PortEnd (A)                       PortEnd (B)
//!   tx ──────────── envelopes ───────────► rx
//!   rx ◄─────────── envelopes ──────────── tx
//! ```
//!
//! ## Closure
//! There is no explicit close message. When one side drops its `PortEnd`
//! (its unit died or its channel was destroyed), the other side observes
//! `recv() == None` on its receiver and send errors on its sender.

use std::collections::BTreeMap;

use tokio::sync::mpsc;

use crate::channel::Envelope;
use crate::topology::Addressee;

/// Port bundle handed to a unit at spawn time: one end per peer.
pub type PortBundle = BTreeMap<Addressee, PortEnd>;

/// One side of a duplex [`Port`].
#[derive(Debug)]
pub struct PortEnd {
    tx: mpsc::UnboundedSender<Envelope>,
    rx: mpsc::UnboundedReceiver<Envelope>,
}

impl PortEnd {
    /// Splits the end into its outbound sender and inbound receiver.
    pub(crate) fn split(
        self,
    ) -> (
        mpsc::UnboundedSender<Envelope>,
        mpsc::UnboundedReceiver<Envelope>,
    ) {
        (self.tx, self.rx)
    }

    /// Transmits one envelope to the other side.
    ///
    /// Returns `false` if the other side is gone.
    pub fn send(&self, envelope: Envelope) -> bool {
        self.tx.send(envelope).is_ok()
    }

    /// Receives the next envelope; `None` once the other side is gone.
    pub async fn recv(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Non-blocking receive.
    pub fn try_recv(&mut self) -> Option<Envelope> {
        self.rx.try_recv().ok()
    }
}

/// Factory for linked [`PortEnd`] pairs.
pub struct Port;

impl Port {
    /// Creates a fresh duplex link and returns its two ends.
    ///
    /// ## Example
    /// ```rust
    /// use threadvisor::{Envelope, EnvelopeId, Port};
    ///
    /// let (a, mut b) = Port::pair();
    /// let id = EnvelopeId::new();
    /// assert!(a.send(Envelope::Confirm { id }));
    /// assert_eq!(b.try_recv(), Some(Envelope::Confirm { id }));
    /// ```
    pub fn pair() -> (PortEnd, PortEnd) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            PortEnd { tx: a_tx, rx: a_rx },
            PortEnd { tx: b_tx, rx: b_rx },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::EnvelopeId;

    #[tokio::test]
    async fn test_drop_signals_closure() {
        let (a, mut b) = Port::pair();
        let id = EnvelopeId::new();
        assert!(a.send(Envelope::Init { id }));
        drop(a);

        assert_eq!(b.recv().await, Some(Envelope::Init { id }));
        assert_eq!(b.recv().await, None);
        assert!(!b.send(Envelope::Confirm { id }));
    }
}
