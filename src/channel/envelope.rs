//! # Wire envelopes.
//!
//! [`Envelope`] is the unit moved across a Port. Each variant carries only
//! the fields relevant to its kind. `Confirm` and `Answer` echo the id of the
//! envelope they acknowledge.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque application payload.
pub type Payload = serde_json::Value;

/// Unique envelope identifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvelopeId(Uuid);

impl EnvelopeId {
    /// Generates a fresh random id.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for EnvelopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Message kinds exchanged between two channels.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    /// Handshake request; answered with [`Envelope::Answer`].
    Init {
        /// Handshake id.
        id: EnvelopeId,
    },
    /// Fire-and-forget delivery; `confirm` asks the receiver for a [`Envelope::Confirm`].
    Send {
        /// Message id (stable across retransmissions).
        id: EnvelopeId,
        /// Application topic.
        event: String,
        /// Application data.
        payload: Payload,
        /// Whether the sender is waiting for a confirm.
        confirm: bool,
        /// Receiver-side duplicate window override, in milliseconds.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        window_ms: Option<u64>,
    },
    /// Acknowledges a [`Envelope::Send`].
    Confirm {
        /// Id of the confirmed send.
        id: EnvelopeId,
    },
    /// Request expecting an [`Envelope::Answer`].
    Post {
        /// Request id.
        id: EnvelopeId,
        /// Application topic.
        event: String,
        /// Application data.
        payload: Payload,
    },
    /// Response to a [`Envelope::Post`] or [`Envelope::Init`].
    Answer {
        /// Id of the answered request.
        id: EnvelopeId,
        /// Answer data (`null` for handshakes).
        payload: Payload,
    },
}

impl Envelope {
    /// Id carried (or echoed) by the envelope.
    pub fn id(&self) -> EnvelopeId {
        match self {
            Envelope::Init { id }
            | Envelope::Send { id, .. }
            | Envelope::Confirm { id }
            | Envelope::Post { id, .. }
            | Envelope::Answer { id, .. } => *id,
        }
    }

    /// Short kind name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Init { .. } => "init",
            Envelope::Send { .. } => "send",
            Envelope::Confirm { .. } => "confirm",
            Envelope::Post { .. } => "post",
            Envelope::Answer { .. } => "answer",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_wire_shape_is_tagged() {
        let id = EnvelopeId::new();
        let env = Envelope::Post {
            id,
            event: "ping".into(),
            payload: json!({ "n": 1 }),
        };
        let wire = serde_json::to_value(&env).unwrap();
        assert_eq!(wire["type"], "post");
        assert_eq!(wire["event"], "ping");
        assert_eq!(wire["id"], json!(id.to_string()));
        assert_eq!(env.kind(), "post");
        assert_eq!(env.id(), id);
    }
}
