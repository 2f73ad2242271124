//! Messages exchanged between endpoints
//!
//! Payloads are opaque byte sequences. Higher layers decide how text, keys
//! or ciphertexts are encoded; the channel never inspects them.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChannelError;
use crate::identity::NodeId;

/// Unique identifier of a message, also used to correlate acknowledgments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(Uuid);

impl MessageId {
    /// Generate a fresh random id
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Short hex prefix for logging
    pub fn short(&self) -> String {
        hex::encode(&self.0.as_bytes()[..4])
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short())
    }
}

/// Kind tag of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Application or protocol payload
    Data,
    /// Acknowledgment of a previously sent message (see `correlation`)
    Ack,
    /// Out-of-band signalling (resource generation, transfer control)
    Control,
    /// Heralding half of a background EPR pair
    ///
    /// Acknowledged on delivery but never queued at the receiver.
    Herald,
}

/// Logical lane a message travels on
///
/// Each `(sender, lane)` pair has its own FIFO at the receiver, so qubit and
/// EPR traffic never interleaves with classical protocol messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Lane {
    Classical,
    Qubit,
    Epr,
}

impl std::fmt::Display for Lane {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lane::Classical => write!(f, "classical"),
            Lane::Qubit => write!(f, "qubit"),
            Lane::Epr => write!(f, "epr"),
        }
    }
}

/// A point-to-point message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: NodeId,
    pub receiver: NodeId,
    pub lane: Lane,
    pub kind: MessageKind,
    pub payload: Bytes,
    /// For acks: the id of the message being acknowledged
    pub correlation: Option<MessageId>,
    /// Whether the receiver should acknowledge on delivery
    pub ack_requested: bool,
    pub sent_at: DateTime<Utc>,
}

impl Message {
    /// Create a new message with a fresh id
    pub fn new(
        sender: NodeId,
        receiver: NodeId,
        lane: Lane,
        kind: MessageKind,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            id: MessageId::generate(),
            sender,
            receiver,
            lane,
            kind,
            payload: payload.into(),
            correlation: None,
            ack_requested: false,
            sent_at: Utc::now(),
        }
    }

    /// Request an acknowledgment from the receiver
    pub fn with_ack_requested(mut self, requested: bool) -> Self {
        self.ack_requested = requested;
        self
    }

    /// Build the acknowledgment for this message, sent back by the receiver
    pub fn ack(&self) -> Self {
        Self {
            id: MessageId::generate(),
            sender: self.receiver.clone(),
            receiver: self.sender.clone(),
            lane: self.lane,
            kind: MessageKind::Ack,
            payload: Bytes::new(),
            correlation: Some(self.id),
            ack_requested: false,
            sent_at: Utc::now(),
        }
    }

    pub fn is_ack(&self) -> bool {
        self.kind == MessageKind::Ack
    }

    pub fn is_herald(&self) -> bool {
        self.kind == MessageKind::Herald
    }

    /// Encode for the wire
    pub fn to_wire(&self) -> Result<Vec<u8>, ChannelError> {
        postcard::to_allocvec(self).map_err(|e| ChannelError::Codec(e.to_string()))
    }

    /// Decode from the wire
    pub fn from_wire(bytes: &[u8]) -> Result<Self, ChannelError> {
        postcard::from_bytes(bytes).map_err(|e| ChannelError::Codec(e.to_string()))
    }
}
