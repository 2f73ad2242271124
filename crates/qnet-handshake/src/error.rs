//! Handshake error types

use std::time::Duration;

use qnet_core::{ChannelError, NodeId};
use thiserror::Error;

use crate::state::HandshakeState;

/// Reasons a handshake session ends in [`HandshakeState::Failed`]
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// The peer did not send the expected frame within the wait window
    #[error("No {expecting} from {peer} within {waited:?}")]
    ReceiveTimeout {
        peer: NodeId,
        expecting: &'static str,
        waited: Duration,
    },

    /// Public key bytes were empty, truncated or undecodable
    #[error("Malformed key material: {0}")]
    MalformedKeyMaterial(String),

    /// Ciphertext bytes were empty, truncated or undecodable
    #[error("Malformed ciphertext: {0}")]
    MalformedCiphertext(String),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// The session was driven out of order or reused
    #[error("Invalid handshake transition {from} -> {to}")]
    InvalidTransition {
        from: HandshakeState,
        to: HandshakeState,
    },

    /// The local endpoint shut down while waiting
    #[error("Handshake cancelled by shutdown")]
    Cancelled,
}

impl HandshakeError {
    /// Whether the failure came from bytes the peer sent
    pub fn is_malformed_input(&self) -> bool {
        matches!(
            self,
            HandshakeError::MalformedKeyMaterial(_) | HandshakeError::MalformedCiphertext(_)
        )
    }
}

/// Result type for handshake operations
pub type HandshakeResult<T> = Result<T, HandshakeError>;
