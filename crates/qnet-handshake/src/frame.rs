//! Handshake wire frames
//!
//! KEM artifacts travel as raw bytes inside a postcard-encoded frame. The
//! session id chosen by the responder is echoed by the initiator so frames
//! left over from an earlier session are ignored.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Handshake session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let simple = self.0.simple().to_string();
        write!(f, "{}", &simple[..8])
    }
}

/// A message of the key exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HandshakeFrame {
    /// Responder -> initiator
    PublicKey { session: SessionId, key: Vec<u8> },
    /// Initiator -> responder
    Ciphertext { session: SessionId, ciphertext: Vec<u8> },
}

impl HandshakeFrame {
    pub fn session(&self) -> SessionId {
        match self {
            HandshakeFrame::PublicKey { session, .. } => *session,
            HandshakeFrame::Ciphertext { session, .. } => *session,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_preserves_key_bytes() {
        let session = SessionId::generate();
        let key: Vec<u8> = (0..=255u8).cycle().take(1184).collect();
        let frame = HandshakeFrame::PublicKey {
            session,
            key: key.clone(),
        };

        let decoded = HandshakeFrame::from_bytes(&frame.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded.session(), session);
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(HandshakeFrame::from_bytes(&[]).is_err());
        assert!(HandshakeFrame::from_bytes(&[9, 9, 9]).is_err());
    }

    #[test]
    fn test_session_id_display_is_short() {
        assert_eq!(SessionId::generate().to_string().len(), 8);
    }
}
