//! Handshake roles and states
//!
//! Progression is linear per role with no backward transitions:
//!
//! ```text
//! Responder: INIT -> KEYGEN_SENT -> AWAITING_CT     -> SECRET_DERIVED -> COMPLETE
//! Initiator: INIT -> AWAITING_PK -> CIPHERTEXT_SENT -> SECRET_DERIVED -> COMPLETE
//! ```
//!
//! `FAILED` is reachable from every non-terminal state.

use serde::{Deserialize, Serialize};

/// Side of the exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Waits for the public key, encapsulates, sends the ciphertext
    Initiator,
    /// Generates the keypair, sends the public key, decapsulates
    Responder,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Initiator => write!(f, "initiator"),
            Role::Responder => write!(f, "responder"),
        }
    }
}

/// Handshake session state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HandshakeState {
    Init,
    KeygenSent,
    AwaitingPk,
    CiphertextSent,
    AwaitingCt,
    SecretDerived,
    Complete,
    Failed,
}

impl HandshakeState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, HandshakeState::Complete | HandshakeState::Failed)
    }

    /// Whether `role` may move from `self` to `to`
    pub fn can_transition(&self, role: Role, to: HandshakeState) -> bool {
        use HandshakeState::*;

        if to == Failed {
            return !self.is_terminal();
        }

        match role {
            Role::Responder => matches!(
                (*self, to),
                (Init, KeygenSent)
                    | (KeygenSent, AwaitingCt)
                    | (AwaitingCt, SecretDerived)
                    | (SecretDerived, Complete)
            ),
            Role::Initiator => matches!(
                (*self, to),
                (Init, AwaitingPk)
                    | (AwaitingPk, CiphertextSent)
                    | (CiphertextSent, SecretDerived)
                    | (SecretDerived, Complete)
            ),
        }
    }
}

impl std::fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            HandshakeState::Init => "INIT",
            HandshakeState::KeygenSent => "KEYGEN_SENT",
            HandshakeState::AwaitingPk => "AWAITING_PK",
            HandshakeState::CiphertextSent => "CIPHERTEXT_SENT",
            HandshakeState::AwaitingCt => "AWAITING_CT",
            HandshakeState::SecretDerived => "SECRET_DERIVED",
            HandshakeState::Complete => "COMPLETE",
            HandshakeState::Failed => "FAILED",
        };
        f.write_str(name)
    }
}
