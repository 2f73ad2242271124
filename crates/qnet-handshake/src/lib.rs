//! # qnet handshake
//!
//! Two-party post-quantum key exchange over qnet channel endpoints.
//!
//! The responder generates a KEM keypair and sends its public key; the
//! initiator encapsulates against it and sends back the ciphertext; the
//! responder decapsulates. Each expected frame is awaited with a bounded
//! wait, and any timeout or malformed frame moves the session straight to
//! `FAILED`. An initiator discards whatever its peer had queued before the
//! session opened, so a public key left behind by a responder that already
//! gave up is never encapsulated against.
//!
//! ## Key Types
//!
//! - [`HandshakeSession`]: Single-use state machine for one side
//! - [`HandshakeState`] / [`Role`]: Explicit states and their legal progression
//! - [`HandshakeFrame`]: Postcard-encoded wire frames carrying raw KEM bytes
//! - [`HandshakeError`]: Timeout, malformed input, channel and cancellation failures
//!
//! ## Authentication
//!
//! The exchanged public key is not authenticated. Two matching secrets only
//! show that both sides ran the protocol with *someone*; binding the key to
//! a peer identity needs a signature or pre-shared trust on top.
//!
//! ## Example
//!
//! ```rust,ignore
//! use qnet_handshake::{HandshakeConfig, Role, run_handshake};
//!
//! let config = HandshakeConfig::default();
//! let (a, b) = tokio::join!(
//!     run_handshake(&alice, Role::Initiator, bob.local_id(), &config),
//!     run_handshake(&bob, Role::Responder, alice.local_id(), &config),
//! );
//! ```

pub mod error;
pub mod frame;
pub mod session;
pub mod state;

// Re-export main types
pub use error::{HandshakeError, HandshakeResult};
pub use frame::{HandshakeFrame, SessionId};
pub use session::{HandshakeConfig, HandshakeSession, run_handshake};
pub use state::{HandshakeState, Role};

// Re-export crypto types handed out by a completed session
pub use qnet_crypto::{Kem, Kyber768, SharedSecret, debug_secrets_match};
