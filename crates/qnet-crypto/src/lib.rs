//! # qnet crypto
//!
//! Post-quantum key encapsulation used by the qnet handshake.
//!
//! ## Key Types
//!
//! - [`Kem`]: Key-encapsulation mechanism the handshake is generic over
//! - [`Kyber768`]: NIST ML-KEM-768 equivalent implementation of [`Kem`]
//! - [`PQKemKeyPair`] / [`PQEncapsulationKey`] / [`PQCiphertext`]: Typed
//!   Kyber768 artifacts
//! - [`SharedSecret`]: Derived secret, zeroized on drop
//!
//! ## Example
//!
//! ```rust,ignore
//! use qnet_crypto::{Kem, Kyber768};
//!
//! let keypair = Kyber768::generate();
//! let public = Kyber768::public_key_bytes(&keypair);
//!
//! let (ciphertext, initiator_secret) = Kyber768::encapsulate(&public)?;
//! let responder_secret = Kyber768::decapsulate(&keypair, &ciphertext)?;
//! ```

pub mod error;
pub mod kem;
pub mod pq_kem;
pub mod secret;

// Re-exports
pub use error::{CryptoError, CryptoResult};
pub use kem::{Kem, Kyber768};
pub use pq_kem::{
    PQ_CIPHERTEXT_SIZE, PQ_DECAPSULATION_KEY_SIZE, PQ_ENCAPSULATION_KEY_SIZE,
    PQ_SHARED_SECRET_SIZE, PQCiphertext, PQEncapsulationKey, PQKemKeyPair,
};
pub use secret::{SharedSecret, debug_secrets_match};
