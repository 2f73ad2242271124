//! Kyber768 (ML-KEM-768 equivalent) artifacts
//!
//! ## Sizes
//!
//! - Encapsulation key (public): 1,184 bytes
//! - Decapsulation key (private): 2,400 bytes
//! - Ciphertext: 1,088 bytes
//! - Shared secret: 32 bytes
//!
//! Byte inputs are length-checked before they reach the KEM, so truncated
//! or padded material is rejected up front.

use pqcrypto_kyber::kyber768;
use pqcrypto_traits::kem::{Ciphertext as _, PublicKey as _, SharedSecret as _};
use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};
use crate::secret::SharedSecret;

/// Size of the Kyber768 encapsulation key (public) in bytes
pub const PQ_ENCAPSULATION_KEY_SIZE: usize = kyber768::public_key_bytes();

/// Size of the Kyber768 decapsulation key (private) in bytes
pub const PQ_DECAPSULATION_KEY_SIZE: usize = kyber768::secret_key_bytes();

/// Size of the Kyber768 ciphertext in bytes
pub const PQ_CIPHERTEXT_SIZE: usize = kyber768::ciphertext_bytes();

/// Size of the shared secret in bytes
pub const PQ_SHARED_SECRET_SIZE: usize = kyber768::shared_secret_bytes();

/// Responder-side keypair
///
/// Only the encapsulation key ever leaves this value.
pub struct PQKemKeyPair {
    encapsulation_key: kyber768::PublicKey,
    decapsulation_key: kyber768::SecretKey,
}

impl PQKemKeyPair {
    /// Generate a fresh random keypair
    pub fn generate() -> Self {
        let (encapsulation_key, decapsulation_key) = kyber768::keypair();
        Self {
            encapsulation_key,
            decapsulation_key,
        }
    }

    pub fn encapsulation_key(&self) -> PQEncapsulationKey {
        PQEncapsulationKey {
            key: self.encapsulation_key.clone(),
        }
    }

    pub fn encapsulation_key_bytes(&self) -> Vec<u8> {
        self.encapsulation_key.as_bytes().to_vec()
    }

    /// Recover the shared secret from a ciphertext
    ///
    /// Kyber uses implicit rejection: a well-sized but foreign ciphertext
    /// yields an unrelated secret rather than an error.
    pub fn decapsulate(&self, ciphertext: &PQCiphertext) -> CryptoResult<SharedSecret> {
        let ct = kyber768::Ciphertext::from_bytes(&ciphertext.bytes)
            .map_err(|e| CryptoError::DecapsulationFailed(format!("{:?}", e)))?;
        let shared = kyber768::decapsulate(&ct, &self.decapsulation_key);
        Ok(SharedSecret::new(shared.as_bytes().to_vec()))
    }
}

impl std::fmt::Debug for PQKemKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PQKemKeyPair")
            .field("encapsulation_key", &self.encapsulation_key().short_id())
            .finish_non_exhaustive()
    }
}

/// Public encapsulation key, freely shareable
#[derive(Clone)]
pub struct PQEncapsulationKey {
    key: kyber768::PublicKey,
}

impl PQEncapsulationKey {
    /// Parse received key bytes
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != PQ_ENCAPSULATION_KEY_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "expected {} bytes, got {}",
                PQ_ENCAPSULATION_KEY_SIZE,
                bytes.len()
            )));
        }
        let key = kyber768::PublicKey::from_bytes(bytes)
            .map_err(|e| CryptoError::InvalidKey(format!("{:?}", e)))?;
        Ok(Self { key })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.key.as_bytes().to_vec()
    }

    /// Encapsulate a fresh secret to the key owner
    ///
    /// Returns the ciphertext to send and the local copy of the secret.
    pub fn encapsulate(&self) -> (PQCiphertext, SharedSecret) {
        let (shared, ciphertext) = kyber768::encapsulate(&self.key);
        (
            PQCiphertext {
                bytes: ciphertext.as_bytes().to_vec(),
            },
            SharedSecret::new(shared.as_bytes().to_vec()),
        )
    }

    /// First 8 bytes, hex encoded
    pub fn short_id(&self) -> String {
        hex::encode(&self.key.as_bytes()[..8])
    }
}

impl std::fmt::Debug for PQEncapsulationKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PQEncapsulationKey")
            .field("id", &self.short_id())
            .finish()
    }
}

impl PartialEq for PQEncapsulationKey {
    fn eq(&self, other: &Self) -> bool {
        self.key.as_bytes() == other.key.as_bytes()
    }
}

impl Eq for PQEncapsulationKey {}

/// A KEM ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PQCiphertext {
    bytes: Vec<u8>,
}

impl PQCiphertext {
    /// Parse received ciphertext bytes
    pub fn from_bytes(bytes: Vec<u8>) -> CryptoResult<Self> {
        if bytes.len() != PQ_CIPHERTEXT_SIZE {
            return Err(CryptoError::InvalidCiphertext(format!(
                "expected {} bytes, got {}",
                PQ_CIPHERTEXT_SIZE,
                bytes.len()
            )));
        }
        Ok(Self { bytes })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
