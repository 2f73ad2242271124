//! KEM abstraction
//!
//! The handshake only moves bytes around, so the mechanism is expressed over
//! byte slices. Parsing failures surface as [`CryptoError::InvalidKey`] or
//! [`CryptoError::InvalidCiphertext`].

use crate::error::CryptoResult;
use crate::pq_kem::{PQ_SHARED_SECRET_SIZE, PQCiphertext, PQEncapsulationKey, PQKemKeyPair};
use crate::secret::SharedSecret;

/// Key-encapsulation mechanism
pub trait Kem: Send + Sync + 'static {
    /// Private keypair retained by the responder
    type KeyPair: Send + Sync;

    /// Parameter set name, for logs
    const NAME: &'static str;

    /// Fixed length of every derived secret
    const SHARED_SECRET_LEN: usize;

    fn generate() -> Self::KeyPair;

    fn public_key_bytes(keypair: &Self::KeyPair) -> Vec<u8>;

    /// Encapsulate against received public key bytes
    ///
    /// Returns the ciphertext bytes and the encapsulator's secret.
    fn encapsulate(public_key: &[u8]) -> CryptoResult<(Vec<u8>, SharedSecret)>;

    /// Recover the secret from received ciphertext bytes
    fn decapsulate(keypair: &Self::KeyPair, ciphertext: &[u8]) -> CryptoResult<SharedSecret>;
}

/// Kyber768 (ML-KEM-768 equivalent)
#[derive(Debug, Clone, Copy, Default)]
pub struct Kyber768;

impl Kem for Kyber768 {
    type KeyPair = PQKemKeyPair;

    const NAME: &'static str = "ML-KEM-768";

    const SHARED_SECRET_LEN: usize = PQ_SHARED_SECRET_SIZE;

    fn generate() -> Self::KeyPair {
        PQKemKeyPair::generate()
    }

    fn public_key_bytes(keypair: &Self::KeyPair) -> Vec<u8> {
        keypair.encapsulation_key_bytes()
    }

    fn encapsulate(public_key: &[u8]) -> CryptoResult<(Vec<u8>, SharedSecret)> {
        let key = PQEncapsulationKey::from_bytes(public_key)?;
        let (ciphertext, secret) = key.encapsulate();
        Ok((ciphertext.into_bytes(), secret))
    }

    fn decapsulate(keypair: &Self::KeyPair, ciphertext: &[u8]) -> CryptoResult<SharedSecret> {
        let ciphertext = PQCiphertext::from_bytes(ciphertext.to_vec())?;
        keypair.decapsulate(&ciphertext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CryptoError;
    use crate::secret::debug_secrets_match;

    #[test]
    fn test_kyber_exchange_over_bytes() {
        let keypair = Kyber768::generate();
        let public = Kyber768::public_key_bytes(&keypair);

        let (ciphertext, initiator) = Kyber768::encapsulate(&public).unwrap();
        let responder = Kyber768::decapsulate(&keypair, &ciphertext).unwrap();

        assert!(debug_secrets_match(&initiator, &responder));
        assert_eq!(initiator.len(), Kyber768::SHARED_SECRET_LEN);
    }

    #[test]
    fn test_empty_public_key() {
        assert!(matches!(
            Kyber768::encapsulate(&[]),
            Err(CryptoError::InvalidKey(_))
        ));
    }

    #[test]
    fn test_corrupted_ciphertext_length() {
        let keypair = Kyber768::generate();
        let public = Kyber768::public_key_bytes(&keypair);
        let (mut ciphertext, _) = Kyber768::encapsulate(&public).unwrap();
        ciphertext.push(0);

        assert!(matches!(
            Kyber768::decapsulate(&keypair, &ciphertext),
            Err(CryptoError::InvalidCiphertext(_))
        ));
    }
}
