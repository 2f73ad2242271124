//! Error types for qnet-crypto

use thiserror::Error;

/// Errors that can occur during KEM operations
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    #[error("Decapsulation failed: {0}")]
    DecapsulationFailed(String),
}

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_error_display() {
        let err = CryptoError::InvalidKey("wrong length".to_string());
        assert!(format!("{}", err).contains("Invalid key"));
        assert!(format!("{}", err).contains("wrong length"));

        let err = CryptoError::InvalidCiphertext("truncated".to_string());
        assert!(format!("{}", err).contains("Invalid ciphertext"));

        let err = CryptoError::DecapsulationFailed("bad ct".to_string());
        assert!(format!("{}", err).contains("Decapsulation failed"));
    }
}
