//! Derived shared secrets

use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Secret agreed by a KEM exchange
///
/// The bytes are wiped when the value is dropped. `Debug` never prints them.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SharedSecret(Vec<u8>);

impl SharedSecret {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Short hex fingerprint, safe to log in debug scenarios
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.0[..self.0.len().min(4)])
    }
}

impl AsRef<[u8]> for SharedSecret {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedSecret")
            .field("len", &self.0.len())
            .finish_non_exhaustive()
    }
}

/// Compare two independently derived secrets in constant time
///
/// Test and debug aid only. Matching secrets do not authenticate the peer:
/// an attacker who substituted the public key also ends up with a
/// "matching" secret on each side of the substitution.
#[must_use]
pub fn debug_secrets_match(a: &SharedSecret, b: &SharedSecret) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_secrets_match() {
        let a = SharedSecret::new(vec![7u8; 32]);
        let b = SharedSecret::new(vec![7u8; 32]);
        let c = SharedSecret::new(vec![8u8; 32]);
        let short = SharedSecret::new(vec![7u8; 16]);

        assert!(debug_secrets_match(&a, &b));
        assert!(!debug_secrets_match(&a, &c));
        assert!(!debug_secrets_match(&a, &short));
    }

    #[test]
    fn test_debug_output_hides_bytes() {
        let secret = SharedSecret::new(vec![0xab; 32]);
        let debug = format!("{:?}", secret);
        assert!(!debug.contains("ab"));
        assert!(debug.contains("32"));
    }

    #[test]
    fn test_fingerprint() {
        let secret = SharedSecret::new(vec![0xde, 0xad, 0xbe, 0xef, 0x00]);
        assert_eq!(secret.fingerprint(), "deadbeef");
        assert_eq!(SharedSecret::new(vec![]).fingerprint(), "");
    }
}
