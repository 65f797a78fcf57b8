use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use sha2::{Digest, Sha256};

/// Derive the password hash the console expects at user bind time.
///
/// The digest is chained 36 times starting from the UTF-8 password bytes,
/// then hashed once more and base64-encoded. The console performs the same
/// derivation, so the chaining must match bit for bit.
pub fn hash_password(password: &str) -> String {
    let mut digest = password.as_bytes().to_vec();
    for _ in 0..36 {
        digest = Sha256::digest(&digest).to_vec();
    }
    STANDARD.encode(Sha256::digest(&digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_stable_and_base64() {
        let a = hash_password("DMXC3");
        let b = hash_password("DMXC3");
        assert_eq!(a, b);
        // base64 of a 32-byte digest is 44 chars with padding
        assert_eq!(a.len(), 44);
        assert!(STANDARD.decode(&a).is_ok());
    }

    #[test]
    fn hash_differs_per_password() {
        assert_ne!(hash_password("DMXC3"), hash_password("dmxc3"));
    }

    #[test]
    fn hash_matches_manual_chain() {
        // 36 chained digests plus the final one before encoding
        let mut digest = b"secret".to_vec();
        for _ in 0..37 {
            digest = Sha256::digest(&digest).to_vec();
        }
        assert_eq!(hash_password("secret"), STANDARD.encode(&digest));
    }
}
