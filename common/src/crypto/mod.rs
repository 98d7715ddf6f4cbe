use sha2::{Digest, Sha256};

pub const HASH_SIZE: usize = 32;

/// SHA-256 of the input, as a fixed-size array.
///
/// Used everywhere a report binds auxiliary data (certificate DER,
/// public key bytes) so that both sides of an attestation agree on the
/// digest construction.
pub fn sha256(data: &[u8]) -> [u8; HASH_SIZE] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_known_vector() {
        // SHA-256("abc")
        let digest = sha256(b"abc");
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha256_is_deterministic() {
        assert_eq!(sha256(b"block hash"), sha256(b"block hash"));
        assert_ne!(sha256(b"block hash"), sha256(b"other hash"));
    }
}
