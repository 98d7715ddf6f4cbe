use thiserror::Error;
use vrand_common::enclave::EnclaveError;

use crate::attestation::AttestationError;

/// Top-level daemon error.
///
/// Only a small set of failures may take the process down: broken
/// configuration, a trust violation during peer bootstrap, an
/// unpersistable key, or an unusable TLS endpoint. Everything else is
/// recoverable and degrades to an empty response or a logged warning.
/// `is_fatal` is the single place that classification lives.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("key persistence failure: {0}")]
    KeyPersistence(String),

    #[error("peer bootstrap failure: {0}")]
    Bootstrap(String),

    #[error("TLS setup failure: {0}")]
    Tls(String),

    #[error(transparent)]
    Attestation(#[from] AttestationError),

    #[error(transparent)]
    Enclave(#[from] EnclaveError),

    #[error("invalid key material: {0}")]
    InvalidKey(String),

    #[error("vrf computation failure: {0}")]
    Vrf(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl NodeError {
    /// Whether this error must terminate the process.
    ///
    /// A violated security invariant (attested identity, sealed-key
    /// integrity) or unusable startup state means continued operation
    /// cannot be trusted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            NodeError::Config(_)
                | NodeError::KeyPersistence(_)
                | NodeError::Bootstrap(_)
                | NodeError::Tls(_)
                | NodeError::Attestation(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attestation::AttestationError;

    #[test]
    fn test_trust_failures_are_fatal() {
        assert!(NodeError::Config("bad".to_owned()).is_fatal());
        assert!(NodeError::KeyPersistence("disk".to_owned()).is_fatal());
        assert!(NodeError::Bootstrap("bad hex".to_owned()).is_fatal());
        assert!(NodeError::Attestation(AttestationError::DebugEnclave).is_fatal());
    }

    #[test]
    fn test_runtime_failures_are_recoverable() {
        assert!(!NodeError::InvalidKey("short".to_owned()).is_fatal());
        assert!(!NodeError::Vrf("backend".to_owned()).is_fatal());
        let io = NodeError::Io(std::io::Error::new(std::io::ErrorKind::Other, "x"));
        assert!(!io.is_fatal());
    }
}
