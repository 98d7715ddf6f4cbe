//! Opaque enclave platform capabilities.
//!
//! Sealing, remote attestation and hardware entropy are trusted
//! primitives provided by the platform the node runs on. The rest of
//! the codebase consumes them through the three traits below and never
//! looks inside a sealed blob or a report's signature chain.
//!
//! Portable software implementations ship alongside so the node runs
//! (and is testable) outside real enclave hardware; a hardware-backed
//! platform plugs in behind the same traits.

mod software;

pub use software::{OsEntropy, SoftwareAttestor, SoftwareSealing};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Width of a single entropy draw.
///
/// Hardware entropy instructions return small fixed-width words; the
/// portable provider mirrors that contract so callers keep the same
/// chunk-and-retry discipline either way.
pub const ENTROPY_CHUNK_SIZE: usize = 2;

#[derive(Debug, Error)]
pub enum EnclaveError {
    #[error("sealing failure: {0}")]
    Sealing(String),

    #[error("unsealing failure: {0}")]
    Unsealing(String),

    #[error("attestation failure: {0}")]
    Attestation(String),

    #[error("malformed attestation report: {0}")]
    MalformedReport(String),

    #[error("entropy source failure: {0}")]
    Entropy(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Claims carried by a verified attestation report.
///
/// Producing and checking the report's own cryptography is the
/// platform's job; once decoded, policy decisions are made on these
/// claims only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportClaims {
    /// Hash identifying the exact code running in the peer enclave
    #[serde(with = "hex")]
    pub measurement: Vec<u8>,
    /// Identity of the entity that signed the enclave code
    #[serde(with = "hex")]
    pub signer_id: Vec<u8>,
    /// Product the enclave belongs to
    pub product_id: u16,
    /// Platform patch level
    pub security_version: u16,
    /// Whether the enclave runs with debugging/introspection enabled
    pub debug: bool,
    /// Digest of the auxiliary data the report is bound to
    #[serde(with = "hex")]
    pub data_digest: Vec<u8>,
}

/// This node's own identity, embedded into the reports it produces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnclaveIdentity {
    #[serde(with = "hex")]
    pub measurement: Vec<u8>,
    #[serde(with = "hex")]
    pub signer_id: Vec<u8>,
    pub product_id: u16,
    pub security_version: u16,
    pub debug: bool,
}

/// Durable secret storage bound to the enclave identity.
///
/// `unseal(seal(x)) == x` on the same platform identity; a blob sealed
/// on one identity is garbage on any other and never portable.
pub trait SealingProvider: Send + Sync {
    fn seal(&self, data: &[u8]) -> Result<Vec<u8>, EnclaveError>;

    fn unseal(&self, blob: &[u8]) -> Result<Vec<u8>, EnclaveError>;
}

/// Remote attestation: quote generation and report decoding.
pub trait AttestationProvider: Send + Sync {
    /// Produce a report binding `bound_data` (its digest ends up in
    /// [`ReportClaims::data_digest`]).
    fn quote(&self, bound_data: &[u8]) -> Result<Vec<u8>, EnclaveError>;

    /// Validate a raw report's platform signature and extract its
    /// claims. Policy checks on the claims are the caller's business.
    fn decode(&self, report: &[u8]) -> Result<ReportClaims, EnclaveError>;

    /// Opaque token from an external attestation provider, bound to
    /// `bound_data`. Served verbatim on `/token`.
    fn token(&self, bound_data: &[u8]) -> Result<String, EnclaveError>;
}

/// Narrow entropy source filling one fixed-width chunk per call.
///
/// A call may fail transiently; callers retry the same chunk until it
/// succeeds. Chunks must be exactly [`ENTROPY_CHUNK_SIZE`] bytes.
pub trait EntropyProvider: Send + Sync {
    fn fill_chunk(&self, chunk: &mut [u8]) -> Result<(), EnclaveError>;
}
