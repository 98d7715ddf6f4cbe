//! Attestation report policy checks.
//!
//! The platform validates a report's own cryptography and hands back
//! claims; this module decides whether those claims describe a peer we
//! trust. All checks must pass, there is no partial trust.

mod verifier;

pub use verifier::ReportVerifier;

use thiserror::Error;
use vrand_common::enclave::EnclaveError;

#[derive(Debug, Error)]
pub enum AttestationError {
    #[error("report data does not match the bound data digest")]
    BoundDataMismatch,

    #[error("unexpected enclave measurement")]
    MeasurementMismatch,

    #[error("security version {0} below required minimum")]
    SecurityVersionTooLow(u16),

    #[error("report does not belong to this product")]
    ProductMismatch,

    #[error("untrusted enclave signer")]
    SignerMismatch,

    #[error("enclave is running in debug mode")]
    DebugEnclave,

    #[error(transparent)]
    Enclave(#[from] EnclaveError),
}
