use std::sync::Arc;

use log::debug;
use vrand_common::{
    config::{MIN_SECURITY_VERSION, PRODUCT_ID},
    crypto::sha256,
    enclave::{AttestationProvider, ReportClaims},
};

use super::AttestationError;

/// Policy gate over decoded attestation reports.
///
/// A report passes only when it is bound to the expected auxiliary
/// data, carries the expected code measurement, meets the platform
/// patch floor, belongs to this product, was signed by the trusted
/// signer, and the enclave is not debuggable.
pub struct ReportVerifier {
    attestor: Arc<dyn AttestationProvider>,
    trusted_signer: Vec<u8>,
}

impl ReportVerifier {
    pub fn new(attestor: Arc<dyn AttestationProvider>, trusted_signer: Vec<u8>) -> Self {
        Self {
            attestor,
            trusted_signer,
        }
    }

    /// Decode a raw report and run every policy check against the
    /// expected identity and bound data.
    pub fn verify(
        &self,
        report: &[u8],
        bound_data: &[u8],
        expected_measurement: &[u8],
    ) -> Result<ReportClaims, AttestationError> {
        let claims = self.attestor.decode(report)?;
        self.verify_claims(&claims, bound_data, expected_measurement)?;
        Ok(claims)
    }

    pub fn verify_claims(
        &self,
        claims: &ReportClaims,
        bound_data: &[u8],
        expected_measurement: &[u8],
    ) -> Result<(), AttestationError> {
        if claims.data_digest != sha256(bound_data) {
            return Err(AttestationError::BoundDataMismatch);
        }
        if claims.measurement != expected_measurement {
            return Err(AttestationError::MeasurementMismatch);
        }
        if claims.security_version < MIN_SECURITY_VERSION {
            return Err(AttestationError::SecurityVersionTooLow(
                claims.security_version,
            ));
        }
        if claims.product_id != PRODUCT_ID {
            return Err(AttestationError::ProductMismatch);
        }
        if claims.signer_id != self.trusted_signer {
            return Err(AttestationError::SignerMismatch);
        }
        if claims.debug {
            return Err(AttestationError::DebugEnclave);
        }
        debug!("attestation report passed all checks");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vrand_common::enclave::{EnclaveIdentity, SoftwareAttestor};

    const BOUND: &[u8] = b"certificate der bytes";

    fn identity() -> EnclaveIdentity {
        EnclaveIdentity {
            measurement: vec![0xaa; 32],
            signer_id: vec![0xbb; 32],
            product_id: PRODUCT_ID,
            security_version: MIN_SECURITY_VERSION,
            debug: false,
        }
    }

    fn verifier() -> ReportVerifier {
        ReportVerifier::new(
            Arc::new(SoftwareAttestor::new(identity())),
            vec![0xbb; 32],
        )
    }

    fn passing_claims() -> ReportClaims {
        ReportClaims {
            measurement: vec![0xaa; 32],
            signer_id: vec![0xbb; 32],
            product_id: PRODUCT_ID,
            security_version: MIN_SECURITY_VERSION,
            debug: false,
            data_digest: sha256(BOUND).to_vec(),
        }
    }

    #[test]
    fn test_valid_report_passes() {
        let attestor = SoftwareAttestor::new(identity());
        let report = attestor.quote(BOUND).unwrap();
        let claims = verifier().verify(&report, BOUND, &[0xaa; 32]).unwrap();
        assert_eq!(claims.measurement, vec![0xaa; 32]);
    }

    #[test]
    fn test_all_checks_pass_on_baseline() {
        verifier()
            .verify_claims(&passing_claims(), BOUND, &[0xaa; 32])
            .unwrap();
    }

    #[test]
    fn test_bound_data_mismatch_rejected() {
        let err = verifier()
            .verify_claims(&passing_claims(), b"different data", &[0xaa; 32])
            .unwrap_err();
        assert!(matches!(err, AttestationError::BoundDataMismatch));
    }

    #[test]
    fn test_measurement_mismatch_rejected() {
        let err = verifier()
            .verify_claims(&passing_claims(), BOUND, &[0xcc; 32])
            .unwrap_err();
        assert!(matches!(err, AttestationError::MeasurementMismatch));
    }

    #[test]
    fn test_old_security_version_rejected() {
        let mut claims = passing_claims();
        claims.security_version = MIN_SECURITY_VERSION - 1;
        let err = verifier()
            .verify_claims(&claims, BOUND, &[0xaa; 32])
            .unwrap_err();
        assert!(matches!(err, AttestationError::SecurityVersionTooLow(_)));
    }

    #[test]
    fn test_wrong_product_rejected() {
        let mut claims = passing_claims();
        claims.product_id = 0x7777;
        let err = verifier()
            .verify_claims(&claims, BOUND, &[0xaa; 32])
            .unwrap_err();
        assert!(matches!(err, AttestationError::ProductMismatch));
    }

    #[test]
    fn test_untrusted_signer_rejected() {
        let mut claims = passing_claims();
        claims.signer_id = vec![0xdd; 32];
        let err = verifier()
            .verify_claims(&claims, BOUND, &[0xaa; 32])
            .unwrap_err();
        assert!(matches!(err, AttestationError::SignerMismatch));
    }

    #[test]
    fn test_debug_enclave_rejected() {
        // identical in every field except the debug flag
        let mut claims = passing_claims();
        claims.debug = true;
        let err = verifier()
            .verify_claims(&claims, BOUND, &[0xaa; 32])
            .unwrap_err();
        assert!(matches!(err, AttestationError::DebugEnclave));
    }

    #[test]
    fn test_garbage_report_rejected() {
        assert!(verifier().verify(b"garbage", BOUND, &[0xaa; 32]).is_err());
    }
}
