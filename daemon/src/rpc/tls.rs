//! Self-signed certificate and rustls config for the attested
//! endpoint.
//!
//! No certificate authority is involved anywhere: the certificate is
//! freshly generated at startup under a fixed name, and peers accept
//! it only after checking the attestation report bound to its hash.

use rcgen::{CertificateParams, DnType, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};

use crate::{config::CERT_COMMON_NAME, core::error::NodeError};

/// Generate the certificate and its private key, both DER-encoded
/// (the key in PKCS#8).
pub fn generate_certificate() -> Result<(Vec<u8>, Vec<u8>), NodeError> {
    let mut params = CertificateParams::new(vec![CERT_COMMON_NAME.to_owned()])
        .map_err(|e| NodeError::Tls(format!("certificate params: {}", e)))?;
    params
        .distinguished_name
        .push(DnType::CommonName, CERT_COMMON_NAME);
    params.not_before = rcgen::date_time_ymd(2024, 1, 1);
    params.not_after = rcgen::date_time_ymd(2036, 1, 1);

    let key_pair =
        KeyPair::generate().map_err(|e| NodeError::Tls(format!("key generation: {}", e)))?;
    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| NodeError::Tls(format!("self-signing: {}", e)))?;

    Ok((cert.der().to_vec(), key_pair.serialize_der()))
}

pub fn server_config(cert_der: Vec<u8>, key_der: Vec<u8>) -> Result<rustls::ServerConfig, NodeError> {
    // Pick a crypto provider explicitly; multiple providers may be
    // linked in and rustls refuses to guess between them.
    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(
            vec![CertificateDer::from(cert_der)],
            PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_der)),
        )
        .map_err(|e| NodeError::Tls(format!("server config: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_certificate_builds_server_config() {
        let (cert_der, key_der) = generate_certificate().unwrap();
        assert!(!cert_der.is_empty());
        server_config(cert_der, key_der).unwrap();
    }

    #[test]
    fn test_fresh_certificates_differ() {
        let (a, _) = generate_certificate().unwrap();
        let (b, _) = generate_certificate().unwrap();
        assert_ne!(a, b);
    }
}
