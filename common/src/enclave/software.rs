//! Portable implementations of the enclave capabilities.
//!
//! These keep the node functional on plain hardware: sealing becomes
//! AEAD encryption under a per-machine key file, attestation produces
//! self-describing reports carrying this node's configured identity,
//! and entropy comes from the operating system CSPRNG. None of them
//! provide hardware isolation; they honor the trait contracts so the
//! rest of the code is identical under a real platform.

use std::{fs, path::Path};

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use log::info;
use rand::{rngs::OsRng, RngCore};

use crate::crypto::sha256;

use super::{
    AttestationProvider, EnclaveError, EnclaveIdentity, EntropyProvider, ReportClaims,
    SealingProvider,
};

const SEALING_KEY_SIZE: usize = 32;
const SEALING_NONCE_SIZE: usize = 12;

/// AEAD sealing under a local key file.
///
/// The key never leaves the machine, which is the closest a software
/// stand-in gets to identity-bound sealing: blobs are unreadable
/// anywhere the key file is absent.
pub struct SoftwareSealing {
    key: [u8; SEALING_KEY_SIZE],
}

impl SoftwareSealing {
    pub fn new(key: [u8; SEALING_KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Load the sealing key from `path`, generating and writing a
    /// fresh one on first run.
    pub fn from_key_file(path: impl AsRef<Path>) -> Result<Self, EnclaveError> {
        let path = path.as_ref();
        if path.exists() {
            let raw = fs::read(path)?;
            let key: [u8; SEALING_KEY_SIZE] = raw.try_into().map_err(|_| {
                EnclaveError::Sealing(format!("invalid sealing key file {}", path.display()))
            })?;
            return Ok(Self::new(key));
        }

        let mut key = [0u8; SEALING_KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, key)?;
        restrict_permissions(path)?;
        info!("Generated sealing key file at {}", path.display());
        Ok(Self::new(key))
    }

    fn cipher(&self) -> Result<ChaCha20Poly1305, EnclaveError> {
        ChaCha20Poly1305::new_from_slice(&self.key)
            .map_err(|e| EnclaveError::Sealing(format!("cipher init: {}", e)))
    }
}

impl SealingProvider for SoftwareSealing {
    fn seal(&self, data: &[u8]) -> Result<Vec<u8>, EnclaveError> {
        let cipher = self.cipher()?;
        let mut nonce_bytes = [0u8; SEALING_NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, data)
            .map_err(|e| EnclaveError::Sealing(format!("encrypt: {}", e)))?;

        let mut blob = Vec::with_capacity(SEALING_NONCE_SIZE + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);
        Ok(blob)
    }

    fn unseal(&self, blob: &[u8]) -> Result<Vec<u8>, EnclaveError> {
        if blob.len() <= SEALING_NONCE_SIZE {
            return Err(EnclaveError::Unsealing("sealed blob too short".to_owned()));
        }
        let cipher = self.cipher()?;
        let (nonce_bytes, ciphertext) = blob.split_at(SEALING_NONCE_SIZE);
        let nonce = Nonce::from_slice(nonce_bytes);
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| EnclaveError::Unsealing(format!("decrypt: {}", e)))
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<(), EnclaveError> {
    use std::os::unix::fs::PermissionsExt;
    let perms = fs::Permissions::from_mode(0o600);
    fs::set_permissions(path, perms)?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<(), EnclaveError> {
    Ok(())
}

/// Attestation stand-in producing self-describing reports.
///
/// A report is the serialized claims of this node's configured
/// identity, bound to the digest of the caller-supplied data. There is
/// no hardware signature to check, so `decode` only parses; deployments
/// that need real isolation guarantees must run a hardware provider.
pub struct SoftwareAttestor {
    identity: EnclaveIdentity,
}

impl SoftwareAttestor {
    pub fn new(identity: EnclaveIdentity) -> Self {
        Self { identity }
    }

    pub fn identity(&self) -> &EnclaveIdentity {
        &self.identity
    }

    fn claims_for(&self, bound_data: &[u8]) -> ReportClaims {
        ReportClaims {
            measurement: self.identity.measurement.clone(),
            signer_id: self.identity.signer_id.clone(),
            product_id: self.identity.product_id,
            security_version: self.identity.security_version,
            debug: self.identity.debug,
            data_digest: sha256(bound_data).to_vec(),
        }
    }
}

impl AttestationProvider for SoftwareAttestor {
    fn quote(&self, bound_data: &[u8]) -> Result<Vec<u8>, EnclaveError> {
        serde_json::to_vec(&self.claims_for(bound_data))
            .map_err(|e| EnclaveError::Attestation(format!("report encoding: {}", e)))
    }

    fn decode(&self, report: &[u8]) -> Result<ReportClaims, EnclaveError> {
        serde_json::from_slice(report)
            .map_err(|e| EnclaveError::MalformedReport(e.to_string()))
    }

    fn token(&self, bound_data: &[u8]) -> Result<String, EnclaveError> {
        // Opaque by contract; hex keeps it transport-safe.
        self.quote(bound_data).map(hex::encode)
    }
}

/// Entropy from the OS CSPRNG, drawn in hardware-sized chunks.
pub struct OsEntropy;

impl EntropyProvider for OsEntropy {
    fn fill_chunk(&self, chunk: &mut [u8]) -> Result<(), EnclaveError> {
        OsRng
            .try_fill_bytes(chunk)
            .map_err(|e| EnclaveError::Entropy(e.to_string()))
    }
}
