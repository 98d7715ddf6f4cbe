use std::fmt;

use k256::{
    elliptic_curve::{ops::Reduce, sec1::ToEncodedPoint, Field},
    ProjectivePoint, Scalar, U256,
};
use thiserror::Error;
use vrf::{
    openssl::{CipherSuite, ECVRF},
    VRF,
};

pub const VRF_SECRET_KEY_SIZE: usize = 32;
pub const VRF_PUBLIC_KEY_SIZE: usize = 33;

#[derive(Debug, Error)]
pub enum VrfKeyError {
    #[error("invalid secret scalar")]
    InvalidScalar,

    #[error("invalid secret key length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("vrf backend error: {0}")]
    Backend(String),
}

/// The cluster VRF keypair: a secp256k1 secret scalar and its
/// compressed public point.
///
/// Proofs use ECVRF-SECP256K1-SHA256-TAI, so any holder of the public
/// key can verify that an output was honestly derived from a given
/// block hash.
#[derive(Clone)]
pub struct VrfKeyPair {
    secret: Scalar,
    public: [u8; VRF_PUBLIC_KEY_SIZE],
}

impl fmt::Debug for VrfKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VrfKeyPair(public: {}, secret: [REDACTED])", hex::encode(self.public))
    }
}

impl VrfKeyPair {
    /// Build a keypair from exactly 32 big-endian scalar bytes,
    /// reduced mod the curve order. Used for sealed-key recovery and
    /// for keys received from the master.
    pub fn from_scalar_bytes(bytes: &[u8]) -> Result<Self, VrfKeyError> {
        if bytes.len() != VRF_SECRET_KEY_SIZE {
            return Err(VrfKeyError::InvalidLength {
                expected: VRF_SECRET_KEY_SIZE,
                actual: bytes.len(),
            });
        }
        let secret = <Scalar as Reduce<U256>>::reduce(U256::from_be_slice(bytes));
        Self::from_scalar(secret)
    }

    /// Build a keypair from 64 bytes of raw entropy, interpreted as a
    /// big-endian integer and reduced mod the curve order. Used for
    /// fresh key generation from the hardware entropy source.
    pub fn from_wide_bytes(bytes: &[u8; 2 * VRF_SECRET_KEY_SIZE]) -> Result<Self, VrfKeyError> {
        Self::from_scalar(reduce_wide(bytes))
    }

    fn from_scalar(secret: Scalar) -> Result<Self, VrfKeyError> {
        if bool::from(secret.is_zero()) {
            return Err(VrfKeyError::InvalidScalar);
        }
        let point = (ProjectivePoint::GENERATOR * secret).to_affine();
        let encoded = point.to_encoded_point(true);
        let public: [u8; VRF_PUBLIC_KEY_SIZE] = encoded
            .as_bytes()
            .try_into()
            .map_err(|_| VrfKeyError::InvalidScalar)?;
        Ok(Self { secret, public })
    }

    /// The 32-byte big-endian secret scalar. Exposed for sealing and
    /// for the master's key push; callers zeroize their copy.
    pub fn secret_bytes(&self) -> [u8; VRF_SECRET_KEY_SIZE] {
        self.secret.to_bytes().into()
    }

    /// Compressed SEC1 public point (33 bytes).
    pub fn public_key_bytes(&self) -> &[u8; VRF_PUBLIC_KEY_SIZE] {
        &self.public
    }

    /// ECVRF prove: returns `(π, β)` for the given input.
    pub fn prove(&self, alpha: &[u8]) -> Result<(Vec<u8>, Vec<u8>), VrfKeyError> {
        let mut ecvrf = suite()?;
        let secret = self.secret_bytes();
        let pi = ecvrf
            .prove(&secret, alpha)
            .map_err(|e| VrfKeyError::Backend(format!("prove: {:?}", e)))?;
        let beta = ecvrf
            .proof_to_hash(&pi)
            .map_err(|e| VrfKeyError::Backend(format!("proof_to_hash: {:?}", e)))?;
        Ok((pi, beta))
    }

    /// ECVRF verify against this keypair's public key; returns β on
    /// success. Mainly for tests and cross-checks, verification by
    /// clients happens outside the cluster.
    pub fn verify(&self, alpha: &[u8], pi: &[u8]) -> Result<Vec<u8>, VrfKeyError> {
        let mut ecvrf = suite()?;
        ecvrf
            .verify(&self.public, pi, alpha)
            .map_err(|e| VrfKeyError::Backend(format!("verify: {:?}", e)))
    }
}

fn suite() -> Result<ECVRF, VrfKeyError> {
    ECVRF::from_suite(CipherSuite::SECP256K1_SHA256_TAI)
        .map_err(|e| VrfKeyError::Backend(format!("suite init: {:?}", e)))
}

// Interpret 64 big-endian bytes as hi * 2^256 + lo mod n, with
// 2^256 mod n assembled as ((2^256 - 1) mod n) + 1.
fn reduce_wide(bytes: &[u8; 64]) -> Scalar {
    let hi = <Scalar as Reduce<U256>>::reduce(U256::from_be_slice(&bytes[..32]));
    let lo = <Scalar as Reduce<U256>>::reduce(U256::from_be_slice(&bytes[32..]));
    let carry = <Scalar as Reduce<U256>>::reduce(U256::MAX) + Scalar::ONE;
    hi * carry + lo
}
