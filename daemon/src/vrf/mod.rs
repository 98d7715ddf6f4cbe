//! VRF key management and the submit/reveal cache.
//!
//! One keypair serves the whole cluster: the master generates (or
//! recovers) it, slaves receive it over the attested channel. Every
//! node then computes identical proofs for the same block hash, so a
//! client can query any member and check the result against the shared
//! public key.

mod cache;
mod keypair;
mod keystore;

pub use cache::{BlockHashRecord, VrfCache};
pub use keypair::{VrfKeyError, VrfKeyPair, VRF_PUBLIC_KEY_SIZE, VRF_SECRET_KEY_SIZE};
pub use keystore::KeyStore;
