use std::{fs, io, path::PathBuf, sync::Arc};

use log::{debug, info, warn};
use tokio::sync::RwLock;
use vrand_common::enclave::{EntropyProvider, SealingProvider, ENTROPY_CHUNK_SIZE};
use zeroize::Zeroize;

use crate::{config::NodeRole, core::error::NodeError};

use super::{VrfKeyPair, VRF_SECRET_KEY_SIZE};

/// Owner of the cluster VRF keypair.
///
/// The key is set at most once per process: recovered from the sealed
/// file, generated (master only), or received from the master (slave
/// only). Later writes are ignored, which makes the race between a
/// slave handler reading the key and a near-simultaneous key push
/// benign.
pub struct KeyStore {
    key: RwLock<Option<VrfKeyPair>>,
    key_file: PathBuf,
    role: NodeRole,
    sealing: Arc<dyn SealingProvider>,
    entropy: Arc<dyn EntropyProvider>,
}

impl KeyStore {
    pub fn new(
        role: NodeRole,
        key_file: PathBuf,
        sealing: Arc<dyn SealingProvider>,
        entropy: Arc<dyn EntropyProvider>,
    ) -> Self {
        Self {
            key: RwLock::new(None),
            key_file,
            role,
            sealing,
            entropy,
        }
    }

    /// Recover the keypair from the sealed file.
    ///
    /// A missing file on the master triggers fresh generation. A
    /// missing file on a slave, or any unseal/decode failure, leaves
    /// the key unset: the node stays up but drops VRF submissions
    /// until a key arrives.
    pub async fn load(&self) -> Result<(), NodeError> {
        let blob = match fs::read(&self.key_file) {
            Ok(blob) => blob,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("no sealed key file at {}", self.key_file.display());
                if self.role.is_master() {
                    return self.generate().await;
                }
                return Ok(());
            }
            Err(e) => {
                warn!("failed to read sealed key file: {}", e);
                return Ok(());
            }
        };

        let mut raw = match self.sealing.unseal(&blob) {
            Ok(raw) => raw,
            Err(e) => {
                warn!("failed to unseal key file: {}", e);
                return Ok(());
            }
        };
        let keypair = match VrfKeyPair::from_scalar_bytes(&raw) {
            Ok(keypair) => keypair,
            Err(e) => {
                raw.zeroize();
                warn!("sealed key file holds invalid key material: {}", e);
                return Ok(());
            }
        };
        raw.zeroize();

        info!(
            "recovered vrf keypair, public key: {}",
            hex::encode(keypair.public_key_bytes())
        );
        let mut guard = self.key.write().await;
        *guard = Some(keypair);
        Ok(())
    }

    /// Generate a fresh keypair from the entropy source and persist
    /// it. Master only, first run.
    async fn generate(&self) -> Result<(), NodeError> {
        let keypair = loop {
            let mut wide = self.draw_entropy();
            let result = VrfKeyPair::from_wide_bytes(&wide);
            wide.zeroize();
            match result {
                Ok(keypair) => break keypair,
                // zero scalar: astronomically unlikely, draw again
                Err(e) => debug!("generated entropy rejected: {}, retrying", e),
            }
        };

        info!(
            "generated new vrf keypair, public key: {}",
            hex::encode(keypair.public_key_bytes())
        );
        self.persist(&keypair)?;
        let mut guard = self.key.write().await;
        *guard = Some(keypair);
        Ok(())
    }

    // 64 bytes drawn in hardware-sized chunks, each chunk retried
    // until the source delivers.
    fn draw_entropy(&self) -> [u8; 2 * VRF_SECRET_KEY_SIZE] {
        let mut out = [0u8; 2 * VRF_SECRET_KEY_SIZE];
        for chunk in out.chunks_mut(ENTROPY_CHUNK_SIZE) {
            loop {
                match self.entropy.fill_chunk(chunk) {
                    Ok(()) => break,
                    Err(e) => debug!("entropy chunk failed: {}, retrying", e),
                }
            }
        }
        out
    }

    /// Seal and write the secret scalar. Any failure here is fatal:
    /// the node must not keep serving with a key it cannot recover
    /// after a restart.
    fn persist(&self, keypair: &VrfKeyPair) -> Result<(), NodeError> {
        let mut secret = keypair.secret_bytes();
        let sealed = self.sealing.seal(&secret);
        secret.zeroize();
        let blob =
            sealed.map_err(|e| NodeError::KeyPersistence(format!("sealing failed: {}", e)))?;

        if let Some(parent) = self.key_file.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| NodeError::KeyPersistence(format!("create dir: {}", e)))?;
            }
        }

        // write-then-rename keeps a crash from leaving a torn file
        let tmp_path = self.key_file.with_extension("tmp");
        fs::write(&tmp_path, &blob)
            .map_err(|e| NodeError::KeyPersistence(format!("write: {}", e)))?;
        restrict_permissions(&tmp_path)
            .map_err(|e| NodeError::KeyPersistence(format!("permissions: {}", e)))?;
        fs::rename(&tmp_path, &self.key_file)
            .map_err(|e| NodeError::KeyPersistence(format!("rename: {}", e)))?;

        debug!("sealed key persisted to {}", self.key_file.display());
        Ok(())
    }

    /// Install the key received from the master. One-shot: if a key is
    /// already set the call is a no-op, preserving key immutability.
    pub async fn set_from_peer(&self, raw: &[u8]) -> Result<(), NodeError> {
        let keypair =
            VrfKeyPair::from_scalar_bytes(raw).map_err(|e| NodeError::InvalidKey(e.to_string()))?;

        {
            let mut guard = self.key.write().await;
            if guard.is_some() {
                debug!("vrf key already set, ignoring key push");
                return Ok(());
            }
            info!(
                "received vrf key from master, public key: {}",
                hex::encode(keypair.public_key_bytes())
            );
            *guard = Some(keypair.clone());
        }

        self.persist(&keypair)
    }

    pub async fn has_key(&self) -> bool {
        self.key.read().await.is_some()
    }

    pub async fn public_key(&self) -> Option<[u8; super::VRF_PUBLIC_KEY_SIZE]> {
        self.key.read().await.as_ref().map(|k| *k.public_key_bytes())
    }

    /// Secret scalar export for the master's key push. None until the
    /// key is set.
    pub async fn secret_bytes(&self) -> Option<[u8; VRF_SECRET_KEY_SIZE]> {
        self.key.read().await.as_ref().map(|k| k.secret_bytes())
    }

    /// Compute `(π, β)` for the given input, or None while no key is
    /// held.
    pub async fn prove(&self, alpha: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>, NodeError> {
        let guard = self.key.read().await;
        match guard.as_ref() {
            Some(keypair) => {
                let proof = keypair
                    .prove(alpha)
                    .map_err(|e| NodeError::Vrf(e.to_string()))?;
                Ok(Some(proof))
            }
            None => Ok(None),
        }
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &std::path::Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &std::path::Path) -> io::Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempdir::TempDir;
    use vrand_common::enclave::{EnclaveError, OsEntropy, SoftwareSealing};

    fn new_store(role: NodeRole, dir: &TempDir) -> KeyStore {
        KeyStore::new(
            role,
            dir.path().join("key.bin"),
            Arc::new(SoftwareSealing::new([9u8; 32])),
            Arc::new(OsEntropy),
        )
    }

    /// Entropy source that fails the first few chunk draws, to
    /// exercise the synchronous retry.
    struct FlakyEntropy {
        failures: AtomicUsize,
    }

    impl EntropyProvider for FlakyEntropy {
        fn fill_chunk(&self, chunk: &mut [u8]) -> Result<(), EnclaveError> {
            if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| {
                if f > 0 { Some(f - 1) } else { None }
            }).is_ok() {
                return Err(EnclaveError::Entropy("transient".to_owned()));
            }
            chunk.fill(0x5a);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_master_generates_on_missing_file() {
        let dir = TempDir::new("keystore").unwrap();
        let store = new_store(NodeRole::Master, &dir);

        store.load().await.unwrap();
        let public = store.public_key().await.unwrap();
        assert_eq!(public.len(), 33);
        assert!(dir.path().join("key.bin").exists());
    }

    #[tokio::test]
    async fn test_slave_stays_degraded_on_missing_file() {
        let dir = TempDir::new("keystore").unwrap();
        let store = new_store(NodeRole::Slave, &dir);

        store.load().await.unwrap();
        assert!(!store.has_key().await);
        assert!(store.prove(b"input").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_generated_key_survives_restart() {
        let dir = TempDir::new("keystore").unwrap();
        let store = new_store(NodeRole::Master, &dir);
        store.load().await.unwrap();
        let public = store.public_key().await.unwrap();

        // same file, fresh store
        let restarted = new_store(NodeRole::Master, &dir);
        restarted.load().await.unwrap();
        assert_eq!(restarted.public_key().await.unwrap(), public);
    }

    #[tokio::test]
    async fn test_corrupt_sealed_file_degrades() {
        let dir = TempDir::new("keystore").unwrap();
        fs::write(dir.path().join("key.bin"), b"definitely not sealed").unwrap();

        let store = new_store(NodeRole::Slave, &dir);
        store.load().await.unwrap();
        assert!(!store.has_key().await);
    }

    #[tokio::test]
    async fn test_set_from_peer_is_one_shot() {
        let dir = TempDir::new("keystore").unwrap();
        let store = new_store(NodeRole::Slave, &dir);
        store.load().await.unwrap();

        store.set_from_peer(&[0x42u8; 32]).await.unwrap();
        let public = store.public_key().await.unwrap();

        // a later push with different bytes must not change the key
        store.set_from_peer(&[0x43u8; 32]).await.unwrap();
        assert_eq!(store.public_key().await.unwrap(), public);
    }

    #[tokio::test]
    async fn test_set_from_peer_rejects_invalid_material() {
        let dir = TempDir::new("keystore").unwrap();
        let store = new_store(NodeRole::Slave, &dir);

        assert!(store.set_from_peer(&[1u8; 7]).await.is_err());
        assert!(!store.has_key().await);
    }

    #[tokio::test]
    async fn test_cross_node_key_consistency() {
        let master_dir = TempDir::new("master").unwrap();
        let master = new_store(NodeRole::Master, &master_dir);
        master.load().await.unwrap();
        let secret = master.secret_bytes().await.unwrap();

        let slave_dir = TempDir::new("slave").unwrap();
        let slave = new_store(NodeRole::Slave, &slave_dir);
        slave.load().await.unwrap();
        slave.set_from_peer(&secret).await.unwrap();

        assert_eq!(
            master.public_key().await.unwrap(),
            slave.public_key().await.unwrap()
        );

        // both sides must produce the identical proof for a hash
        let (pi_master, beta_master) = master.prove(b"aa11").await.unwrap().unwrap();
        let (pi_slave, beta_slave) = slave.prove(b"aa11").await.unwrap().unwrap();
        assert_eq!(pi_master, pi_slave);
        assert_eq!(beta_master, beta_slave);
    }

    #[tokio::test]
    async fn test_generation_retries_flaky_entropy() {
        let dir = TempDir::new("keystore").unwrap();
        let store = KeyStore::new(
            NodeRole::Master,
            dir.path().join("key.bin"),
            Arc::new(SoftwareSealing::new([9u8; 32])),
            Arc::new(FlakyEntropy {
                failures: AtomicUsize::new(5),
            }),
        );

        store.load().await.unwrap();
        assert!(store.has_key().await);
    }
}
