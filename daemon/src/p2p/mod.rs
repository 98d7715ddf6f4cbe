//! Peer bootstrap: mutual attestation and key distribution.
//!
//! Every node verifies every configured peer before trusting anything
//! it served, regardless of role. Strictly speaking a slave could skip
//! verifying the master (the shared public key is checkable from
//! outside), but the uniform rule keeps the trust story simple and
//! costs one extra verification per peer; the asymmetry is deliberate
//! and documented here rather than encoded.
//!
//! The handshake loop polls a peer until it is reachable, validates
//! its attestation report against the expected measurement, and, on a
//! master holding a key, pushes the private scalar over a TLS channel
//! pinned to the peer's just-attested certificate. An attestation
//! failure is fatal to the whole process: trust cannot be partially
//! established.

use std::{net::SocketAddr, sync::Arc, time::Duration};

use log::{debug, info, warn};
use tokio::sync::watch;
use zeroize::Zeroize;

use crate::{
    attestation::ReportVerifier,
    config::{NodeRole, CERT_COMMON_NAME, HTTP_CLIENT_TIMEOUT_SECS},
    core::error::NodeError,
    vrf::KeyStore,
};

/// One configured peer: where to reach it and which enclave code it
/// must be running.
#[derive(Debug, Clone)]
pub struct PeerDescriptor {
    pub address: String,
    pub measurement: Vec<u8>,
}

/// Sequential bootstrap over all configured peers, run once at
/// startup as a background task. Polling honors a shutdown signal so
/// the task can be cancelled while waiting for an unreachable peer.
pub struct PeerBootstrapper {
    peers: Vec<PeerDescriptor>,
    verifier: ReportVerifier,
    keystore: Arc<KeyStore>,
    role: NodeRole,
    poll_interval: Duration,
    shutdown: watch::Receiver<bool>,
}

impl PeerBootstrapper {
    pub fn new(
        peers: Vec<PeerDescriptor>,
        verifier: ReportVerifier,
        keystore: Arc<KeyStore>,
        role: NodeRole,
        poll_interval: Duration,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            peers,
            verifier,
            keystore,
            role,
            poll_interval,
            shutdown,
        }
    }

    pub async fn run(mut self) -> Result<(), NodeError> {
        let peers = std::mem::take(&mut self.peers);
        for peer in &peers {
            if !self.handshake(peer).await? {
                // shutdown requested mid-bootstrap
                return Ok(());
            }
        }
        Ok(())
    }

    /// Handshake one peer. Returns false when shutdown was requested
    /// while waiting.
    async fn handshake(&mut self, peer: &PeerDescriptor) -> Result<bool, NodeError> {
        if *self.shutdown.borrow() {
            return Ok(false);
        }

        // The peer's certificate is self-signed; it gets validated
        // through its attestation report, not the TLS chain.
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(HTTP_CLIENT_TIMEOUT_SECS))
            .build()?;
        let base = format!("https://{}", peer.address);

        let (cert_hex, report_hex) = loop {
            let cert_hex = http_get(&client, &format!("{}/cert", base)).await;
            let report_hex = http_get(&client, &format!("{}/peer-report", base)).await;
            if !cert_hex.is_empty() && !report_hex.is_empty() {
                break (cert_hex, report_hex);
            }
            info!("waiting for peer {}", peer.address);
            tokio::select! {
                _ = tokio::time::sleep(self.poll_interval) => {},
                _ = self.shutdown.changed() => return Ok(false),
            }
        };

        let cert_der = hex::decode(cert_hex.trim())
            .map_err(|e| NodeError::Bootstrap(format!("peer certificate hex: {}", e)))?;
        let report = hex::decode(report_hex.trim())
            .map_err(|e| NodeError::Bootstrap(format!("peer report hex: {}", e)))?;

        self.verifier.verify(&report, &cert_der, &peer.measurement)?;
        info!("verified peer {}", peer.address);

        if self.role.is_master() && self.keystore.has_key().await {
            self.push_key(peer, &cert_der).await;
        }
        Ok(true)
    }

    /// Push the private scalar to a freshly verified peer, over a
    /// client that trusts exactly the peer's attested certificate.
    /// Failure is logged, not fatal: the peer can receive the key on a
    /// later bootstrap.
    async fn push_key(&self, peer: &PeerDescriptor, cert_der: &[u8]) {
        let mut secret = match self.keystore.secret_bytes().await {
            Some(secret) => secret,
            None => return,
        };

        let result = self.send_key(peer, cert_der, &secret).await;
        secret.zeroize();
        match result {
            Ok(()) => info!("sent key to peer {}", peer.address),
            Err(e) => warn!("failed to send key to peer {}: {}", peer.address, e),
        }
    }

    async fn send_key(
        &self,
        peer: &PeerDescriptor,
        cert_der: &[u8],
        secret: &[u8],
    ) -> Result<(), NodeError> {
        let cert = reqwest::Certificate::from_der(cert_der)?;
        let (addr, port) = resolve_peer(&peer.address).await?;

        let client = reqwest::Client::builder()
            .add_root_certificate(cert)
            .resolve(CERT_COMMON_NAME, addr)
            .timeout(Duration::from_secs(HTTP_CLIENT_TIMEOUT_SECS))
            .build()?;

        let url = format!(
            "https://{}:{}/key?k={}",
            CERT_COMMON_NAME,
            port,
            hex::encode(secret)
        );
        let response = client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(NodeError::Bootstrap(format!(
                "key push rejected with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

async fn resolve_peer(address: &str) -> Result<(SocketAddr, u16), NodeError> {
    let addr = match address.parse::<SocketAddr>() {
        Ok(addr) => addr,
        Err(_) => tokio::net::lookup_host(address)
            .await?
            .next()
            .ok_or_else(|| NodeError::Bootstrap(format!("peer {} does not resolve", address)))?,
    };
    Ok((addr, addr.port()))
}

// Empty string stands for "not reachable / not ready yet"; the caller
// keeps polling.
async fn http_get(client: &reqwest::Client, url: &str) -> String {
    match client.get(url).send().await {
        Ok(response) if response.status().is_success() => {
            response.text().await.unwrap_or_default()
        }
        Ok(response) => {
            debug!("GET {} returned {}", url, response.status());
            String::new()
        }
        Err(e) => {
            debug!("GET {} failed: {}", url, e);
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeRole;
    use tempdir::TempDir;
    use vrand_common::enclave::{EnclaveIdentity, OsEntropy, SoftwareAttestor, SoftwareSealing};

    fn test_bootstrapper(
        peers: Vec<PeerDescriptor>,
        shutdown: watch::Receiver<bool>,
        dir: &TempDir,
    ) -> PeerBootstrapper {
        let identity = EnclaveIdentity {
            measurement: vec![0xaa; 32],
            signer_id: vec![0xbb; 32],
            product_id: vrand_common::config::PRODUCT_ID,
            security_version: vrand_common::config::MIN_SECURITY_VERSION,
            debug: false,
        };
        let attestor = Arc::new(SoftwareAttestor::new(identity));
        let keystore = Arc::new(KeyStore::new(
            NodeRole::Slave,
            dir.path().join("key.bin"),
            Arc::new(SoftwareSealing::new([9u8; 32])),
            Arc::new(OsEntropy),
        ));
        PeerBootstrapper::new(
            peers,
            ReportVerifier::new(attestor, vec![0xbb; 32]),
            keystore,
            NodeRole::Slave,
            Duration::from_millis(10),
            shutdown,
        )
    }

    #[tokio::test]
    async fn test_run_with_no_peers_completes() {
        let dir = TempDir::new("bootstrap").unwrap();
        let (_tx, rx) = watch::channel(false);
        let bootstrapper = test_bootstrapper(Vec::new(), rx, &dir);
        bootstrapper.run().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_cancels_polling() {
        let dir = TempDir::new("bootstrap").unwrap();
        let (tx, rx) = watch::channel(false);
        // unreachable peer: without the signal this would poll forever
        let bootstrapper = test_bootstrapper(
            vec![PeerDescriptor {
                address: "127.0.0.1:1".to_owned(),
                measurement: vec![0xaa; 32],
            }],
            rx,
            &dir,
        );

        let handle = tokio::spawn(bootstrapper.run());
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();
        let result = tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
        result.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_before_run_skips_peers() {
        let dir = TempDir::new("bootstrap").unwrap();
        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();
        let bootstrapper = test_bootstrapper(
            vec![PeerDescriptor {
                address: "127.0.0.1:1".to_owned(),
                measurement: vec![0xaa; 32],
            }],
            rx,
            &dir,
        );
        bootstrapper.run().await.unwrap();
    }
}
