use std::sync::Arc;

use log::error;
use tokio::sync::watch;
use vrand_common::enclave::AttestationProvider;

use crate::{
    config::NodeRole,
    vrf::{KeyStore, VrfCache},
};

/// Everything the request handlers need, assembled once at startup.
pub struct OracleNode {
    role: NodeRole,
    keystore: Arc<KeyStore>,
    cache: VrfCache,
    attestor: Arc<dyn AttestationProvider>,
    cert_der: Vec<u8>,
    fatal: watch::Sender<bool>,
}

impl OracleNode {
    pub fn new(
        role: NodeRole,
        keystore: Arc<KeyStore>,
        cache: VrfCache,
        attestor: Arc<dyn AttestationProvider>,
        cert_der: Vec<u8>,
        fatal: watch::Sender<bool>,
    ) -> Self {
        Self {
            role,
            keystore,
            cache,
            attestor,
            cert_der,
            fatal,
        }
    }

    pub fn role(&self) -> NodeRole {
        self.role
    }

    pub fn keystore(&self) -> &KeyStore {
        &self.keystore
    }

    pub fn cache(&self) -> &VrfCache {
        &self.cache
    }

    pub fn attestor(&self) -> &dyn AttestationProvider {
        self.attestor.as_ref()
    }

    /// DER of the self-signed certificate the HTTPS endpoint serves.
    pub fn certificate_der(&self) -> &[u8] {
        &self.cert_der
    }

    /// Request an orderly process shutdown after an unrecoverable
    /// failure inside a handler (e.g. the sealed key can no longer be
    /// written). The main task owns the receiving end.
    pub fn report_fatal(&self, context: &str) {
        error!("fatal failure: {}", context);
        let _ = self.fatal.send(true);
    }
}
