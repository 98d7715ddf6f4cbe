use std::path::PathBuf;

use clap::Parser;
use serde::{Deserialize, Serialize};
use vrand_common::{
    config::{MIN_SECURITY_VERSION, PRODUCT_ID, VERSION},
    crypto::sha256,
    enclave::EnclaveIdentity,
};

use crate::{core::error::NodeError, p2p::PeerDescriptor};

// bind addresses
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8081";

// Sealed key material, relative to the working directory by default
pub const DEFAULT_KEY_FILE: &str = "data/key.bin";
pub const DEFAULT_SEALING_KEY_FILE: &str = "data/sealing.key";

// Mandatory delay between submission and reveal of a VRF output,
// preventing front-running of the randomness
pub const MIN_REVEAL_DELAY_SECS: u64 = 5;

// Upper bound on retained block hash records. The cache is trimmed
// back to this once it grows half again as large.
pub const BLOCK_HASH_CAPACITY: usize = 1_000_000;

// Interval between polls of a peer that is not up yet
pub const PEER_POLL_INTERVAL_SECS: u64 = 5;

// Outbound HTTP client timeout during peer bootstrap
pub const HTTP_CLIENT_TIMEOUT_SECS: u64 = 3;

// Name pinned into the self-signed certificate. Peers dial the server
// by address but validate the certificate against this fixed name,
// trust having been established by attestation rather than a CA.
pub const CERT_COMMON_NAME: &str = "vrand-oracle";

/// Role of this node inside the cluster. Fixed at startup; the master
/// is the unique key source, slaves are passive recipients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Master,
    Slave,
}

impl NodeRole {
    pub fn is_master(&self) -> bool {
        matches!(self, NodeRole::Master)
    }
}

/// Command line configuration
#[derive(Debug, Clone, Parser, Serialize, Deserialize)]
#[command(version = VERSION, about = "vRand clustered attested VRF oracle daemon")]
pub struct Config {
    /// Run this node as the cluster master (unique key source)
    #[clap(short = 'm', long)]
    #[serde(default)]
    pub master: bool,
    /// Bind address for the HTTPS server
    #[clap(short = 'l', long, default_value_t = String::from(DEFAULT_BIND_ADDRESS))]
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    /// Trusted enclave signer identity (hex)
    #[clap(short = 's', long)]
    pub signer: String,
    /// Comma-separated peer addresses
    #[clap(short = 'p', long)]
    pub peers: Option<String>,
    /// Comma-separated peer enclave measurements (hex), one per peer
    #[clap(short = 'u', long)]
    pub peer_measurements: Option<String>,
    /// Path of the sealed VRF key file
    #[clap(long, default_value_t = String::from(DEFAULT_KEY_FILE))]
    #[serde(default = "default_key_file")]
    pub key_file: String,
    /// Path of the local sealing key file (software sealing only)
    #[clap(long, default_value_t = String::from(DEFAULT_SEALING_KEY_FILE))]
    #[serde(default = "default_sealing_key_file")]
    pub sealing_key_file: String,
    /// Override this node's own enclave measurement (hex, software attestation only)
    #[clap(long)]
    pub enclave_measurement: Option<String>,
    /// Set log level (off, error, warn, info, debug, trace)
    #[clap(long, default_value_t = String::from("info"))]
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// JSON config file to load instead of CLI arguments
    #[clap(long)]
    #[serde(skip)]
    pub config_file: Option<String>,
    /// Generate a config file template at the --config-file path and exit
    #[clap(long)]
    #[serde(skip)]
    pub generate_config_template: bool,
}

fn default_listen_address() -> String {
    DEFAULT_BIND_ADDRESS.to_owned()
}

fn default_key_file() -> String {
    DEFAULT_KEY_FILE.to_owned()
}

fn default_sealing_key_file() -> String {
    DEFAULT_SEALING_KEY_FILE.to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

/// Validated node configuration, produced once at startup.
/// All hex decoding and cross-field checks happen here; any failure is
/// fatal before the node touches the network.
#[derive(Debug)]
pub struct NodeConfig {
    pub role: NodeRole,
    pub listen_address: String,
    pub trusted_signer: Vec<u8>,
    pub peers: Vec<PeerDescriptor>,
    pub key_file: PathBuf,
    pub sealing_key_file: PathBuf,
    pub identity: EnclaveIdentity,
}

impl Config {
    pub fn validate(&self) -> Result<NodeConfig, NodeError> {
        let trusted_signer = hex::decode(&self.signer)
            .map_err(|e| NodeError::Config(format!("invalid signer hex: {}", e)))?;
        if trusted_signer.is_empty() {
            return Err(NodeError::Config("signer identity is required".to_owned()));
        }

        let peer_addresses: Vec<String> = split_list(self.peers.as_deref());
        let measurement_hexes: Vec<String> = split_list(self.peer_measurements.as_deref());
        if peer_addresses.len() != measurement_hexes.len() {
            return Err(NodeError::Config(format!(
                "number of peers ({}) does not match number of measurements ({})",
                peer_addresses.len(),
                measurement_hexes.len()
            )));
        }

        let mut peers = Vec::with_capacity(peer_addresses.len());
        for (address, measurement_hex) in peer_addresses.into_iter().zip(measurement_hexes) {
            let measurement = hex::decode(&measurement_hex)
                .map_err(|e| NodeError::Config(format!("invalid peer measurement hex: {}", e)))?;
            peers.push(PeerDescriptor {
                address,
                measurement,
            });
        }

        // Own identity embedded in produced reports. Outside real
        // enclave hardware the measurement is configured (or a fixed
        // development value) and the signer matches the cluster's
        // trusted signer.
        let measurement = match self.enclave_measurement.as_deref() {
            Some(hex_str) => hex::decode(hex_str)
                .map_err(|e| NodeError::Config(format!("invalid enclave measurement hex: {}", e)))?,
            None => sha256(b"vrand-dev-enclave").to_vec(),
        };
        let identity = EnclaveIdentity {
            measurement,
            signer_id: trusted_signer.clone(),
            product_id: PRODUCT_ID,
            security_version: MIN_SECURITY_VERSION,
            debug: false,
        };

        Ok(NodeConfig {
            role: if self.master {
                NodeRole::Master
            } else {
                NodeRole::Slave
            },
            listen_address: self.listen_address.clone(),
            trusted_signer,
            peers,
            key_file: PathBuf::from(&self.key_file),
            sealing_key_file: PathBuf::from(&self.sealing_key_file),
            identity,
        })
    }
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    match raw {
        Some(s) if !s.is_empty() => s.split(',').map(|p| p.trim().to_owned()).collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            master: false,
            listen_address: DEFAULT_BIND_ADDRESS.to_owned(),
            signer: hex::encode([0xbb; 32]),
            peers: None,
            peer_measurements: None,
            key_file: DEFAULT_KEY_FILE.to_owned(),
            sealing_key_file: DEFAULT_SEALING_KEY_FILE.to_owned(),
            enclave_measurement: None,
            log_level: "info".to_owned(),
            config_file: None,
            generate_config_template: false,
        }
    }

    #[test]
    fn test_valid_config() {
        let mut config = base_config();
        config.peers = Some("10.0.0.1:8081,10.0.0.2:8081".to_owned());
        config.peer_measurements = Some(format!(
            "{},{}",
            hex::encode([0x11; 32]),
            hex::encode([0x22; 32])
        ));

        let node_config = config.validate().unwrap();
        assert_eq!(node_config.peers.len(), 2);
        assert_eq!(node_config.peers[0].measurement, vec![0x11; 32]);
        assert_eq!(node_config.role, NodeRole::Slave);
    }

    #[test]
    fn test_peer_measurement_count_mismatch_is_fatal() {
        let mut config = base_config();
        config.peers = Some("10.0.0.1:8081,10.0.0.2:8081".to_owned());
        config.peer_measurements = Some(hex::encode([0x11; 32]));

        let err = config.validate().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_malformed_signer_hex_is_fatal() {
        let mut config = base_config();
        config.signer = "zzzz".to_owned();

        let err = config.validate().unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_empty_signer_rejected() {
        let mut config = base_config();
        config.signer = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_master_flag_selects_role() {
        let mut config = base_config();
        config.master = true;
        assert!(config.validate().unwrap().role.is_master());
    }
}
