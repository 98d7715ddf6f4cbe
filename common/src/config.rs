pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// Product identifier embedded in every attestation report.
// Reports carrying any other product are rejected outright.
pub const PRODUCT_ID: u16 = 0x0001;

// Minimum platform security version (patch level) accepted from a peer.
pub const MIN_SECURITY_VERSION: u16 = 2;

// Enclave measurement ("unique ID") size in bytes
pub const MEASUREMENT_SIZE: usize = 32;

// Enclave signer identity size in bytes
pub const SIGNER_ID_SIZE: usize = 32;
