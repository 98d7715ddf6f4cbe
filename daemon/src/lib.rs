// vRand Daemon Library
// Exposes internal modules for integration testing

extern crate log;

pub mod attestation;
pub mod config;
pub mod core;
pub mod p2p;
pub mod rpc;

// VRF key management and the submit/reveal cache
pub mod vrf;
