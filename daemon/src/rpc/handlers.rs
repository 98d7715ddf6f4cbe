//! Route handlers.
//!
//! Every silent no-op in the protocol (malformed hex, duplicate
//! submission, not-yet-ready query, out-of-policy key push) answers
//! with an empty 200 body, indistinguishable from the unknown case.
//! Internal errors never cross the request boundary as panics; they
//! degrade to the same empty body.

use actix_web::{
    web::{Data, Query},
    HttpRequest, HttpResponse, Responder,
};
use log::{debug, info, warn};
use vrand_common::{
    api::daemon::{BlockHashQuery, KeyQuery, VrfResult},
    config,
};

use crate::core::node::OracleNode;

fn empty() -> HttpResponse {
    HttpResponse::Ok().finish()
}

pub async fn index() -> impl Responder {
    HttpResponse::Ok().body(format!("vRand oracle\nRunning on: {}", config::VERSION))
}

/// Hex DER of this node's self-signed certificate.
pub async fn cert(node: Data<OracleNode>) -> impl Responder {
    HttpResponse::Ok().body(hex::encode(node.certificate_der()))
}

/// Attestation report bound to the certificate, for peers running the
/// bootstrap handshake against us.
pub async fn peer_report(node: Data<OracleNode>) -> impl Responder {
    match node.attestor().quote(node.certificate_der()) {
        Ok(report) => HttpResponse::Ok().body(hex::encode(report)),
        Err(e) => {
            warn!("failed to produce certificate report: {}", e);
            empty()
        }
    }
}

/// Compressed VRF public key, or empty while no key is held.
pub async fn pubkey(node: Data<OracleNode>) -> impl Responder {
    match node.keystore().public_key().await {
        Some(public) => HttpResponse::Ok().body(hex::encode(public)),
        None => empty(),
    }
}

/// Submit a block hash for VRF computation. The body is always empty;
/// the result becomes queryable on `/vrf` after the reveal delay.
pub async fn submit_block_hash(
    node: Data<OracleNode>,
    query: Query<BlockHashQuery>,
    request: HttpRequest,
) -> impl Responder {
    let Some(block_hash) = query.b.as_deref() else {
        return empty();
    };
    if let Some(peer_addr) = request.peer_addr() {
        info!("{} sent block hash {}", peer_addr, block_hash);
    }
    node.cache().submit(block_hash, node.keystore()).await;
    empty()
}

/// Reveal `(π, β)` for a submitted block hash once the delay has
/// elapsed.
pub async fn get_vrf(node: Data<OracleNode>, query: Query<BlockHashQuery>) -> impl Responder {
    let Some(block_hash) = query.b.as_deref() else {
        return empty();
    };
    match node.cache().query(block_hash).await {
        Some((proof, output)) => HttpResponse::Ok().json(VrfResult {
            pi: hex::encode(proof),
            beta: hex::encode(output),
        }),
        None => empty(),
    }
}

/// Key intake from the master. Registered on slave nodes only; the
/// one-shot rule in the key store makes repeated pushes harmless.
pub async fn key_intake(node: Data<OracleNode>, query: Query<KeyQuery>) -> impl Responder {
    let Some(key_hex) = query.k.as_deref() else {
        return empty();
    };
    let raw = match hex::decode(key_hex) {
        Ok(raw) => raw,
        Err(_) => return empty(),
    };

    if let Err(e) = node.keystore().set_from_peer(&raw).await {
        if e.is_fatal() {
            // the key is in memory but cannot be sealed
            node.report_fatal(&format!("persisting received key: {}", e));
        } else {
            debug!("rejected key push: {}", e);
        }
    }
    empty()
}

/// Attestation report bound to the VRF public key, for external
/// clients checking which enclave backs the randomness.
pub async fn report(node: Data<OracleNode>) -> impl Responder {
    let Some(public) = node.keystore().public_key().await else {
        return empty();
    };
    match node.attestor().quote(&public) {
        Ok(report) => HttpResponse::Ok().body(hex::encode(report)),
        Err(e) => {
            warn!("failed to produce public key report: {}", e);
            empty()
        }
    }
}

/// Opaque token from the external attestation provider, bound to the
/// VRF public key.
pub async fn token(node: Data<OracleNode>) -> impl Responder {
    let Some(public) = node.keystore().public_key().await else {
        return empty();
    };
    match node.attestor().token(&public) {
        Ok(token) => HttpResponse::Ok().body(token),
        Err(e) => {
            warn!("failed to produce attestation token: {}", e);
            empty()
        }
    }
}
