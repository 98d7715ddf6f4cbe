pub mod handlers;
pub mod tls;

use std::{sync::Arc, time::Duration};

use actix_web::{
    dev::ServerHandle,
    web::{self, Data},
    App, HttpServer,
};
use log::{info, warn};
use tokio::sync::Mutex;

use crate::core::{error::NodeError, node::OracleNode};

pub type SharedOracleNode = Arc<OracleNode>;

/// The attested HTTPS endpoint.
///
/// Holds the actix server handle so shutdown can stop it in an
/// orderly fashion.
pub struct OracleRpcServer {
    handle: Mutex<Option<ServerHandle>>,
}

impl OracleRpcServer {
    pub async fn new(
        node: SharedOracleNode,
        bind_address: &str,
        tls: rustls::ServerConfig,
    ) -> Result<Arc<Self>, NodeError> {
        let server = Arc::new(Self {
            handle: Mutex::new(None),
        });

        info!("Starting HTTPS server on {}", bind_address);
        let node_data = Data::from(node.clone());
        let is_master = node.role().is_master();
        let builder = HttpServer::new(move || {
            App::new()
                .app_data(node_data.clone())
                .configure(|cfg| configure_routes(cfg, is_master))
        })
        .disable_signals()
        .client_request_timeout(Duration::from_secs(3))
        .bind_rustls_0_23(bind_address, tls)
        .map_err(|e| NodeError::Tls(format!("bind {}: {}", bind_address, e)))?;

        let http_server = builder.run();
        {
            // save the server handle to be able to stop it later
            let handle = http_server.handle();
            let mut lock = server.handle.lock().await;
            *lock = Some(handle);
        }
        tokio::spawn(http_server);

        Ok(server)
    }

    pub async fn stop(&self) {
        info!("Stopping HTTPS server...");
        let mut handle = self.handle.lock().await;
        if let Some(handle) = handle.take() {
            handle.stop(false).await;
            info!("HTTPS server is now stopped");
        } else {
            warn!("HTTPS server is not running");
        }
    }
}

/// Route table, shared between the real server and the test harness.
/// The key intake route only exists on slave nodes; on a master the
/// path does not resolve at all.
pub fn configure_routes(cfg: &mut web::ServiceConfig, is_master: bool) {
    cfg.route("/", web::get().to(handlers::index))
        .route("/cert", web::get().to(handlers::cert))
        .route("/peer-report", web::get().to(handlers::peer_report))
        .route("/pubkey", web::get().to(handlers::pubkey))
        .route("/blockhash", web::get().to(handlers::submit_block_hash))
        .route("/vrf", web::get().to(handlers::get_vrf))
        .route("/report", web::get().to(handlers::report))
        .route("/token", web::get().to(handlers::token));
    if !is_master {
        cfg.route("/key", web::get().to(handlers::key_intake));
    }
}
