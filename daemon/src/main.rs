use std::{fs::File, io::Write, path::Path, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};
use tokio::sync::watch;
use vrand_common::enclave::{OsEntropy, SoftwareAttestor, SoftwareSealing};
use vrand_daemon::{
    attestation::ReportVerifier,
    config::{Config, PEER_POLL_INTERVAL_SECS},
    core::node::OracleNode,
    p2p::PeerBootstrapper,
    rpc::{tls, OracleRpcServer},
    vrf::{KeyStore, VrfCache},
};

#[tokio::main]
async fn main() -> Result<()> {
    let mut config = Config::parse();
    if let Some(path) = config.config_file.clone() {
        if config.generate_config_template {
            if Path::new(&path).exists() {
                eprintln!("Config file already exists at {}", path);
                return Ok(());
            }
            let mut file = File::create(&path).context("Error while creating config file")?;
            let json = serde_json::to_string_pretty(&config)
                .context("Error while serializing config file")?;
            file.write_all(json.as_bytes())
                .context("Error while writing config file")?;
            println!("Config file template generated at {}", path);
            return Ok(());
        }

        let file = File::open(&path).context("Error while opening config file")?;
        config = serde_json::from_reader(file).context("Error while reading config file")?;
    } else if config.generate_config_template {
        eprintln!("Provided config file path is required to generate the template with --config-file");
        return Ok(());
    }

    let level = config
        .log_level
        .parse()
        .unwrap_or(log::LevelFilter::Info);
    env_logger::Builder::new().filter_level(level).init();

    // all hex decoding and cross-field checks; any failure here is fatal
    let node_config = config.validate().context("Invalid configuration")?;
    info!("vRand daemon starting, master: {}", node_config.role.is_master());

    let sealing = Arc::new(
        SoftwareSealing::from_key_file(&node_config.sealing_key_file)
            .context("Failed to set up sealing")?,
    );
    let attestor = Arc::new(SoftwareAttestor::new(node_config.identity.clone()));
    let keystore = Arc::new(KeyStore::new(
        node_config.role,
        node_config.key_file.clone(),
        sealing,
        Arc::new(OsEntropy),
    ));
    // fatal only when a freshly generated master key cannot be sealed
    keystore.load().await.context("Failed to load VRF key")?;

    let (fatal_tx, mut fatal_rx) = watch::channel(false);
    let (cert_der, key_der) = tls::generate_certificate()?;
    let node = Arc::new(OracleNode::new(
        node_config.role,
        keystore.clone(),
        VrfCache::with_defaults(),
        attestor.clone(),
        cert_der.clone(),
        fatal_tx.clone(),
    ));

    let tls_config = tls::server_config(cert_der, key_der)?;
    let server = OracleRpcServer::new(node, &node_config.listen_address, tls_config).await?;

    // bootstrap runs in the background once the server is up; its
    // polling loop honors the shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    {
        let bootstrapper = PeerBootstrapper::new(
            node_config.peers,
            ReportVerifier::new(attestor, node_config.trusted_signer),
            keystore,
            node_config.role,
            Duration::from_secs(PEER_POLL_INTERVAL_SECS),
            shutdown_rx,
        );
        let fatal_tx = fatal_tx.clone();
        tokio::spawn(async move {
            // give the local server a moment to start listening
            tokio::time::sleep(Duration::from_secs(1)).await;
            if let Err(e) = bootstrapper.run().await {
                error!("peer bootstrap failed: {}", e);
                if e.is_fatal() {
                    let _ = fatal_tx.send(true);
                }
            }
        });
    }

    let mut exit_code = 0;
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
        }
        _ = fatal_rx.changed() => {
            error!("fatal error reported, shutting down");
            exit_code = 1;
        }
    }

    let _ = shutdown_tx.send(true);
    server.stop().await;

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}
