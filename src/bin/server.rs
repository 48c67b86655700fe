//! Process entry point: parse flags, start the node, wait for
//! `SIGINT`/`SIGTERM`, leave the cluster and shut down. This binary only
//! stands up the replicated KV subsystem — the DNS UDP listener and zone
//! loader are separate collaborators.

use clap::Parser;
use dns_raft_store::config::NodeConfig;
use dns_raft_store::logging;
use dns_raft_store::node;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = NodeConfig::parse();
    logging::init(&cfg.log_level);

    let handle = node::start(cfg).await?;

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received, leaving cluster");
    handle.shutdown().await;

    Ok(())
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = term.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
