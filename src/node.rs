//! Node bootstrap/shutdown: wires the state machine, log store, network,
//! multiplexer, and store facade together, forms or joins a cluster, and
//! tears down cleanly on signal.

use std::collections::BTreeMap;
use std::sync::Arc;

use openraft::BasicNode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{error, info, warn};

use crate::config::NodeConfig;
use crate::fsm::StateMachineStore;
use crate::log_store::LogStore;
use crate::network::mux::Multiplexer;
use crate::network::{serve_raft_rpcs, Network};
use crate::store::Store;
use crate::types::{NodeId, TypeConfig};

pub struct NodeHandle {
    pub store: Arc<Store>,
    raft: openraft::Raft<TypeConfig>,
}

impl NodeHandle {
    /// Best-effort graceful shutdown: leave the cluster, then stop the
    /// consensus engine.
    pub async fn shutdown(&self) {
        if let Err(e) = self.store.leave(self.store.id).await {
            warn!(error = %e, "error leaving cluster during shutdown");
        }
        if let Err(e) = self.raft.shutdown().await {
            warn!(error = %e, "error shutting down raft");
        }
    }
}

pub async fn start(cfg: NodeConfig) -> anyhow::Result<NodeHandle> {
    let addr: std::net::SocketAddr = cfg.bind_addr.parse()?;
    let (mux, raft_incoming) = Multiplexer::bind(addr).await?;

    let raft_config = Arc::new(
        openraft::Config {
            cluster_name: "dns-raft-store".to_string(),
            ..Default::default()
        }
        .validate()?,
    );

    let log_store = LogStore::new();
    let state_machine = StateMachineStore::new();
    let map = state_machine.map.clone();
    let network = Network;

    let raft = openraft::Raft::<TypeConfig>::new(
        cfg.node_id,
        raft_config,
        network,
        log_store,
        state_machine,
    )
    .await?;

    tokio::spawn(serve_raft_rpcs(raft_incoming, raft.clone()));

    let store = Arc::new(Store::new(cfg.node_id, cfg.bind_addr.clone(), raft.clone(), map));
    tokio::spawn(mux.serve(store.clone()));

    match &cfg.join {
        None => {
            info!(id = cfg.node_id, addr = %cfg.bind_addr, "bootstrapping single-node cluster");
            let mut initial: BTreeMap<NodeId, BasicNode> = BTreeMap::new();
            initial.insert(cfg.node_id, BasicNode::new(cfg.bind_addr.clone()));
            raft.initialize(initial).await?;
        }
        Some(join_addr) => {
            info!(target = %join_addr, "joining existing cluster");
            let line = format!("kv join {} {}\n", cfg.bind_addr, cfg.node_id);
            match send_join_request(join_addr, &line).await {
                Ok(reply) => info!(reply = %reply, "join request acknowledged"),
                Err(e) => error!(error = %e, "join request failed"),
            }
        }
    }

    Ok(NodeHandle { store, raft })
}

async fn send_join_request(addr: &str, line: &str) -> std::io::Result<String> {
    let mut stream = TcpStream::connect(addr).await?;
    // `line` already carries the mux's "kv " prefix (see its call site
    // above) — don't write it twice.
    stream.write_all(line.as_bytes()).await?;
    let mut buf = vec![0u8; 1024];
    let n = stream.read(&mut buf).await?;
    buf.truncate(n);
    Ok(String::from_utf8_lossy(&buf).trim_end_matches('\0').to_string())
}
