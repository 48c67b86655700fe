//! Process configuration flags for a single node in the cluster.

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "dns-raft-serverd", about = "Replicated KV store node")]
pub struct NodeConfig {
    /// Stable node ID for this process, unique within the cluster.
    #[arg(long = "id")]
    pub node_id: u64,

    /// Shared listen address for both Raft and admin traffic: one port,
    /// two sub-protocols.
    #[arg(long = "bind-addr", default_value = "127.0.0.1:15370")]
    pub bind_addr: String,

    /// Admin address of an existing cluster member to join through. Absent
    /// means "bootstrap a new single-node cluster".
    #[arg(long = "join")]
    pub join: Option<String>,

    /// Logging verbosity: error, warn, info, debug, trace.
    #[arg(long = "log-level", default_value = "info")]
    pub log_level: String,
}
