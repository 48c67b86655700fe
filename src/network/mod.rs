//! Raft RPC transport built on top of the single-port multiplexer.
//!
//! `openraft` asks a consumer for a `RaftNetworkFactory` (dial side) and
//! expects the consumer to feed inbound RPCs to the local `Raft` handle
//! itself (accept side) — there's no listener-shaped trait to implement on
//! the receiving end. [`mux::Multiplexer`] plays that listener role
//! regardless: it hands `"rft"`-prefixed connections to
//! [`serve_raft_rpcs`], which reads one framed request per connection and
//! dispatches it into `Raft`.

pub mod mux;
mod wire;

use std::sync::atomic::{AtomicU64, Ordering};

use openraft::error::{InstallSnapshotError, NetworkError, RPCError, RaftError};
use openraft::network::{RPCOption, RaftNetwork, RaftNetworkFactory};
use openraft::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    VoteRequest, VoteResponse,
};
use openraft::BasicNode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::network::mux::{dial_raft, RaftIncoming};
use crate::network::wire::{read_frame, write_frame};
use crate::types::{NodeId, TypeConfig};

/// A single request/response pair is exchanged per dialed `"rft"`
/// connection, the same one-request-per-connection simplicity the admin
/// protocol uses: a fresh TCP connection is cheap and keeps the mux's
/// accept-side dispatch uniform, so there's no need for a persistent
/// multiplexed session per peer.
#[derive(Debug, Serialize, Deserialize)]
enum RaftRpcRequest {
    AppendEntries(AppendEntriesRequest<TypeConfig>),
    Vote(VoteRequest<NodeId>),
    InstallSnapshot(InstallSnapshotRequest<TypeConfig>),
}

#[derive(Debug, Serialize, Deserialize)]
enum RaftRpcResponse {
    AppendEntries(AppendEntriesResponse<NodeId>),
    Vote(VoteResponse<NodeId>),
    InstallSnapshot(InstallSnapshotResponse<NodeId>),
    Error(String),
}

/// `RaftNetworkFactory` impl: hands out one [`NetworkConnection`] per
/// target node. `openraft` already tracks `(NodeId, BasicNode)` pairs in
/// its membership config, so the dial address comes straight from `node`
/// rather than a registry this crate would otherwise have to maintain.
#[derive(Clone, Default)]
pub struct Network;

impl RaftNetworkFactory<TypeConfig> for Network {
    type Network = NetworkConnection;

    async fn new_client(&mut self, target: NodeId, node: &BasicNode) -> Self::Network {
        NetworkConnection {
            target,
            addr: node.addr.clone(),
        }
    }
}

pub struct NetworkConnection {
    target: NodeId,
    addr: String,
}

type AppendErr = RPCError<NodeId, BasicNode, RaftError<NodeId>>;
type VoteErr = RPCError<NodeId, BasicNode, RaftError<NodeId>>;
type SnapshotErr = RPCError<NodeId, BasicNode, RaftError<NodeId, InstallSnapshotError>>;

impl NetworkConnection {
    async fn roundtrip(&self, req: RaftRpcRequest) -> std::io::Result<RaftRpcResponse> {
        let mut stream = dial_raft(&self.addr).await?;
        write_frame(&mut stream, &req).await?;
        read_frame(&mut stream).await
    }
}

impl RaftNetwork<TypeConfig> for NetworkConnection {
    async fn append_entries(
        &mut self,
        rpc: AppendEntriesRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<AppendEntriesResponse<NodeId>, AppendErr> {
        let rsp = self
            .roundtrip(RaftRpcRequest::AppendEntries(rpc))
            .await
            .map_err(|e| RPCError::Network(NetworkError::new(&e)))?;
        match rsp {
            RaftRpcResponse::AppendEntries(r) => Ok(r),
            _ => Err(RPCError::Network(NetworkError::new(&bad_reply(self.target)))),
        }
    }

    async fn install_snapshot(
        &mut self,
        rpc: InstallSnapshotRequest<TypeConfig>,
        _option: RPCOption,
    ) -> Result<InstallSnapshotResponse<NodeId>, SnapshotErr> {
        let rsp = self
            .roundtrip(RaftRpcRequest::InstallSnapshot(rpc))
            .await
            .map_err(|e| RPCError::Network(NetworkError::new(&e)))?;
        match rsp {
            RaftRpcResponse::InstallSnapshot(r) => Ok(r),
            _ => Err(RPCError::Network(NetworkError::new(&bad_reply(self.target)))),
        }
    }

    async fn vote(
        &mut self,
        rpc: VoteRequest<NodeId>,
        _option: RPCOption,
    ) -> Result<VoteResponse<NodeId>, VoteErr> {
        let rsp = self
            .roundtrip(RaftRpcRequest::Vote(rpc))
            .await
            .map_err(|e| RPCError::Network(NetworkError::new(&e)))?;
        match rsp {
            RaftRpcResponse::Vote(r) => Ok(r),
            _ => Err(RPCError::Network(NetworkError::new(&bad_reply(self.target)))),
        }
    }
}

fn bad_reply(target: NodeId) -> std::io::Error {
    std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("unexpected rpc reply shape from node {target}"),
    )
}

static INBOUND_RPCS: AtomicU64 = AtomicU64::new(0);

/// Accept-side loop: drains `"rft"`-prefixed connections handed off by the
/// multiplexer and feeds each one's single framed request into the local
/// `Raft` handle. Runs for the lifetime of the node.
pub async fn serve_raft_rpcs(incoming: RaftIncoming, raft: openraft::Raft<TypeConfig>) {
    while let Some(mut conn) = incoming.accept().await {
        let raft = raft.clone();
        tokio::spawn(async move {
            INBOUND_RPCS.fetch_add(1, Ordering::Relaxed);
            let req: RaftRpcRequest = match read_frame(&mut conn).await {
                Ok(r) => r,
                Err(e) => {
                    debug!(error = %e, "failed to read raft rpc frame");
                    return;
                }
            };

            let rsp = match req {
                RaftRpcRequest::AppendEntries(rpc) => match raft.append_entries(rpc).await {
                    Ok(r) => RaftRpcResponse::AppendEntries(r),
                    Err(e) => RaftRpcResponse::Error(e.to_string()),
                },
                RaftRpcRequest::Vote(rpc) => match raft.vote(rpc).await {
                    Ok(r) => RaftRpcResponse::Vote(r),
                    Err(e) => RaftRpcResponse::Error(e.to_string()),
                },
                RaftRpcRequest::InstallSnapshot(rpc) => match raft.install_snapshot(rpc).await {
                    Ok(r) => RaftRpcResponse::InstallSnapshot(r),
                    Err(e) => RaftRpcResponse::Error(e.to_string()),
                },
            };

            if let Err(e) = write_frame(&mut conn, &rsp).await {
                warn!(error = %e, "failed to write raft rpc response");
            }
        });
    }
}
