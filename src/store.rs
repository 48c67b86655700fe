//! Store facade: the public surface consumed by the admin protocol
//! locally, and by DNS responder / zone loader collaborators out of this
//! crate's scope.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use openraft::BasicNode;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::info;

use crate::error::{StoreError, StoreResult};
use crate::fsm::KvMap;
use crate::membership::{plan_join, plan_leave, JoinAction};
use crate::types::{Command, NodeId, TypeConfig};

/// How long a local `client_write` may take before it's surfaced as an
/// error.
const APPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Forwarded-request deadline: `APPLY_TIMEOUT` plus slack for the extra
/// network hop, so a forwarding follower never blocks on an unbounded
/// read.
const FORWARD_TIMEOUT: Duration = APPLY_TIMEOUT.saturating_add(Duration::from_secs(2));

/// Bounds how long `wait_leader` polls before giving up.
const WAIT_LEADER_TIMEOUT: Duration = Duration::from_secs(10);
const WAIT_LEADER_POLL: Duration = Duration::from_secs(1);

const FORWARD_READ_CAP: usize = 1024;

pub struct Store {
    pub id: NodeId,
    pub self_addr: String,
    raft: openraft::Raft<TypeConfig>,
    map: Arc<KvMap>,
}

impl Store {
    pub fn new(id: NodeId, self_addr: String, raft: openraft::Raft<TypeConfig>, map: Arc<KvMap>) -> Self {
        Self { id, self_addr, raft, map }
    }

    /// Local replica read; never goes through consensus.
    pub fn get(&self, key: &str) -> Option<String> {
        self.map.get(key)
    }

    pub async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let cmd = Command::Set { key: key.to_string(), value: value.to_string() };
        self.write(cmd, format!("kv set {key} {value}\n")).await
    }

    pub async fn delete(&self, key: &str) -> StoreResult<()> {
        let cmd = Command::Delete { key: key.to_string() };
        self.write(cmd, format!("kv del {key}\n")).await
    }

    /// `join_str`/`leave_str` accept the admin protocol's raw string
    /// arguments so `admin::dispatch` never has to know this facade's
    /// internal ID type.
    pub async fn join_str(&self, node_id: &str, raft_addr: &str) -> StoreResult<()> {
        let id: NodeId = node_id.parse().map_err(|_| StoreError::Malformed)?;
        self.join(id, raft_addr).await
    }

    pub async fn leave_str(&self, node_id: &str) -> StoreResult<()> {
        let id: NodeId = node_id.parse().map_err(|_| StoreError::Malformed)?;
        self.leave(id).await
    }

    pub async fn join(&self, new_id: NodeId, new_addr: &str) -> StoreResult<()> {
        if !self.is_leader() {
            let line = format!("kv join {new_addr} {new_id}\n");
            return self.forward(&line).await;
        }

        let existing = self.current_members();
        match plan_join(&existing, new_id, new_addr) {
            JoinAction::NoOp => {
                info!(id = new_id, addr = new_addr, "join is a no-op, already a member");
                Ok(())
            }
            JoinAction::Apply { remove } => {
                let mut voters = self.current_voter_ids();
                if let Some(stale) = remove {
                    voters.remove(&stale);
                    self.raft
                        .change_membership(voters.clone(), false)
                        .await
                        .map_err(membership_error)?;
                }
                self.raft
                    .add_learner(new_id, BasicNode::new(new_addr), true)
                    .await
                    .map_err(membership_error)?;
                voters.insert(new_id);
                self.raft
                    .change_membership(voters, false)
                    .await
                    .map_err(membership_error)?;
                info!(id = new_id, addr = new_addr, "node joined successfully");
                Ok(())
            }
        }
    }

    pub async fn leave(&self, id: NodeId) -> StoreResult<()> {
        if !self.is_leader() {
            let line = format!("kv leave {id}\n");
            return self.forward(&line).await;
        }

        let existing = self.current_members();
        match plan_leave(&existing, id) {
            None => {
                info!(id, "leave: node is not a member, treating as success");
                Ok(())
            }
            Some(id) => {
                let mut voters = self.current_voter_ids();
                voters.remove(&id);
                self.raft
                    .change_membership(voters, false)
                    .await
                    .map_err(membership_error)?;
                info!(id, "node left successfully");
                Ok(())
            }
        }
    }

    /// Polls membership metrics for a known leader address, bounded by
    /// `WAIT_LEADER_TIMEOUT`.
    pub async fn wait_leader(&self) -> Option<String> {
        let deadline = Instant::now() + WAIT_LEADER_TIMEOUT;

        loop {
            if let Some(leader_id) = self.current_leader() {
                if let Some(addr) = self.node_addr(leader_id) {
                    return Some(addr);
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }

            let mut metrics_rx = self.raft.metrics();
            let tick = tokio::time::sleep(remaining.min(WAIT_LEADER_POLL));
            tokio::select! {
                _ = metrics_rx.changed() => {}
                _ = tick => {}
            }
        }
    }

    pub fn is_leader(&self) -> bool {
        self.current_leader() == Some(self.id)
    }

    fn current_leader(&self) -> Option<NodeId> {
        self.raft.metrics().borrow().current_leader
    }

    fn current_members(&self) -> BTreeMap<NodeId, BasicNode> {
        self.raft
            .metrics()
            .borrow()
            .membership_config
            .membership()
            .nodes()
            .map(|(id, node)| (*id, node.clone()))
            .collect()
    }

    fn current_voter_ids(&self) -> std::collections::BTreeSet<NodeId> {
        self.raft
            .metrics()
            .borrow()
            .membership_config
            .membership()
            .voter_ids()
            .collect()
    }

    fn node_addr(&self, id: NodeId) -> Option<String> {
        self.current_members().get(&id).map(|n| n.addr.clone())
    }

    async fn write(&self, cmd: Command, forward_line: String) -> StoreResult<()> {
        if self.is_leader() {
            let timed = tokio::time::timeout(APPLY_TIMEOUT, self.raft.client_write(cmd)).await;
            return match timed {
                Ok(Ok(_)) => Ok(()),
                Ok(Err(e)) => Err(apply_error(e)),
                Err(_) => Err(StoreError::Apply("timed out".to_string())),
            };
        }
        self.forward(&forward_line).await
    }

    /// Write forwarding: wait for a leader, dial it, write the raw command
    /// line, read up to 1 KiB, trim trailing NULs, compare
    /// case-insensitively to `SUCCESS`.
    async fn forward(&self, line: &str) -> StoreResult<()> {
        let leader_addr = self
            .wait_leader()
            .await
            .ok_or(StoreError::NoKnownLeader)?;

        let fut = forward_request(&leader_addr, line);
        match tokio::time::timeout(FORWARD_TIMEOUT, fut).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(StoreError::ForwardTimeout),
        }
    }
}

async fn forward_request(leader_addr: &str, line: &str) -> StoreResult<()> {
    let mut stream = TcpStream::connect(leader_addr)
        .await
        .map_err(|e| StoreError::Forward(e.to_string()))?;
    // `line` already carries the mux's "kv " prefix (see the `format!` call
    // sites in `set`/`delete`/`join`/`leave`) — don't write it twice.
    stream
        .write_all(line.as_bytes())
        .await
        .map_err(|e| StoreError::Forward(e.to_string()))?;

    let mut buf = vec![0u8; FORWARD_READ_CAP];
    let n = stream
        .read(&mut buf)
        .await
        .map_err(|e| StoreError::Forward(e.to_string()))?;
    buf.truncate(n);
    let text = String::from_utf8_lossy(&buf);
    let text = text.trim_end_matches('\0');

    if text.eq_ignore_ascii_case("SUCCESS") {
        Ok(())
    } else {
        Err(StoreError::Forward(text.to_string()))
    }
}

fn apply_error<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Apply(e.to_string())
}

fn membership_error<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Membership(e.to_string())
}
