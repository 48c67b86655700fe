//! Wire/log payload types and the `openraft::RaftTypeConfig` this crate
//! instantiates the consensus engine with.
//!
//! `Command` is the replicated log payload: an operation tag, a key, and a
//! value (absent for `delete`). It's encoded as a serde-tagged enum, which
//! is self-describing and can grow new variants without breaking old log
//! entries.

use std::io::Cursor;

use openraft::BasicNode;
use serde::{Deserialize, Serialize};

/// Stable member identifier. `u64` rather than a string: cheap to copy,
/// cheap to use as a map key, and the admin protocol's `<node-id>` token is
/// parsed into one at the edge.
pub type NodeId = u64;

/// A single replicated mutation of the KV map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum Command {
    Set { key: String, value: String },
    Delete { key: String },
}

/// Opaque result token returned by `Apply`. Carries no payload — successful
/// commit is the only thing a caller needs to know.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApplyResponse;

openraft::declare_raft_types!(
    /// The concrete type parameters this crate instantiates `openraft::Raft` with.
    pub TypeConfig:
        D = Command,
        R = ApplyResponse,
        NodeId = NodeId,
        Node = BasicNode,
        Entry = openraft::Entry<TypeConfig>,
        SnapshotData = Cursor<Vec<u8>>,
);
