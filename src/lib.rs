//! A replicated key/value store fronted by a single multiplexed TCP port.
//!
//! The key/value map (`fsm`) is replicated by [`openraft`], a Raft
//! consensus engine consumed as an external dependency. Around it sit a
//! connection multiplexer (`network`) that shares one TCP port between Raft
//! peer traffic and a line-oriented admin protocol (`admin`), and a store
//! facade (`store`) that DNS-responder / zone-loader callers are expected to
//! use.
//!
//! Reads are always served from the local replica and never go through
//! consensus: a client that writes to the leader and immediately reads from
//! a follower may observe stale data. Writes are linearized through the
//! current leader; a non-leader node transparently forwards mutating admin
//! requests rather than rejecting them.

pub mod admin;
pub mod config;
pub mod error;
pub mod fsm;
pub mod log_store;
pub mod logging;
pub mod membership;
pub mod network;
pub mod node;
pub mod store;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use store::Store;
pub use types::{Command, NodeId, TypeConfig};
