//! The key/value finite state machine: the authoritative `name -> record`
//! map applied from the replicated log.
//!
//! A mutex-guarded map, an `apply` that switches on the command's operation
//! tag, and a snapshot/restore pair that clone the whole map.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::{Arc, Mutex};

use openraft::storage::{RaftSnapshotBuilder, RaftStateMachine};
use openraft::{
    EntryPayload, LogId, Snapshot, SnapshotMeta, StorageError, StorageIOError, StoredMembership,
};

use crate::types::{ApplyResponse, Command, NodeId, TypeConfig};

/// The map itself, shared between the state machine and any local reader
/// (`Store::get`). Kept as its own type so tests can seed/inspect it
/// without going through openraft at all.
#[derive(Debug, Default)]
pub struct KvMap {
    inner: Mutex<BTreeMap<String, String>>,
}

impl KvMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never goes through consensus — an intentional latency/availability
    /// trade-off: local reads can observe stale data on a lagging replica.
    pub fn get(&self, key: &str) -> Option<String> {
        self.inner.lock().unwrap().get(key).cloned()
    }

    fn apply_set(&self, key: String, value: String) {
        self.inner.lock().unwrap().insert(key, value);
    }

    fn apply_delete(&self, key: &str) {
        self.inner.lock().unwrap().remove(key);
    }

    fn snapshot_copy(&self) -> BTreeMap<String, String> {
        self.inner.lock().unwrap().clone()
    }

    fn restore_from(&self, m: BTreeMap<String, String>) {
        *self.inner.lock().unwrap() = m;
    }
}

#[derive(Debug)]
struct StateMachineMeta {
    last_applied: Option<LogId<NodeId>>,
    last_membership: StoredMembership<NodeId, openraft::BasicNode>,
}

impl Default for StateMachineMeta {
    fn default() -> Self {
        Self {
            last_applied: None,
            last_membership: StoredMembership::default(),
        }
    }
}

/// Implements both `RaftStateMachine` and (via a cheap `Arc` clone)
/// `RaftSnapshotBuilder` for the engine.
#[derive(Debug, Clone)]
pub struct StateMachineStore {
    pub map: Arc<KvMap>,
    meta: Arc<Mutex<StateMachineMeta>>,
}

impl StateMachineStore {
    pub fn new() -> Self {
        Self {
            map: Arc::new(KvMap::new()),
            meta: Arc::new(Mutex::new(StateMachineMeta::default())),
        }
    }
}

impl RaftSnapshotBuilder<TypeConfig> for StateMachineStore {
    async fn build_snapshot(&mut self) -> Result<Snapshot<TypeConfig>, StorageError<NodeId>> {
        let (last_applied, last_membership) = {
            let meta = self.meta.lock().unwrap();
            (meta.last_applied, meta.last_membership.clone())
        };
        // Clone the map under its own mutex, then release it before the
        // (potentially large) serialization below.
        let snapshot = self.map.snapshot_copy();
        let data = serde_json::to_vec(&snapshot)
            .map_err(|e| StorageIOError::read_snapshot(None, &e))?;

        let snapshot_id = match last_applied {
            Some(id) => format!("{}-{}-{}", id.leader_id, id.index, data.len()),
            None => format!("empty-{}", data.len()),
        };

        let meta = SnapshotMeta {
            last_log_id: last_applied,
            last_membership,
            snapshot_id,
        };

        Ok(Snapshot {
            meta,
            snapshot: Box::new(Cursor::new(data)),
        })
    }
}

impl RaftStateMachine<TypeConfig> for StateMachineStore {
    type SnapshotBuilder = Self;

    async fn applied_state(
        &mut self,
    ) -> Result<
        (
            Option<LogId<NodeId>>,
            StoredMembership<NodeId, openraft::BasicNode>,
        ),
        StorageError<NodeId>,
    > {
        let meta = self.meta.lock().unwrap();
        Ok((meta.last_applied, meta.last_membership.clone()))
    }

    async fn apply<I>(&mut self, entries: I) -> Result<Vec<ApplyResponse>, StorageError<NodeId>>
    where
        I: IntoIterator<Item = openraft::Entry<TypeConfig>> + Send,
    {
        let mut responses = Vec::new();
        for entry in entries {
            {
                let mut meta = self.meta.lock().unwrap();
                meta.last_applied = Some(entry.log_id);
            }
            match entry.payload {
                EntryPayload::Blank => {}
                EntryPayload::Normal(cmd) => {
                    apply_command(&self.map, cmd);
                }
                EntryPayload::Membership(mem) => {
                    let mut meta = self.meta.lock().unwrap();
                    meta.last_membership =
                        StoredMembership::new(Some(entry.log_id), mem);
                }
            }
            responses.push(ApplyResponse);
        }
        Ok(responses)
    }

    async fn begin_receiving_snapshot(
        &mut self,
    ) -> Result<Box<Cursor<Vec<u8>>>, StorageError<NodeId>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta<NodeId, openraft::BasicNode>,
        snapshot: Box<Cursor<Vec<u8>>>,
    ) -> Result<(), StorageError<NodeId>> {
        let data = snapshot.into_inner();
        let restored: BTreeMap<String, String> = serde_json::from_slice(&data)
            .map_err(|e| StorageIOError::read_snapshot(Some(meta.signature()), &e))?;
        // openraft guarantees install_snapshot never overlaps apply, so a
        // plain overwrite is sound.
        self.map.restore_from(restored);
        let mut m = self.meta.lock().unwrap();
        m.last_applied = meta.last_log_id;
        m.last_membership = meta.last_membership.clone();
        Ok(())
    }

    async fn get_current_snapshot(&mut self) -> Result<Option<Snapshot<TypeConfig>>, StorageError<NodeId>> {
        // This store never persists a standing snapshot file; a fresh one
        // is always built on demand by `build_snapshot`. Returning `None`
        // tells openraft there is nothing to serve from a cache.
        Ok(None)
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        self.clone()
    }
}

fn apply_command(map: &KvMap, cmd: Command) {
    match cmd {
        Command::Set { key, value } => map.apply_set(key, value),
        Command::Delete { key } => map.apply_delete(&key),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get() {
        let map = KvMap::new();
        apply_command(&map, Command::Set { key: "a_1".into(), value: "v1".into() });
        assert_eq!(map.get("a_1"), Some("v1".to_string()));
    }

    #[test]
    fn delete_removes_key() {
        let map = KvMap::new();
        apply_command(&map, Command::Set { key: "a_1".into(), value: "v1".into() });
        apply_command(&map, Command::Delete { key: "a_1".into() });
        assert_eq!(map.get("a_1"), None);
    }

    #[test]
    fn snapshot_round_trip() {
        let map = KvMap::new();
        for i in 0..1000 {
            map.apply_set(format!("name{i}_1"), format!("v{i}"));
        }
        let snapshot = map.snapshot_copy();

        let restored_map = KvMap::new();
        restored_map.restore_from(snapshot.clone());

        assert_eq!(restored_map.snapshot_copy(), snapshot);
        assert_eq!(snapshot.len(), 1000);
    }

    #[tokio::test]
    async fn build_snapshot_then_install_round_trips() {
        let mut sm = StateMachineStore::new();
        sm.map.apply_set("foo_1".into(), "bar".into());

        let snap = sm.build_snapshot().await.unwrap();
        let bytes = snap.snapshot.into_inner();

        let mut fresh = StateMachineStore::new();
        fresh
            .install_snapshot(&snap.meta, Box::new(Cursor::new(bytes)))
            .await
            .unwrap();

        assert_eq!(fresh.map.get("foo_1"), Some("bar".to_string()));
    }
}
