//! Membership-change decision logic, lifted out of `Store::join`/
//! `Store::leave` as pure functions over a configuration snapshot so the
//! idempotent-rejoin and stale-entry-removal rules are unit-testable
//! without a running cluster.

use std::collections::BTreeMap;

use openraft::BasicNode;

use crate::types::NodeId;

/// What `Store::join` must do to the cluster configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinAction {
    /// Both ID and address already match an existing member exactly.
    NoOp,
    /// Add the new member, first removing the given stale entry (by ID) if
    /// one exists — a server matched on either ID or address alone.
    Apply { remove: Option<NodeId> },
}

/// Membership change algorithm for `Join(id, addr)`, evaluated on the
/// leader:
/// 1. exact `(id, addr)` match => no-op;
/// 2. a match on ID *or* address alone => remove that stale entry first;
/// 3. otherwise => plain add.
pub fn plan_join(
    existing: &BTreeMap<NodeId, BasicNode>,
    new_id: NodeId,
    new_addr: &str,
) -> JoinAction {
    if let Some(node) = existing.get(&new_id) {
        if node.addr == new_addr {
            return JoinAction::NoOp;
        }
        return JoinAction::Apply { remove: Some(new_id) };
    }
    for (&id, node) in existing {
        if node.addr == new_addr {
            return JoinAction::Apply { remove: Some(id) };
        }
    }
    JoinAction::Apply { remove: None }
}

/// Leave algorithm: find by ID, remove it; a missing ID is not an error
/// (idempotent leave).
pub fn plan_leave(existing: &BTreeMap<NodeId, BasicNode>, id: NodeId) -> Option<NodeId> {
    existing.get(&id).map(|_| id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use maplit::btreemap;

    fn node(addr: &str) -> BasicNode {
        BasicNode::new(addr)
    }

    #[test]
    fn exact_match_is_noop() {
        let existing = btreemap! { 1 => node("10.0.0.1:9000") };
        assert_eq!(plan_join(&existing, 1, "10.0.0.1:9000"), JoinAction::NoOp);
    }

    #[test]
    fn same_id_new_address_removes_stale_entry() {
        let existing = btreemap! { 1 => node("10.0.0.1:9000") };
        assert_eq!(
            plan_join(&existing, 1, "10.0.0.2:9000"),
            JoinAction::Apply { remove: Some(1) }
        );
    }

    #[test]
    fn same_address_new_id_removes_stale_entry() {
        let existing = btreemap! { 1 => node("10.0.0.1:9000") };
        assert_eq!(
            plan_join(&existing, 2, "10.0.0.1:9000"),
            JoinAction::Apply { remove: Some(1) }
        );
    }

    #[test]
    fn brand_new_member_has_nothing_to_remove() {
        let existing = btreemap! { 1 => node("10.0.0.1:9000") };
        assert_eq!(
            plan_join(&existing, 2, "10.0.0.2:9000"),
            JoinAction::Apply { remove: None }
        );
    }

    #[test]
    fn leave_missing_member_is_idempotent() {
        let existing: BTreeMap<NodeId, BasicNode> = btreemap! { 1 => node("10.0.0.1:9000") };
        assert_eq!(plan_leave(&existing, 2), None);
    }

    #[test]
    fn leave_existing_member_returns_its_id() {
        let existing = btreemap! { 1 => node("10.0.0.1:9000") };
        assert_eq!(plan_leave(&existing, 1), Some(1));
    }
}
