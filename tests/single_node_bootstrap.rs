//! Single-node bootstrap, then set/get/del through the store facade
//! directly (the admin-line-protocol parsing itself is covered by the
//! unit tests in `src/admin.rs`).

use dns_raft_store::config::NodeConfig;
use dns_raft_store::node;

#[tokio::test(flavor = "multi_thread")]
async fn bootstrap_then_set_get_del() {
    // Reserve a real port up front: openraft needs to know the node's own
    // dial-able address (it's what `wait_leader` resolves to), so `:0`
    // won't do here the way it would for a one-shot ephemeral listener.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let real_addr = listener.local_addr().unwrap();
    drop(listener);

    let cfg = NodeConfig {
        node_id: 1,
        bind_addr: real_addr.to_string(),
        join: None,
        log_level: "error".to_string(),
    };

    let handle = node::start(cfg).await.unwrap();

    let leader = handle.store.wait_leader().await;
    assert_eq!(leader.as_deref(), Some(real_addr.to_string().as_str()));

    assert!(handle.store.get("foo_1").is_none());

    handle.store.set("foo_1", "bar").await.unwrap();
    assert_eq!(handle.store.get("foo_1").as_deref(), Some("bar"));

    handle.store.delete("foo_1").await.unwrap();
    assert!(handle.store.get("foo_1").is_none());
}
