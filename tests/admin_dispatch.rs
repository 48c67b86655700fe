//! Exercises `admin::dispatch` against a live, bootstrapped single-node
//! store, without going through an actual TCP socket.

use dns_raft_store::admin::{dispatch, ERROR, PONG, SUCCESS};
use dns_raft_store::config::NodeConfig;
use dns_raft_store::node;

#[tokio::test(flavor = "multi_thread")]
async fn verbs_behave_per_spec() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let cfg = NodeConfig {
        node_id: 1,
        bind_addr: addr.to_string(),
        join: None,
        log_level: "error".to_string(),
    };
    let handle = node::start(cfg).await.unwrap();
    handle.store.wait_leader().await.expect("leader elected");

    assert_eq!(dispatch(&handle.store, "ping", &[]).await, PONG);
    assert_eq!(dispatch(&handle.store, "get", &["missing_1"]).await, ERROR);

    assert_eq!(
        dispatch(&handle.store, "set", &["name_1", "v1"]).await,
        SUCCESS
    );
    assert_eq!(dispatch(&handle.store, "get", &["name_1"]).await, "v1");

    assert_eq!(dispatch(&handle.store, "del", &["name_1"]).await, SUCCESS);
    assert_eq!(dispatch(&handle.store, "get", &["name_1"]).await, ERROR);

    assert_eq!(dispatch(&handle.store, "bogus", &[]).await, ERROR);
    assert_eq!(dispatch(&handle.store, "set", &["onlyonearg"]).await, ERROR);
}
