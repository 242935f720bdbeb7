//! Integration tests: UDP beacon discovery, the default discovery mode.

use std::time::Duration;

use murmur_protocol::testing::EVENT_TIMEOUT;
use murmur_protocol::{EventCriteria, EventType, Node};

/// Off the default port so a real cluster on the host is not disturbed.
const BEACON_PORT: u16 = 45670;
const INTERVAL: Duration = Duration::from_millis(100);

fn beacon_node(name: &str) -> Node {
    let node = Node::named(name);
    node.set_port(BEACON_PORT).unwrap();
    node.set_interval(INTERVAL).unwrap();
    node
}

#[tokio::test]
async fn beacon_peers_join_and_exit() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
    let a = beacon_node("beacon-a");
    a.join("news").await.unwrap();
    let b = beacon_node("beacon-b");
    a.start().await.unwrap();
    b.start().await.unwrap();
    assert!(a.bound_endpoint().unwrap().starts_with("tcp://"));

    let join = b
        .wait_for(
            EventType::Join,
            EventCriteria::new().peer_uuid(a.uuid()).group("news"),
            EVENT_TIMEOUT,
        )
        .await
        .unwrap()
        .expect("beacon-b never saw beacon-a join");
    assert_eq!(join.peer_name(), "beacon-a");
    assert_eq!(b.peers_by_group("news").await, vec![a.uuid().to_string()]);

    a.stop().await.unwrap();
    b.wait_for(EventType::Exit, EventCriteria::new().peer_uuid(a.uuid()), EVENT_TIMEOUT)
        .await
        .unwrap()
        .expect("beacon-b never saw beacon-a exit");
    assert!(b.peers().await.is_empty());

    b.stop().await.unwrap();
}
