//! Integration tests: steering how peers reach a node, either by
//! advertising a different endpoint or by connecting without discovery.

use murmur_protocol::testing::{TestCluster, EVENT_TIMEOUT};
use murmur_protocol::{EventCriteria, EventType, Node};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
}

async fn expect_event(
    node: &Node,
    kind: EventType,
    criteria: EventCriteria,
) -> murmur_protocol::Event {
    node.wait_for(kind, criteria, EVENT_TIMEOUT)
        .await
        .unwrap()
        .unwrap_or_else(|| panic!("{} never saw {kind}", node.name()))
}

#[tokio::test]
async fn peers_dial_the_advertised_endpoint() {
    init_tracing();
    let mut cluster = TestCluster::new();
    let b = cluster.started_node(Some("beta")).await.unwrap();

    let a = Node::named("alpha");
    a.set_endpoint("tcp://127.0.0.1:*").await.unwrap();
    let bound = a.bound_endpoint().unwrap();
    let (_, port) = bound.rsplit_once(':').unwrap();
    let advertised = format!("tcp://localhost:{port}");
    a.set_advertised_endpoint(&advertised).unwrap();
    a.gossip_connect(cluster.hub_endpoint()).unwrap();
    a.start().await.unwrap();

    let enter = expect_event(&b, EventType::Enter, EventCriteria::new().peer_uuid(a.uuid())).await;
    assert_eq!(enter.peer_addr(), Some(advertised.as_str()));
    assert_eq!(b.peer_address(a.uuid()).await, Some(advertised));
    expect_event(&a, EventType::Enter, EventCriteria::new().peer_uuid(b.uuid())).await;

    b.whisper(a.uuid(), ["through localhost"]).await.unwrap();
    let whisper = expect_event(&a, EventType::Whisper, EventCriteria::new()).await;
    assert_eq!(whisper.msg().as_deref(), Some("through localhost"));

    a.stop().await.unwrap();
    cluster.stop_all().await;
}

#[test]
fn wildcard_advertised_endpoint_is_rejected() {
    let node = Node::new();
    assert!(node.set_advertised_endpoint("tcp://*:5670").is_err());
    assert!(node.set_advertised_endpoint("tcp://10.0.0.1:*").is_err());
    node.set_advertised_endpoint("tcp://10.0.0.1:5670").unwrap();
}

#[tokio::test]
async fn required_peer_is_reached_without_shared_discovery() {
    init_tracing();
    // separate hubs, so gossip never introduces the two nodes
    let mut east = TestCluster::new();
    let mut west = TestCluster::new();
    let a = east.started_node(Some("alpha")).await.unwrap();
    let b = west.started_node(Some("beta")).await.unwrap();

    a.require_peer(b.uuid(), &b.bound_endpoint().unwrap())
        .await
        .unwrap();

    let enter = expect_event(&b, EventType::Enter, EventCriteria::new().peer_uuid(a.uuid())).await;
    assert_eq!(enter.peer_name(), "alpha");
    expect_event(&a, EventType::Enter, EventCriteria::new().peer_uuid(b.uuid())).await;

    a.whisper(b.uuid(), ["direct"]).await.unwrap();
    let whisper = expect_event(&b, EventType::Whisper, EventCriteria::new()).await;
    assert_eq!(whisper.peer_uuid(), a.uuid());

    // already known: a second request changes nothing
    a.require_peer(b.uuid(), &b.bound_endpoint().unwrap())
        .await
        .unwrap();
    assert_eq!(a.peers().await, vec![b.uuid().to_string()]);

    east.stop_all().await;
    west.stop_all().await;
}
