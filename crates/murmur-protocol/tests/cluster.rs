//! Integration tests: nodes discovering each other over an in-process
//! gossip hub and exchanging messages.

use std::time::Duration;

use murmur_protocol::testing::{TestCluster, EVENT_TIMEOUT};
use murmur_protocol::{EventCriteria, EventType, MurmurError, Node, NodeConfig};

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

async fn pair(cluster: &mut TestCluster) -> (Node, Node) {
    let a = cluster.started_node(Some("alpha")).await.unwrap();
    let b = cluster.started_node(Some("beta")).await.unwrap();
    expect_event(&a, EventType::Enter, EventCriteria::new().peer_uuid(b.uuid())).await;
    expect_event(&b, EventType::Enter, EventCriteria::new().peer_uuid(a.uuid())).await;
    (a, b)
}

#[tokio::test]
async fn nodes_see_each_other_enter() {
    init_tracing();
    let mut cluster = TestCluster::new();
    let a = cluster
        .started_node_with(Some("alpha"), |n| n.set_header("X-Role", "hub"))
        .await
        .unwrap();
    let b = cluster.started_node(Some("beta")).await.unwrap();

    let enter = expect_event(&b, EventType::Enter, EventCriteria::new().peer_uuid(a.uuid())).await;
    assert_eq!(enter.peer_name(), "alpha");
    assert_eq!(enter.header("X-Role"), Some("hub"));
    let a_addr = a.bound_endpoint().unwrap();
    assert_eq!(enter.peer_addr(), Some(a_addr.as_str()));

    expect_event(&a, EventType::Enter, EventCriteria::new().peer_uuid(b.uuid())).await;

    assert_eq!(b.peers().await, vec![a.uuid().to_string()]);
    assert_eq!(
        b.peer_header_value(a.uuid(), "X-Role").await.as_deref(),
        Some("hub")
    );
    assert_eq!(b.peer_header_value(a.uuid(), "missing").await, None);
    assert_eq!(b.peer_address(a.uuid()).await, Some(a_addr));

    cluster.stop_all().await;
}

#[tokio::test]
async fn joining_and_leaving_is_announced() {
    init_tracing();
    let mut cluster = TestCluster::new();
    let (a, b) = pair(&mut cluster).await;
    b.join("news").await.unwrap();

    let join = expect_event(
        &a,
        EventType::Join,
        EventCriteria::new().peer_uuid(b.uuid()).group("news"),
    )
    .await;
    assert_eq!(join.peer_name(), "beta");
    assert_eq!(b.own_groups().await, vec!["news".to_string()]);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(a.peers_by_group("news").await, vec![b.uuid().to_string()]);
    assert_eq!(a.peer_groups().await, vec!["news".to_string()]);
    assert!(a.peers_by_group("sports").await.is_empty());

    b.leave("news").await.unwrap();
    expect_event(
        &a,
        EventType::Leave,
        EventCriteria::new().peer_uuid(b.uuid()).group("news"),
    )
    .await;
    assert!(a.peers_by_group("news").await.is_empty());

    cluster.stop_all().await;
}

#[tokio::test]
async fn whisper_delivers_every_frame_in_order() {
    init_tracing();
    let mut cluster = TestCluster::new();
    let (a, b) = pair(&mut cluster).await;

    a.whisper(b.uuid(), ["one", "two", "three"]).await.unwrap();
    let whisper = expect_event(&b, EventType::Whisper, EventCriteria::new()).await;
    assert_eq!(whisper.peer_uuid(), a.uuid());
    assert_eq!(whisper.peer_name(), "alpha");
    assert!(whisper.is_multipart());
    let frames: Vec<&[u8]> = whisper.frames().iter().map(|f| f.as_ref()).collect();
    assert_eq!(frames, vec![&b"one"[..], b"two", b"three"]);
    assert_eq!(whisper.msg().as_deref(), Some("one"));
    assert_eq!(a.metrics().whispers_sent.get(), 1);

    cluster.stop_all().await;
}

#[tokio::test]
async fn shout_reaches_group_members_only() {
    init_tracing();
    let mut cluster = TestCluster::new();
    let (a, b) = pair(&mut cluster).await;
    let c = cluster.started_node(Some("gamma")).await.unwrap();
    expect_event(&a, EventType::Enter, EventCriteria::new().peer_uuid(c.uuid())).await;

    b.join("news").await.unwrap();
    expect_event(
        &a,
        EventType::Join,
        EventCriteria::new().peer_uuid(b.uuid()).group("news"),
    )
    .await;

    a.shout("news", ["headline"]).await.unwrap();
    let shout = expect_event(&b, EventType::Shout, EventCriteria::new().group("news")).await;
    assert_eq!(shout.peer_uuid(), a.uuid());
    assert_eq!(shout.msg().as_deref(), Some("headline"));

    let missed = c
        .wait_for(EventType::Shout, EventCriteria::new(), Duration::from_millis(300))
        .await
        .unwrap();
    assert!(missed.is_none());

    cluster.stop_all().await;
}

#[tokio::test]
async fn stop_queues_stop_and_peers_see_exit() {
    init_tracing();
    let mut cluster = TestCluster::new();
    let (a, b) = pair(&mut cluster).await;

    b.stop().await.unwrap();
    let stop = expect_event(&b, EventType::Stop, EventCriteria::new()).await;
    assert_eq!(stop.peer_uuid(), b.uuid());
    assert!(matches!(
        b.recv().await,
        Err(murmur_protocol::MurmurError::Terminated)
    ));

    let exit = expect_event(&a, EventType::Exit, EventCriteria::new().peer_uuid(b.uuid())).await;
    assert_eq!(exit.peer_name(), "beta");
    assert!(a.peers().await.is_empty());

    // stopping twice is harmless
    b.stop().await.unwrap();
    cluster.stop_all().await;
}

#[tokio::test]
async fn whisper_with_no_parts_sends_an_empty_message() {
    init_tracing();
    let mut cluster = TestCluster::new();
    let (a, b) = pair(&mut cluster).await;

    a.whisper(b.uuid(), Vec::<&str>::new()).await.unwrap();
    let whisper = expect_event(&b, EventType::Whisper, EventCriteria::new()).await;
    assert!(whisper.frames().is_empty());
    assert_eq!(whisper.msg(), None);

    cluster.stop_all().await;
}

#[tokio::test]
async fn setters_after_start_are_refused_and_change_nothing() {
    init_tracing();
    let mut cluster = TestCluster::new();
    let a = cluster
        .started_node_with(Some("alpha"), |n| n.set_header("X-Role", "hub"))
        .await
        .unwrap();

    let refused = |r: Result<(), MurmurError>| matches!(r, Err(MurmurError::AlreadyStarted));
    assert!(refused(a.set_name("renamed")));
    assert!(refused(a.set_port(9999)));
    assert!(refused(a.set_interval(Duration::from_millis(10))));
    assert!(refused(a.set_evasive_timeout(Duration::from_millis(10))));
    assert!(refused(a.set_header("X-Role", "leaf")));
    assert!(refused(a.set_verbose(true)));
    assert!(refused(a.gossip_connect("inproc://elsewhere")));
    assert!(refused(a.set_endpoint("inproc://elsewhere").await));
    assert!(refused(a.start().await));

    assert_eq!(a.name(), "alpha");
    let b = cluster.started_node(Some("beta")).await.unwrap();
    let enter = expect_event(&b, EventType::Enter, EventCriteria::new().peer_uuid(a.uuid())).await;
    assert_eq!(enter.peer_name(), "alpha");
    assert_eq!(enter.header("X-Role"), Some("hub"));

    cluster.stop_all().await;
}

#[tokio::test]
async fn unread_events_past_the_buffer_are_dropped_and_counted() {
    init_tracing();
    let mut cluster = TestCluster::new();
    let b = cluster.started_node(Some("beta")).await.unwrap();

    let small = Node::with_config(NodeConfig::new().name("small").event_buffer(1));
    small
        .set_endpoint(&format!("inproc://small-{}", small.uuid()))
        .await
        .unwrap();
    small.gossip_connect(cluster.hub_endpoint()).unwrap();
    small.start().await.unwrap();
    expect_event(&b, EventType::Enter, EventCriteria::new().peer_uuid(small.uuid())).await;

    for i in 0..5 {
        b.whisper(small.uuid(), [format!("msg {i}")]).await.unwrap();
    }
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    while small.metrics().events_dropped.get() < 5 {
        assert!(tokio::time::Instant::now() < deadline, "whispers were never dropped");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    // the one slot still holds the first event
    let first = small.recv().await.unwrap();
    assert_eq!(first.kind(), EventType::Enter);
    assert_eq!(small.metrics().snapshot().events_dropped, 5);

    small.stop().await.unwrap();
    let stop = small.recv().await.unwrap();
    assert_eq!(stop.kind(), EventType::Stop);
    cluster.stop_all().await;
}
