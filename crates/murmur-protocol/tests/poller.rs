//! Integration tests: one poller over several running nodes.

use std::time::Duration;

use murmur_protocol::testing::{TestCluster, EVENT_TIMEOUT};
use murmur_protocol::{Event, EventType, MurmurError, Poller};

#[tokio::test]
async fn poller_reports_each_node_with_traffic() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
    let mut cluster = TestCluster::new();
    let a = cluster.started_node(Some("alpha")).await.unwrap();
    let b = cluster.started_node(Some("beta")).await.unwrap();
    let poller = Poller::with_nodes([&a, &b]);

    let mut entered = Vec::new();
    while entered.len() < 2 {
        let ready = poller
            .wait(Some(EVENT_TIMEOUT))
            .await
            .unwrap()
            .expect("no node became ready");
        let event = ready.try_recv().expect("ready node had no event");
        if event.kind() == EventType::Enter {
            entered.push((ready.uuid().to_string(), event.peer_uuid().to_string()));
        }
    }
    entered.sort();
    let mut expected = vec![
        (a.uuid().to_string(), b.uuid().to_string()),
        (b.uuid().to_string(), a.uuid().to_string()),
    ];
    expected.sort();
    assert_eq!(entered, expected);

    // drained: nothing left to report
    while a.try_recv().is_some() || b.try_recv().is_some() {}
    assert!(poller
        .wait(Some(Duration::from_millis(50)))
        .await
        .unwrap()
        .is_none());

    cluster.stop_all().await;
}

#[tokio::test]
async fn poller_sees_events_read_with_from_node() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
    let mut cluster = TestCluster::new();
    let a = cluster.started_node(Some("alpha")).await.unwrap();
    let b = cluster.started_node(Some("beta")).await.unwrap();
    let poller = Poller::with_nodes([&b]);

    let ready = poller.wait(Some(EVENT_TIMEOUT)).await.unwrap().unwrap();
    assert_eq!(ready, b);
    let event = Event::from_node(&ready).await.unwrap();
    assert_eq!(event.kind(), EventType::Enter);
    assert_eq!(event.peer_uuid(), a.uuid());

    cluster.stop_all().await;
}

#[tokio::test]
async fn interrupted_wait_fails_without_waiting_for_the_timeout() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
    let mut cluster = TestCluster::new();
    let a = cluster.started_node(None).await.unwrap();
    let poller = Poller::with_nodes([&a]);

    poller.interrupt_token().cancel();
    let started = tokio::time::Instant::now();
    assert!(matches!(
        poller.wait(Some(Duration::from_secs(10))).await,
        Err(MurmurError::Interrupted)
    ));
    assert!(started.elapsed() < Duration::from_secs(1));

    cluster.stop_all().await;
}
