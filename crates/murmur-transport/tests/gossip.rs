//! Integration tests: gossip hub relaying tuples between clients.

use std::time::Duration;

use murmur_transport::{Endpoint, GossipClient, GossipHub, GossipMessage};
use tokio::sync::mpsc;

const TIMEOUT: Duration = Duration::from_secs(5);

fn hub_endpoint(tag: &str) -> Endpoint {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .subsec_nanos();
    format!("inproc://gossip-test-{tag}-{nanos:08x}").parse().unwrap()
}

/// Let the hub register new clients and record tuples.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(100)).await;
}

async fn next(rx: &mut mpsc::Receiver<GossipMessage>) -> GossipMessage {
    tokio::time::timeout(TIMEOUT, rx.recv())
        .await
        .expect("gossip delivery timed out")
        .expect("gossip channel closed")
}

#[tokio::test]
async fn published_tuple_reaches_other_clients() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
    let hub = GossipHub::bind(&hub_endpoint("relay")).await.unwrap();

    let (tx_a, mut rx_a) = mpsc::channel(16);
    let (tx_b, mut rx_b) = mpsc::channel(16);
    let a = GossipClient::connect(hub.endpoint(), tx_a).await.unwrap();
    let b = GossipClient::connect(hub.endpoint(), tx_b).await.unwrap();
    settle().await;

    a.publish("AAAA", "inproc://a").await.unwrap();
    assert_eq!(
        next(&mut rx_b).await,
        GossipMessage::Publish {
            key: "AAAA".into(),
            value: "inproc://a".into()
        }
    );

    b.publish("BBBB", "inproc://b").await.unwrap();
    assert_eq!(
        next(&mut rx_a).await,
        GossipMessage::Publish {
            key: "BBBB".into(),
            value: "inproc://b".into()
        }
    );
}

#[tokio::test]
async fn late_client_receives_existing_tuples() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
    let hub = GossipHub::bind(&hub_endpoint("late")).await.unwrap();

    let (tx_a, _rx_a) = mpsc::channel(16);
    let a = GossipClient::connect(hub.endpoint(), tx_a).await.unwrap();
    a.publish("AAAA", "inproc://a").await.unwrap();

    settle().await;

    let (tx_c, mut rx_c) = mpsc::channel(16);
    let _c = GossipClient::connect(hub.endpoint(), tx_c).await.unwrap();
    assert_eq!(
        next(&mut rx_c).await,
        GossipMessage::Publish {
            key: "AAAA".into(),
            value: "inproc://a".into()
        }
    );
}

#[tokio::test]
async fn departing_client_tuples_are_withdrawn() {
    let _ = tracing_subscriber::fmt().with_env_filter("warn").try_init();
    let hub = GossipHub::bind(&hub_endpoint("withdraw")).await.unwrap();

    let (tx_a, _rx_a) = mpsc::channel(16);
    let (tx_b, mut rx_b) = mpsc::channel(16);
    let a = GossipClient::connect(hub.endpoint(), tx_a).await.unwrap();
    let _b = GossipClient::connect(hub.endpoint(), tx_b).await.unwrap();
    settle().await;

    a.publish("AAAA", "inproc://a").await.unwrap();
    assert!(matches!(next(&mut rx_b).await, GossipMessage::Publish { .. }));

    drop(a);
    assert_eq!(
        next(&mut rx_b).await,
        GossipMessage::Unpublish { key: "AAAA".into() }
    );
}
