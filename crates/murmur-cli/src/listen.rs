use bytes::Bytes;
use crate::common::{setup_ctrlc, PING, PONG};
use crate::events::{elapsed_s, emit, now_iso, EventNode, EventStarted, EventStopped};
use murmur_protocol::{Event, MurmurError, Node};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

pub async fn run(node: Node, groups: Vec<String>, start: Instant) -> anyhow::Result<()> {
    for group in &groups {
        node.join(group.as_str()).await?;
    }
    node.start().await?;

    let name = node.name();
    emit(&EventStarted::new(&name, node.uuid(), node.bound_endpoint(), "listen"));
    eprintln!("Listening as {name} ({}) in {groups:?}", node.uuid());
    eprintln!("Press Ctrl+C to stop.\n");

    let running = setup_ctrlc();
    while running.load(Ordering::Relaxed) {
        // Use a short timeout so we can check the running flag
        let event = match tokio::time::timeout(Duration::from_millis(500), node.recv()).await {
            Ok(Ok(event)) => event,
            Ok(Err(MurmurError::Terminated)) => break,
            Ok(Err(e)) => {
                eprintln!("recv error: {e}");
                break;
            }
            Err(_) => continue,
        };

        emit(&EventNode::new(&event, start));
        if let Event::Whisper {
            peer_uuid, frames, ..
        } = &event
        {
            if frames.first().is_some_and(|f| f.as_ref() == PING.as_bytes()) {
                let reply = std::iter::once(Bytes::from_static(PONG.as_bytes()))
                    .chain(frames.iter().skip(1).cloned());
                if let Err(e) = node.whisper(peer_uuid, reply).await {
                    eprintln!("pong to {peer_uuid} failed: {e}");
                }
            }
        }
    }

    finish(&node, start).await
}

/// Stop the node, print what it saw and emit the counters.
pub async fn finish(node: &Node, start: Instant) -> anyhow::Result<()> {
    node.stop().await?;
    while let Some(event) = node.try_recv() {
        emit(&EventNode::new(&event, start));
    }

    let metrics = node.metrics().snapshot();
    emit(&EventStopped {
        event: "stopped",
        events_received: metrics.events_received,
        whispers_sent: metrics.whispers_sent,
        shouts_sent: metrics.shouts_sent,
        messages_dropped: metrics.messages_dropped,
        elapsed_s: elapsed_s(start),
        timestamp: now_iso(),
    });
    Ok(())
}
