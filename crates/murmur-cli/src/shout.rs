use crate::common::setup_ctrlc;
use crate::events::*;
use crate::listen::finish;
use murmur_protocol::{Event, EventCriteria, EventType, Node};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

pub struct ShoutConfig {
    pub group: String,
    pub message: String,
    pub count: u32,
    pub delay_ms: u64,
    pub wait_ms: u64,
}

pub async fn run(node: Node, config: ShoutConfig, start: Instant) -> anyhow::Result<()> {
    node.join(config.group.as_str()).await?;
    node.start().await?;

    let name = node.name();
    emit(&EventStarted::new(&name, node.uuid(), node.bound_endpoint(), "shout"));
    eprintln!("Shout mode as {name} → group: {}", config.group);

    let print = |event: Event| emit(&EventNode::new(&event, start));
    let member = node
        .wait_for_with(
            EventType::Join,
            EventCriteria::new().group(config.group.as_str()),
            Duration::from_millis(config.wait_ms),
            print,
        )
        .await?;
    match member {
        Some(event) => {
            emit(&EventNode::new(&event, start));
            eprintln!("  {} joined, shouting", event.peer_name());
        }
        None => eprintln!("  no member joined within {} ms, shouting anyway", config.wait_ms),
    }

    let running = setup_ctrlc();
    for seq in 1..=config.count {
        if !running.load(Ordering::Relaxed) {
            break;
        }
        node.shout(&config.group, [config.message.clone(), seq.to_string()])
            .await?;
        emit(&EventShout {
            event: "shout",
            group: config.group.clone(),
            seq,
            members: node.peers_by_group(&config.group).await.len(),
            elapsed_s: elapsed_s(start),
        });
        if seq < config.count {
            tokio::time::sleep(Duration::from_millis(config.delay_ms)).await;
        }
    }

    while let Some(event) = node.try_recv() {
        emit(&EventNode::new(&event, start));
    }
    finish(&node, start).await
}
