use crate::common::{setup_ctrlc, PING, PONG};
use crate::events::*;
use crate::listen::finish;
use indexmap::IndexMap;
use murmur_protocol::{Event, MurmurError, Node};
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

pub struct PingConfig {
    pub count: u32,
    pub delay_ms: u64,
    pub duration_s: u64,
}

#[derive(Default)]
struct PeerState {
    sent: u32,
    outstanding: HashMap<u32, Instant>,
    rtts: Vec<f64>,
}

impl PeerState {
    fn done(&self, count: u32) -> bool {
        self.sent >= count && self.outstanding.is_empty()
    }

    fn summary(&self, peer: &str) -> EventPingSummary {
        let min = self.rtts.iter().copied().fold(f64::INFINITY, f64::min);
        let max = self.rtts.iter().copied().fold(0.0, f64::max);
        let avg = if self.rtts.is_empty() {
            0.0
        } else {
            self.rtts.iter().sum::<f64>() / self.rtts.len() as f64
        };
        EventPingSummary {
            event: "ping_summary",
            peer: peer.to_string(),
            sent: self.sent,
            received: self.rtts.len() as u32,
            rtt_min_ms: if min.is_finite() { min } else { 0.0 },
            rtt_max_ms: max,
            rtt_avg_ms: avg,
        }
    }
}

pub async fn run(node: Node, config: PingConfig, start: Instant) -> anyhow::Result<()> {
    node.start().await?;

    let name = node.name();
    emit(&EventStarted::new(&name, node.uuid(), node.bound_endpoint(), "ping"));
    eprintln!("Ping mode as {name}: {} pings per peer", config.count);

    let running = setup_ctrlc();
    let deadline = start + Duration::from_secs(config.duration_s);
    let mut tick = tokio::time::interval(Duration::from_millis(config.delay_ms.max(1)));
    let mut peers: IndexMap<String, PeerState> = IndexMap::new();

    while running.load(Ordering::Relaxed) && Instant::now() < deadline {
        if !peers.is_empty() && peers.values().all(|p| p.done(config.count)) {
            break;
        }

        tokio::select! {
            _ = tick.tick() => {
                for (peer, state) in peers.iter_mut().filter(|(_, s)| s.sent < config.count) {
                    state.sent += 1;
                    let seq = state.sent;
                    state.outstanding.insert(seq, Instant::now());
                    if let Err(e) = node.whisper(peer, [PING.to_string(), seq.to_string()]).await {
                        eprintln!("ping {seq} to {peer} failed: {e}");
                    }
                }
            }
            received = tokio::time::timeout(Duration::from_millis(500), node.recv()) => {
                let event = match received {
                    Ok(Ok(event)) => event,
                    Ok(Err(MurmurError::Terminated)) => break,
                    Ok(Err(e)) => {
                        eprintln!("recv error: {e}");
                        break;
                    }
                    Err(_) => continue,
                };
                match &event {
                    Event::Enter { peer_uuid, peer_name, .. } => {
                        eprintln!("  peer {peer_name} ({peer_uuid}) entered");
                        peers.entry(peer_uuid.clone()).or_default();
                    }
                    Event::Whisper { peer_uuid, frames, .. } => {
                        let pong = frames.first().is_some_and(|f| f.as_ref() == PONG.as_bytes());
                        let seq = frames
                            .get(1)
                            .and_then(|f| std::str::from_utf8(f).ok())
                            .and_then(|s| s.parse::<u32>().ok());
                        let state = peers.get_mut(peer_uuid);
                        if let (true, Some(seq), Some(state)) = (pong, seq, state) {
                            if let Some(sent_at) = state.outstanding.remove(&seq) {
                                let rtt_ms = sent_at.elapsed().as_secs_f64() * 1000.0;
                                state.rtts.push(rtt_ms);
                                emit(&EventPing {
                                    event: "ping",
                                    peer: peer_uuid.clone(),
                                    seq,
                                    rtt_ms,
                                    elapsed_s: elapsed_s(start),
                                });
                            }
                        }
                    }
                    _ => emit(&EventNode::new(&event, start)),
                }
            }
        }
    }

    for (peer, state) in &peers {
        emit(&state.summary(peer));
    }
    if peers.is_empty() {
        eprintln!("No peers entered.");
    }
    finish(&node, start).await
}
