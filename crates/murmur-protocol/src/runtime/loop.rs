/// The node runtime event loop.
///
/// A single task owns the roster, the liveness tracker and the discovery
/// handles, and multiplexes over commands, link traffic, discovery and the
/// heartbeat timer.
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use indexmap::{IndexMap, IndexSet};
use murmur_transport::{BeaconPacket, Endpoint, GossipMessage, LinkSecurity, WireMessage};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::{links, BeaconDiscovery, Discovery, GossipDiscovery, Identity, Inbound, NodeCommand};
use crate::config::NodeConfig;
use crate::inbox::{Inbox, PushOutcome};
use crate::liveness::{LivenessEvent, LivenessTracker};
use crate::metrics::NodeMetrics;
use crate::roster::{Peer, Roster, SendOutcome};
use crate::Event;

pub(super) struct RuntimeParts {
    pub(super) identity: Arc<Identity>,
    pub(super) config: NodeConfig,
    pub(super) groups: IndexSet<String>,
    pub(super) advertised: String,
    pub(super) security: LinkSecurity,
    pub(super) inbox: Arc<Inbox>,
    pub(super) metrics: Arc<NodeMetrics>,
    pub(super) inbound_tx: mpsc::Sender<Inbound>,
    pub(super) cancel: CancellationToken,
}

/// Mutable protocol state of one running node.
pub(super) struct Runtime {
    identity: Arc<Identity>,
    config: NodeConfig,
    groups: IndexSet<String>,
    /// Bumped on every join/leave and announced alongside them.
    status: u8,
    advertised: String,
    security: LinkSecurity,
    roster: Roster,
    liveness: LivenessTracker,
    inbox: Arc<Inbox>,
    metrics: Arc<NodeMetrics>,
    inbound_tx: mpsc::Sender<Inbound>,
    cancel: CancellationToken,
    next_link_id: u64,
}

/// Main event loop. Returns after STOP or when every node handle is gone.
pub(super) async fn runtime_loop(
    mut rt: Runtime,
    discovery: Discovery,
    mut cmd_rx: mpsc::Receiver<NodeCommand>,
    mut inbound_rx: mpsc::Receiver<Inbound>,
) {
    let Discovery {
        beacon,
        mut gossip,
    } = discovery;
    let mut heartbeat = tokio::time::interval(rt.config.interval);
    heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    // Announce right away instead of skipping the first tick.
    rt.publish_beacon(beacon.as_ref()).await;
    heartbeat.tick().await;

    loop {
        tokio::select! {
            // ── 1. Commands from the node handle ────────────────
            cmd = cmd_rx.recv() => match cmd {
                Some(NodeCommand::Stop { ack }) => {
                    rt.shutdown(beacon, gossip, true).await;
                    let _ = ack.send(());
                    return;
                }
                Some(cmd) => rt.handle_command(cmd),
                None => {
                    tracing::debug!(node = %rt.identity.uuid_str, "all node handles dropped");
                    rt.shutdown(beacon, gossip, false).await;
                    return;
                }
            },

            // ── 2. Link traffic ─────────────────────────────────
            Some(inbound) = inbound_rx.recv() => rt.handle_inbound(inbound),

            // ── 3. Beacon discovery ─────────────────────────────
            received = recv_beacon(beacon.as_ref()) => match received {
                Ok((packet, from)) => rt.handle_beacon(packet, from),
                Err(e) => tracing::debug!("beacon: receive failed: {e}"),
            },

            // ── 4. Gossip discovery ─────────────────────────────
            Some(msg) = recv_gossip(gossip.as_mut()) => rt.handle_gossip(msg),

            // ── 5. Heartbeat: beacon + liveness ─────────────────
            _ = heartbeat.tick() => {
                rt.publish_beacon(beacon.as_ref()).await;
                rt.check_liveness();
            }
        }
    }
}

async fn recv_beacon(
    beacon: Option<&BeaconDiscovery>,
) -> Result<(BeaconPacket, SocketAddr), murmur_transport::TransportError> {
    match beacon {
        Some(discovery) => discovery.beacon.recv().await,
        None => std::future::pending().await,
    }
}

async fn recv_gossip(gossip: Option<&mut GossipDiscovery>) -> Option<GossipMessage> {
    match gossip {
        Some(discovery) => discovery.rx.recv().await,
        None => std::future::pending().await,
    }
}

fn uuid_from_beacon(packet: &BeaconPacket) -> String {
    format!("{:X}", uuid::Uuid::from_bytes(packet.uuid).simple())
}

impl Runtime {
    pub(super) fn new(parts: RuntimeParts) -> Self {
        let liveness = LivenessTracker::new(
            parts.config.evasive_timeout,
            parts.config.silent_timeout,
            parts.config.expired_timeout,
        );
        Self {
            identity: parts.identity,
            config: parts.config,
            groups: parts.groups,
            status: 0,
            advertised: parts.advertised,
            security: parts.security,
            roster: Roster::new(),
            liveness,
            inbox: parts.inbox,
            metrics: parts.metrics,
            inbound_tx: parts.inbound_tx,
            cancel: parts.cancel,
            next_link_id: 0,
        }
    }

    // ── Helpers ─────────────────────────────────────────────────────

    fn emit(&self, event: Event) {
        if self.config.verbose {
            tracing::info!(node = %self.identity.name, "event: {event}");
        } else {
            tracing::debug!(node = %self.identity.name, "event: {event}");
        }
        match self.inbox.push(event) {
            PushOutcome::Queued => self.metrics.events_received.inc(),
            PushOutcome::Full => {
                tracing::warn!(node = %self.identity.name, "event queue full, event dropped");
                self.metrics.events_dropped.inc();
            }
            PushOutcome::Closed => {}
        }
    }

    fn log_wire(&self, direction: &str, peer: &str, msg: &WireMessage) {
        if self.config.verbose {
            tracing::info!(node = %self.identity.name, peer = %peer, "{direction} {}", msg.kind());
        } else {
            tracing::trace!(node = %self.identity.name, peer = %peer, "{direction} {}", msg.kind());
        }
    }

    fn hello(&self) -> WireMessage {
        WireMessage::Hello {
            uuid: self.identity.uuid_str.clone(),
            name: self.identity.name.clone(),
            endpoint: self.advertised.clone(),
            groups: self.groups.iter().cloned().collect(),
            status: self.status,
            headers: self.config.headers.clone(),
        }
    }

    /// Queue `msg` for one peer. Returns whether it was handed off.
    fn send_to(&self, peer: &Peer, msg: WireMessage) -> bool {
        self.log_wire("send", &peer.uuid, &msg);
        match peer.send(msg) {
            SendOutcome::Queued => true,
            SendOutcome::Full => {
                tracing::warn!(peer = %peer.uuid, "outbound queue full, message dropped");
                self.metrics.messages_dropped.inc();
                false
            }
            SendOutcome::Closed => {
                tracing::debug!(peer = %peer.uuid, "outbound link gone, message dropped");
                self.metrics.messages_dropped.inc();
                false
            }
        }
    }

    /// Make sure there is an outbound link to `uuid` at `endpoint`.
    fn require_peer(&mut self, uuid: &str, endpoint: &str) {
        if uuid == self.identity.uuid_str || self.roster.contains(uuid) {
            return;
        }
        let target: Endpoint = match endpoint.parse() {
            Ok(target) => target,
            Err(e) => {
                tracing::warn!(peer = %uuid, "ignoring peer with bad endpoint: {e}");
                return;
            }
        };

        self.next_link_id += 1;
        let link_id = self.next_link_id;
        let (tx, rx) = mpsc::channel(self.config.link_buffer);
        tokio::spawn(links::run_outbound(
            uuid.to_string(),
            target,
            self.security.clone(),
            link_id,
            rx,
            self.inbound_tx.clone(),
        ));

        let peer = Peer::new(uuid.to_string(), endpoint.to_string(), link_id, tx);
        self.send_to(&peer, self.hello());
        tracing::debug!(node = %self.identity.name, peer = %uuid, %endpoint, "connecting to peer");
        self.roster.insert(peer);
        self.liveness.record(uuid);
    }

    fn remove_peer(&mut self, uuid: &str, reason: &str) {
        self.liveness.untrack(uuid);
        let Some(peer) = self.roster.remove(uuid) else {
            return;
        };
        tracing::debug!(node = %self.identity.name, peer = %uuid, "peer removed: {reason}");
        if peer.ready {
            self.metrics.peers_exited.inc();
            self.emit(Event::Exit {
                peer_uuid: peer.uuid,
                peer_name: peer.name,
            });
        }
    }

    // ── Commands ────────────────────────────────────────────────────

    fn handle_command(&mut self, cmd: NodeCommand) {
        match cmd {
            NodeCommand::Join { group } => {
                if self.groups.insert(group.clone()) {
                    self.status = self.status.wrapping_add(1);
                    let status = self.status;
                    for peer in self.roster.all() {
                        self.send_to(peer, WireMessage::Join { group: group.clone(), status });
                    }
                }
            }
            NodeCommand::Leave { group } => {
                if self.groups.shift_remove(&group) {
                    self.status = self.status.wrapping_add(1);
                    let status = self.status;
                    for peer in self.roster.all() {
                        self.send_to(peer, WireMessage::Leave { group: group.clone(), status });
                    }
                }
            }
            NodeCommand::Whisper { peer, frames } => self.whisper(&peer, frames),
            NodeCommand::Shout { group, frames } => self.shout(&group, frames),
            NodeCommand::Peers { reply } => {
                let _ = reply.send(self.roster.peers());
            }
            NodeCommand::PeersByGroup { group, reply } => {
                let _ = reply.send(self.roster.peers_by_group(&group));
            }
            NodeCommand::OwnGroups { reply } => {
                let _ = reply.send(self.groups.iter().cloned().collect());
            }
            NodeCommand::PeerGroups { reply } => {
                let _ = reply.send(self.roster.peer_groups());
            }
            NodeCommand::PeerAddress { peer, reply } => {
                let _ = reply.send(self.roster.address(&peer));
            }
            NodeCommand::PeerHeader { peer, name, reply } => {
                let _ = reply.send(self.roster.header(&peer, &name));
            }
            NodeCommand::RequirePeer { uuid, endpoint } => self.require_peer(&uuid, &endpoint),
            // handled by the loop itself
            NodeCommand::Stop { .. } => {}
        }
    }

    fn whisper(&self, uuid: &str, frames: Vec<Bytes>) {
        match self.roster.get(uuid).filter(|p| p.ready) {
            Some(peer) => {
                if self.send_to(peer, WireMessage::Whisper { frames }) {
                    self.metrics.whispers_sent.inc();
                }
            }
            None => {
                tracing::debug!(peer = %uuid, "whisper to unknown peer dropped");
                self.metrics.messages_dropped.inc();
            }
        }
    }

    fn shout(&self, group: &str, frames: Vec<Bytes>) {
        for peer in self.roster.ready().filter(|p| p.groups.contains(group)) {
            self.send_to(
                peer,
                WireMessage::Shout {
                    group: group.to_string(),
                    frames: frames.clone(),
                },
            );
        }
        self.metrics.shouts_sent.inc();
    }

    // ── Link traffic ────────────────────────────────────────────────

    fn handle_inbound(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Message { conn_id, from, msg } => self.handle_message(conn_id, from, msg),
            Inbound::Closed { conn_id, from } => {
                let current = self.roster.get(&from).and_then(|p| p.inbound_conn);
                if current == Some(conn_id) {
                    self.remove_peer(&from, "link closed");
                }
            }
            Inbound::LinkFailed {
                uuid,
                link_id,
                reason,
            } => {
                if self.roster.get(&uuid).map(|p| p.link_id) == Some(link_id) {
                    self.remove_peer(&uuid, &reason);
                }
            }
        }
    }

    fn handle_message(&mut self, conn_id: u64, from: String, msg: WireMessage) {
        self.log_wire("recv", &from, &msg);

        if let WireMessage::Hello {
            uuid,
            name,
            endpoint,
            groups,
            status,
            headers,
        } = msg
        {
            self.handle_hello(conn_id, uuid, name, endpoint, groups, status, headers);
            return;
        }

        let Some(peer) = self.roster.get_mut(&from).filter(|p| p.ready) else {
            tracing::debug!(peer = %from, "{} from peer without hello ignored", msg.kind());
            return;
        };
        let peer_name = peer.name.clone();
        self.liveness.record(&from);

        match msg {
            WireMessage::Whisper { frames } => self.emit(Event::Whisper {
                peer_uuid: from,
                peer_name,
                frames,
            }),
            WireMessage::Shout { group, frames } => self.emit(Event::Shout {
                peer_uuid: from,
                peer_name,
                group,
                frames,
            }),
            WireMessage::Join { group, status } => {
                let added = peer.groups.insert(group.clone());
                peer.status = status;
                if added {
                    self.emit(Event::Join {
                        peer_uuid: from,
                        peer_name,
                        group,
                    });
                }
            }
            WireMessage::Leave { group, status } => {
                let removed = peer.groups.shift_remove(&group);
                peer.status = status;
                if removed {
                    self.emit(Event::Leave {
                        peer_uuid: from,
                        peer_name,
                        group,
                    });
                }
            }
            WireMessage::Ping => {
                if let Some(peer) = self.roster.get(&from) {
                    self.send_to(peer, WireMessage::PingOk);
                }
            }
            WireMessage::PingOk | WireMessage::Hello { .. } => {}
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_hello(
        &mut self,
        conn_id: u64,
        uuid: String,
        name: String,
        endpoint: String,
        groups: Vec<String>,
        status: u8,
        headers: IndexMap<String, String>,
    ) {
        if uuid == self.identity.uuid_str {
            return;
        }
        self.require_peer(&uuid, &endpoint);
        let Some(peer) = self.roster.get_mut(&uuid) else {
            return;
        };
        self.liveness.record(&uuid);

        peer.inbound_conn = Some(conn_id);
        if peer.ready {
            tracing::debug!(peer = %uuid, "repeated hello, link replaced");
            return;
        }
        peer.ready = true;
        peer.name = name.clone();
        peer.endpoint = endpoint.clone();
        peer.headers = headers.clone();
        peer.status = status;
        let joined: Vec<String> = groups
            .into_iter()
            .filter(|g| peer.groups.insert(g.clone()))
            .collect();

        self.metrics.peers_entered.inc();
        self.emit(Event::Enter {
            peer_uuid: uuid.clone(),
            peer_name: name.clone(),
            peer_addr: endpoint,
            headers,
        });
        for group in joined {
            self.emit(Event::Join {
                peer_uuid: uuid.clone(),
                peer_name: name.clone(),
                group,
            });
        }
    }

    // ── Discovery ───────────────────────────────────────────────────

    async fn publish_beacon(&self, discovery: Option<&BeaconDiscovery>) {
        if let Some(BeaconDiscovery { beacon, port }) = discovery {
            let packet = BeaconPacket::new(*self.identity.uuid.as_bytes(), *port);
            if let Err(e) = beacon.publish(&packet).await {
                tracing::debug!("beacon: publish failed: {e}");
            }
        }
    }

    fn handle_beacon(&mut self, packet: BeaconPacket, from: SocketAddr) {
        let uuid = uuid_from_beacon(&packet);
        if uuid == self.identity.uuid_str {
            return;
        }
        if packet.is_departure() {
            self.remove_peer(&uuid, "beacon departure");
            return;
        }
        if self.roster.contains(&uuid) {
            self.liveness.record(&uuid);
            return;
        }
        let endpoint = Endpoint::tcp(from.ip().to_string(), packet.port).to_string();
        self.require_peer(&uuid, &endpoint);
    }

    fn handle_gossip(&mut self, msg: GossipMessage) {
        match msg {
            GossipMessage::Publish { key, value } => self.require_peer(&key, &value),
            GossipMessage::Unpublish { key } => self.remove_peer(&key, "gossip withdrawal"),
        }
    }

    fn check_liveness(&mut self) {
        for event in self.liveness.check_all() {
            match event {
                LivenessEvent::Evasive { uuid } => {
                    let Some(peer) = self.roster.get(&uuid).filter(|p| p.ready) else {
                        continue;
                    };
                    self.send_to(peer, WireMessage::Ping);
                    self.emit(Event::Evasive {
                        peer_uuid: uuid,
                        peer_name: peer.name.clone(),
                    });
                }
                LivenessEvent::Silent { uuid } => {
                    let Some(peer) = self.roster.get(&uuid).filter(|p| p.ready) else {
                        continue;
                    };
                    self.emit(Event::Silent {
                        peer_uuid: uuid,
                        peer_name: peer.name.clone(),
                    });
                }
                LivenessEvent::Expired { uuid } => self.remove_peer(&uuid, "expired"),
            }
        }
    }

    // ── Shutdown ────────────────────────────────────────────────────

    /// Announce departure, close every link and, for an explicit stop,
    /// queue the STOP event before closing the inbox.
    async fn shutdown(
        &mut self,
        beacon: Option<BeaconDiscovery>,
        gossip: Option<GossipDiscovery>,
        announce_stop: bool,
    ) {
        if let Some(BeaconDiscovery { beacon, .. }) = beacon {
            let departure = BeaconPacket::departure(*self.identity.uuid.as_bytes());
            if let Err(e) = beacon.publish(&departure).await {
                tracing::debug!("beacon: departure failed: {e}");
            }
        }
        if let Some(GossipDiscovery { hubs, clients, .. }) = gossip {
            for client in &clients {
                let _ = client.unpublish(&self.identity.uuid_str).await;
            }
            drop(clients);
            if !hubs.is_empty() {
                tracing::debug!(node = %self.identity.name, hubs = hubs.len(), "closing gossip hubs");
            }
        }

        self.cancel.cancel();
        let peers = self.roster.drain().count();
        tracing::info!(node = %self.identity.name, peers, "node stopped");

        if announce_stop {
            let stop = Event::Stop {
                peer_uuid: self.identity.uuid_str.clone(),
                peer_name: self.identity.name.clone(),
            };
            tracing::debug!(node = %self.identity.name, "event: {stop}");
            self.metrics.events_received.inc();
            self.inbox.finish(stop);
        } else {
            self.inbox.close();
        }
    }
}
