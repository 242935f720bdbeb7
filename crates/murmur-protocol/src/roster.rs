//! Remote peers known to a running node.
//!
//! A peer enters the roster as soon as discovery reports it (beacon or
//! gossip) and an outbound link is opened. It becomes *ready* once its
//! `Hello` arrives; only ready peers are visible to queries and produce
//! events.

use indexmap::{IndexMap, IndexSet};
use murmur_transport::WireMessage;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

#[derive(Debug)]
pub(crate) struct Peer {
    pub(crate) uuid: String,
    pub(crate) name: String,
    pub(crate) endpoint: String,
    pub(crate) groups: IndexSet<String>,
    pub(crate) headers: IndexMap<String, String>,
    pub(crate) ready: bool,
    /// Last join/leave status counter announced by the peer.
    pub(crate) status: u8,
    /// Inbound connection the peer's `Hello` arrived on.
    pub(crate) inbound_conn: Option<u64>,
    /// Id of the outbound link task feeding `tx`.
    pub(crate) link_id: u64,
    tx: mpsc::Sender<WireMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendOutcome {
    Queued,
    /// The peer's queue is full; the message was dropped.
    Full,
    /// The peer's link task is gone.
    Closed,
}

impl Peer {
    pub(crate) fn new(
        uuid: String,
        endpoint: String,
        link_id: u64,
        tx: mpsc::Sender<WireMessage>,
    ) -> Self {
        Self {
            name: default_name(&uuid),
            uuid,
            endpoint,
            groups: IndexSet::new(),
            headers: IndexMap::new(),
            ready: false,
            status: 0,
            inbound_conn: None,
            link_id,
            tx,
        }
    }

    /// Queue `msg` on the outbound link without waiting.
    pub(crate) fn send(&self, msg: WireMessage) -> SendOutcome {
        match self.tx.try_send(msg) {
            Ok(()) => SendOutcome::Queued,
            Err(TrySendError::Full(_)) => SendOutcome::Full,
            Err(TrySendError::Closed(_)) => SendOutcome::Closed,
        }
    }
}

/// The first six characters of a uuid, used until a peer names itself.
pub(crate) fn default_name(uuid: &str) -> String {
    uuid.chars().take(6).collect()
}

#[derive(Debug, Default)]
pub(crate) struct Roster {
    peers: IndexMap<String, Peer>,
}

impl Roster {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, peer: Peer) {
        self.peers.insert(peer.uuid.clone(), peer);
    }

    pub(crate) fn get(&self, uuid: &str) -> Option<&Peer> {
        self.peers.get(uuid)
    }

    pub(crate) fn get_mut(&mut self, uuid: &str) -> Option<&mut Peer> {
        self.peers.get_mut(uuid)
    }

    pub(crate) fn contains(&self, uuid: &str) -> bool {
        self.peers.contains_key(uuid)
    }

    pub(crate) fn remove(&mut self, uuid: &str) -> Option<Peer> {
        self.peers.shift_remove(uuid)
    }

    pub(crate) fn drain(&mut self) -> impl Iterator<Item = Peer> + '_ {
        self.peers.drain(..).map(|(_, peer)| peer)
    }

    /// Every peer with an open outbound link, ready or not.
    pub(crate) fn all(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    pub(crate) fn ready(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values().filter(|p| p.ready)
    }

    fn ready_peer(&self, uuid: &str) -> Option<&Peer> {
        self.peers.get(uuid).filter(|p| p.ready)
    }

    // ── Queries ─────────────────────────────────────────────────────

    pub(crate) fn peers(&self) -> Vec<String> {
        self.ready().map(|p| p.uuid.clone()).collect()
    }

    pub(crate) fn peers_by_group(&self, group: &str) -> Vec<String> {
        self.ready()
            .filter(|p| p.groups.contains(group))
            .map(|p| p.uuid.clone())
            .collect()
    }

    /// Union of every ready peer's groups, first seen first.
    pub(crate) fn peer_groups(&self) -> Vec<String> {
        let mut all = IndexSet::new();
        for peer in self.ready() {
            all.extend(peer.groups.iter().cloned());
        }
        all.into_iter().collect()
    }

    pub(crate) fn address(&self, uuid: &str) -> Option<String> {
        self.ready_peer(uuid).map(|p| p.endpoint.clone())
    }

    pub(crate) fn header(&self, uuid: &str, name: &str) -> Option<String> {
        self.ready_peer(uuid)?.headers.get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(uuid: &str, ready: bool, groups: &[&str]) -> (Peer, mpsc::Receiver<WireMessage>) {
        let (tx, rx) = mpsc::channel(1);
        let mut peer = Peer::new(uuid.into(), format!("inproc://{uuid}"), 1, tx);
        peer.ready = ready;
        peer.groups = groups.iter().map(|g| g.to_string()).collect();
        (peer, rx)
    }

    #[test]
    fn default_name_is_uuid_prefix() {
        let (p, _rx) = peer("ABCDEF0123", false, &[]);
        assert_eq!(p.name, "ABCDEF");
    }

    #[test]
    fn queries_skip_peers_without_hello() {
        let mut roster = Roster::new();
        let (a, _ra) = peer("A", true, &["news", "chat"]);
        let (b, _rb) = peer("B", false, &["news"]);
        let (c, _rc) = peer("C", true, &["news", "sports"]);
        roster.insert(a);
        roster.insert(b);
        roster.insert(c);

        assert_eq!(roster.peers(), vec!["A", "C"]);
        assert_eq!(roster.peers_by_group("news"), vec!["A", "C"]);
        assert_eq!(roster.peer_groups(), vec!["news", "chat", "sports"]);
        assert_eq!(roster.address("A").as_deref(), Some("inproc://A"));
        assert_eq!(roster.address("B"), None);
        assert!(roster.peers_by_group("nothing").is_empty());
    }

    #[test]
    fn header_lookup_needs_known_peer_and_key() {
        let mut roster = Roster::new();
        let (mut a, _ra) = peer("A", true, &[]);
        a.headers.insert("X-ROLE".into(), "hub".into());
        roster.insert(a);

        assert_eq!(roster.header("A", "X-ROLE").as_deref(), Some("hub"));
        assert_eq!(roster.header("A", "X-NONE"), None);
        assert_eq!(roster.header("Z", "X-ROLE"), None);
    }

    #[test]
    fn full_queue_drops() {
        let (p, _rx) = peer("A", true, &[]);
        assert_eq!(p.send(WireMessage::Ping), SendOutcome::Queued);
        assert_eq!(p.send(WireMessage::Ping), SendOutcome::Full);
    }

    #[test]
    fn closed_queue_reports_closed() {
        let (p, rx) = peer("A", true, &[]);
        drop(rx);
        assert_eq!(p.send(WireMessage::Ping), SendOutcome::Closed);
    }
}
