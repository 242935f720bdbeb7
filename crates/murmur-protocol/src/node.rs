//! The cluster participant.
//!
//! A [`Node`] is created stopped. Setters configure it; [`Node::start`]
//! binds its endpoint, begins discovery and spawns its runtime task;
//! [`Node::stop`] announces departure and ends it for good. Events arrive
//! through [`Node::recv`], [`Node::events`] or a [`Poller`](crate::Poller).
//!
//! `Node` is a cheap handle: clones share the same node. The runtime winds
//! down when the last handle is dropped.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::Stream;
use murmur_base::Cert;
use murmur_transport::{Authenticator, Endpoint, GossipHub, Listener, TransportError};
use uuid::Uuid;

use crate::config::NodeConfig;
use crate::event::{Event, EventCriteria, EventType};
use crate::frame::{collect_frames, IntoFrame};
use crate::inbox::Inbox;
use crate::metrics::NodeMetrics;
use crate::roster::default_name;
use crate::runtime::{self, Identity, NodeCommand, Pending, RuntimeHandle};
use crate::MurmurError;

enum NodeState {
    Stopped(Box<Pending>),
    Starting(Arc<Identity>),
    Running {
        handle: RuntimeHandle,
        identity: Arc<Identity>,
    },
    Terminated(Arc<Identity>),
}

struct NodeInner {
    uuid: Uuid,
    uuid_str: String,
    pipe: String,
    inbox: Arc<Inbox>,
    metrics: Arc<NodeMetrics>,
    state: Mutex<NodeState>,
}

#[derive(Clone)]
pub struct Node {
    inner: Arc<NodeInner>,
}

impl Node {
    /// A stopped node with a fresh uuid and the default name.
    pub fn new() -> Self {
        Self::with_config(NodeConfig::new())
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::with_config(NodeConfig::new().name(name))
    }

    pub fn with_config(config: NodeConfig) -> Self {
        let uuid = Uuid::new_v4();
        let uuid_str = format!("{:X}", uuid.simple());
        let pipe = format!("inproc://murmur-{uuid_str}");
        Self {
            inner: Arc::new(NodeInner {
                uuid,
                uuid_str,
                pipe,
                inbox: Arc::new(Inbox::with_capacity(config.event_buffer)),
                metrics: Arc::new(NodeMetrics::default()),
                state: Mutex::new(NodeState::Stopped(Box::new(Pending::new(config)))),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, NodeState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to the pre-start configuration.
    fn configure<T>(&self, f: impl FnOnce(&mut Pending) -> T) -> Result<T, MurmurError> {
        match &mut *self.state() {
            NodeState::Stopped(pending) => Ok(f(pending)),
            NodeState::Starting(_) | NodeState::Running { .. } => Err(MurmurError::AlreadyStarted),
            NodeState::Terminated(_) => Err(MurmurError::Terminated),
        }
    }

    fn handle(&self) -> Option<RuntimeHandle> {
        match &*self.state() {
            NodeState::Running { handle, .. } => Some(handle.clone()),
            _ => None,
        }
    }

    fn running(&self) -> Result<RuntimeHandle, MurmurError> {
        match &*self.state() {
            NodeState::Running { handle, .. } => Ok(handle.clone()),
            NodeState::Terminated(_) => Err(MurmurError::Terminated),
            _ => Err(MurmurError::NotStarted),
        }
    }

    pub(crate) fn inbox(&self) -> &Arc<Inbox> {
        &self.inner.inbox
    }

    // ── Identity ────────────────────────────────────────────────────

    /// 32 upper-case hex characters, fixed at creation.
    pub fn uuid(&self) -> &str {
        &self.inner.uuid_str
    }

    pub fn name(&self) -> String {
        match &*self.state() {
            NodeState::Stopped(pending) => pending
                .config
                .name
                .clone()
                .unwrap_or_else(|| default_name(&self.inner.uuid_str)),
            NodeState::Starting(identity)
            | NodeState::Running { identity, .. }
            | NodeState::Terminated(identity) => identity.name.clone(),
        }
    }

    /// The node's event-pipe endpoint, stable for the node's lifetime.
    /// Pollers key their registrations by it.
    pub fn endpoint(&self) -> &str {
        &self.inner.pipe
    }

    /// The transport endpoint actually bound, once `set_endpoint` or
    /// `start` has bound one.
    pub fn bound_endpoint(&self) -> Option<String> {
        match &*self.state() {
            NodeState::Stopped(pending) => pending
                .listener
                .as_ref()
                .map(|l| l.endpoint().to_string()),
            NodeState::Running { handle, .. } => Some(handle.bound_endpoint().to_string()),
            _ => None,
        }
    }

    pub fn is_started(&self) -> bool {
        matches!(&*self.state(), NodeState::Running { .. })
    }

    pub fn metrics(&self) -> &NodeMetrics {
        &self.inner.metrics
    }

    // ── Configuration (before start) ────────────────────────────────

    pub fn set_name(&self, name: impl Into<String>) -> Result<(), MurmurError> {
        let name = name.into();
        self.configure(|p| p.config.name = Some(name))
    }

    /// UDP beacon port.
    pub fn set_port(&self, port: u16) -> Result<(), MurmurError> {
        self.configure(|p| p.config.port = port)
    }

    /// Beacon and liveness check interval.
    pub fn set_interval(&self, interval: Duration) -> Result<(), MurmurError> {
        self.configure(|p| p.config.interval = interval)
    }

    pub fn set_evasive_timeout(&self, timeout: Duration) -> Result<(), MurmurError> {
        self.configure(|p| p.config.evasive_timeout = timeout)
    }

    pub fn set_silent_timeout(&self, timeout: Duration) -> Result<(), MurmurError> {
        self.configure(|p| p.config.silent_timeout = timeout)
    }

    pub fn set_expired_timeout(&self, timeout: Duration) -> Result<(), MurmurError> {
        self.configure(|p| p.config.expired_timeout = timeout)
    }

    /// Network interface used for beacons.
    pub fn set_interface(&self, interface: impl Into<String>) -> Result<(), MurmurError> {
        let interface = interface.into();
        self.configure(|p| p.config.interface = Some(interface))
    }

    /// Header advertised to peers in `Hello`.
    pub fn set_header(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Result<(), MurmurError> {
        let (name, value) = (name.into(), value.into());
        self.configure(|p| {
            p.config.headers.insert(name, value);
        })
    }

    pub fn set_headers<I, K, V>(&self, headers: I) -> Result<(), MurmurError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let headers: Vec<(String, String)> = headers
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self.configure(|p| p.config.headers.extend(headers))
    }

    /// Log wire traffic and events at `info` instead of `trace`/`debug`.
    pub fn set_verbose(&self, verbose: bool) -> Result<(), MurmurError> {
        self.configure(|p| p.config.verbose = verbose)
    }

    /// Encrypt every link with `cert`, which must carry a secret key.
    pub fn set_cert(&self, cert: &Cert) -> Result<(), MurmurError> {
        if !cert.has_secret() {
            return Err(MurmurError::NoSecretKey);
        }
        let cert = cert.clone();
        self.configure(|p| p.cert = Some(cert))
    }

    /// Check incoming links with `authenticator`.
    pub fn set_authenticator(&self, authenticator: Authenticator) -> Result<(), MurmurError> {
        self.configure(|p| p.authenticator = Some(authenticator))
    }

    /// Bind the node's link endpoint now. Switches discovery from UDP
    /// beacons to gossip; a later `gossip_bind` or `gossip_connect` names the
    /// rendezvous point.
    pub async fn set_endpoint(&self, endpoint: &str) -> Result<(), MurmurError> {
        let endpoint: Endpoint = endpoint.parse()?;
        self.configure(|_| ())?;
        let listener = Listener::bind(&endpoint).await?;
        tracing::debug!(node = %self.uuid(), endpoint = %listener.endpoint(), "endpoint bound");
        self.configure(|p| p.listener = Some(listener))
    }

    /// Run a gossip hub on `endpoint` that this and other nodes connect to.
    pub async fn gossip_bind(&self, endpoint: &str) -> Result<(), MurmurError> {
        let endpoint: Endpoint = endpoint.parse()?;
        self.configure(|_| ())?;
        let hub = GossipHub::bind(&endpoint).await?;
        self.configure(|p| p.gossip_hubs.push(hub))
    }

    /// Use the gossip hub at `endpoint` for discovery. May be called more
    /// than once.
    pub fn gossip_connect(&self, endpoint: &str) -> Result<(), MurmurError> {
        let endpoint: Endpoint = endpoint.parse()?;
        self.configure(|p| p.gossip_connects.push(endpoint))
    }

    /// Address peers are told to reach this node at, in place of the bound
    /// endpoint. Needed when the node sits behind NAT or binds a wildcard
    /// host that peers cannot route to.
    pub fn set_advertised_endpoint(&self, endpoint: &str) -> Result<(), MurmurError> {
        let parsed: Endpoint = endpoint.parse()?;
        if parsed.is_wildcard() {
            return Err(TransportError::InvalidEndpoint(endpoint.to_string()).into());
        }
        self.configure(|p| p.advertised = Some(parsed))
    }

    /// Beacons always announce the port of the bound link endpoint.
    pub fn set_beacon_peer_port(&self, _port: u16) -> Result<(), MurmurError> {
        Err(TransportError::NotSupported("overriding the beacon peer port".into()).into())
    }

    /// Gossip links are not encrypted; use [`Node::gossip_connect`] and
    /// secure the node links with [`Node::set_cert`].
    pub fn gossip_connect_curve(
        &self,
        _public_key: &str,
        _endpoint: &str,
    ) -> Result<(), MurmurError> {
        Err(TransportError::NotSupported("encrypted gossip links".into()).into())
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Start discovery and become reachable.
    ///
    /// On failure the node stays stopped with its configuration intact.
    pub async fn start(&self) -> Result<(), MurmurError> {
        let (mut pending, identity) = {
            let mut state = self.state();
            let name = match &*state {
                NodeState::Stopped(pending) => pending
                    .config
                    .name
                    .clone()
                    .unwrap_or_else(|| default_name(&self.inner.uuid_str)),
                NodeState::Terminated(_) => return Err(MurmurError::Terminated),
                _ => return Err(MurmurError::AlreadyStarted),
            };
            let identity = Arc::new(Identity {
                uuid: self.inner.uuid,
                uuid_str: self.inner.uuid_str.clone(),
                name,
            });
            match std::mem::replace(&mut *state, NodeState::Starting(identity.clone())) {
                NodeState::Stopped(pending) => (pending, identity),
                _ => return Err(MurmurError::AlreadyStarted),
            }
        };

        let launched = runtime::launch(
            identity.clone(),
            &mut pending,
            self.inner.inbox.clone(),
            self.inner.metrics.clone(),
        )
        .await;

        let mut state = self.state();
        match launched {
            Ok(handle) => {
                *state = NodeState::Running { handle, identity };
                Ok(())
            }
            Err(e) => {
                tracing::warn!(node = %self.uuid(), "start failed: {e}");
                *state = NodeState::Stopped(pending);
                Err(e)
            }
        }
    }

    /// Announce departure, close every link and queue a STOP event.
    ///
    /// A stopped node cannot be started again. Calling `stop` on a node that
    /// never started, or twice, does nothing.
    pub async fn stop(&self) -> Result<(), MurmurError> {
        let handle = {
            let mut state = self.state();
            let NodeState::Running { identity, .. } = &*state else {
                return Ok(());
            };
            let identity = identity.clone();
            match std::mem::replace(&mut *state, NodeState::Terminated(identity)) {
                NodeState::Running { handle, .. } => handle,
                _ => return Ok(()),
            }
        };
        handle.stop().await;
        Ok(())
    }

    // ── Membership ──────────────────────────────────────────────────

    /// Join `group`. Before start the group is announced in the first
    /// `Hello`; after start peers are told right away.
    pub async fn join(&self, group: impl Into<String>) -> Result<(), MurmurError> {
        let group = group.into();
        match self.configure(|p| p.groups.insert(group.clone())) {
            Ok(_) => Ok(()),
            Err(MurmurError::AlreadyStarted) => match self.handle() {
                Some(handle) => handle.send(NodeCommand::Join { group }).await,
                None => Err(MurmurError::NotStarted),
            },
            Err(e) => Err(e),
        }
    }

    pub async fn leave(&self, group: impl Into<String>) -> Result<(), MurmurError> {
        let group = group.into();
        match self.configure(|p| p.groups.shift_remove(&group)) {
            Ok(_) => Ok(()),
            Err(MurmurError::AlreadyStarted) => match self.handle() {
                Some(handle) => handle.send(NodeCommand::Leave { group }).await,
                None => Err(MurmurError::NotStarted),
            },
            Err(e) => Err(e),
        }
    }

    /// Connect to the peer `uuid` at `endpoint` without waiting for
    /// discovery to find it. Does nothing if the peer is already known.
    pub async fn require_peer(&self, uuid: &str, endpoint: &str) -> Result<(), MurmurError> {
        let target: Endpoint = endpoint.parse()?;
        if target.is_wildcard() {
            return Err(TransportError::InvalidEndpoint(endpoint.to_string()).into());
        }
        self.running()?
            .send(NodeCommand::RequirePeer {
                uuid: uuid.to_string(),
                endpoint: endpoint.to_string(),
            })
            .await
    }

    // ── Messaging ───────────────────────────────────────────────────

    /// Send a multi-part message to one peer.
    ///
    /// `Ok` means the message was handed to the runtime, not that it was
    /// delivered. If any part fails to convert, nothing is sent.
    pub async fn whisper<I, F>(&self, peer: &str, parts: I) -> Result<(), MurmurError>
    where
        I: IntoIterator<Item = F>,
        F: IntoFrame,
    {
        let frames = collect_frames(parts)?;
        let handle = self.running()?;
        handle
            .send(NodeCommand::Whisper {
                peer: peer.to_string(),
                frames,
            })
            .await
    }

    /// Send a multi-part message to every peer in `group`.
    pub async fn shout<I, F>(&self, group: &str, parts: I) -> Result<(), MurmurError>
    where
        I: IntoIterator<Item = F>,
        F: IntoFrame,
    {
        let frames = collect_frames(parts)?;
        let handle = self.running()?;
        handle
            .send(NodeCommand::Shout {
                group: group.to_string(),
                frames,
            })
            .await
    }

    // ── Events ──────────────────────────────────────────────────────

    /// Wait for the next event. Fails with `Terminated` once the node has
    /// stopped and every queued event has been read.
    pub async fn recv(&self) -> Result<Event, MurmurError> {
        self.inner.inbox.recv().await.ok_or(MurmurError::Terminated)
    }

    /// Pop the next event if one is queued.
    pub fn try_recv(&self) -> Option<Event> {
        self.inner.inbox.try_recv()
    }

    /// Receive until an event of `kind` matching `criteria` arrives, or
    /// `timeout` elapses (`Ok(None)`). Other events are discarded.
    pub async fn wait_for(
        &self,
        kind: EventType,
        criteria: EventCriteria,
        timeout: Duration,
    ) -> Result<Option<Event>, MurmurError> {
        self.wait_for_with(kind, criteria, timeout, |_| {}).await
    }

    /// Like [`Node::wait_for`], handing every non-matching event to `on_other`.
    pub async fn wait_for_with(
        &self,
        kind: EventType,
        criteria: EventCriteria,
        timeout: Duration,
        mut on_other: impl FnMut(Event),
    ) -> Result<Option<Event>, MurmurError> {
        let criteria = criteria.kind(kind);
        let wait = async {
            loop {
                let event = self.recv().await?;
                if event.matches(&criteria) {
                    return Ok::<_, MurmurError>(event);
                }
                on_other(event);
            }
        };
        match tokio::time::timeout(timeout, wait).await {
            Ok(Ok(event)) => Ok(Some(event)),
            Ok(Err(e)) => Err(e),
            Err(_) => Ok(None),
        }
    }

    /// Every future event as a stream. Ends once the node has stopped and
    /// the queue is drained.
    pub fn events(&self) -> impl Stream<Item = Event> + Send + 'static {
        futures_util::stream::unfold(self.inner.inbox.clone(), |inbox| async move {
            let event = inbox.recv().await?;
            Some((event, inbox))
        })
    }

    // ── Roster queries ──────────────────────────────────────────────

    /// Uuids of every peer that has said `Hello`. Empty before start.
    pub async fn peers(&self) -> Vec<String> {
        match self.handle() {
            Some(handle) => handle.peers().await,
            None => Vec::new(),
        }
    }

    pub async fn peers_by_group(&self, group: &str) -> Vec<String> {
        match self.handle() {
            Some(handle) => handle.peers_by_group(group.to_string()).await,
            None => Vec::new(),
        }
    }

    pub async fn own_groups(&self) -> Vec<String> {
        let pending = match &*self.state() {
            NodeState::Stopped(pending) => Some(pending.groups.iter().cloned().collect()),
            _ => None,
        };
        if let Some(groups) = pending {
            return groups;
        }
        match self.handle() {
            Some(handle) => handle.own_groups().await,
            None => Vec::new(),
        }
    }

    /// Union of the groups every known peer has joined.
    pub async fn peer_groups(&self) -> Vec<String> {
        match self.handle() {
            Some(handle) => handle.peer_groups().await,
            None => Vec::new(),
        }
    }

    pub async fn peer_address(&self, peer: &str) -> Option<String> {
        self.handle()?.peer_address(peer.to_string()).await
    }

    /// Value of header `name` advertised by `peer`, if both are known.
    pub async fn peer_header_value(&self, peer: &str, name: &str) -> Option<String> {
        self.handle()?
            .peer_header(peer.to_string(), name.to_string())
            .await
    }
}

impl Default for Node {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.inner.uuid == other.inner.uuid
    }
}

impl Eq for Node {}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("uuid", &self.inner.uuid_str)
            .field("name", &self.name())
            .field("started", &self.is_started())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uuid_is_upper_hex_and_default_name_is_prefix() {
        let node = Node::new();
        assert_eq!(node.uuid().len(), 32);
        assert!(node
            .uuid()
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        assert_eq!(node.name(), &node.uuid()[..6]);
        assert!(node.endpoint().starts_with("inproc://murmur-"));
    }

    #[test]
    fn named_node_keeps_name() {
        let node = Node::named("alpha");
        assert_eq!(node.name(), "alpha");
        node.set_name("beta").unwrap();
        assert_eq!(node.name(), "beta");
    }

    #[test]
    fn clones_share_identity() {
        let node = Node::new();
        let other = node.clone();
        assert_eq!(node, other);
        assert_ne!(node, Node::new());
    }

    #[test]
    fn public_only_cert_is_refused() {
        let node = Node::new();
        let cert = Cert::new();
        let public = Cert::from_public(cert.public_key()).unwrap();
        assert!(matches!(node.set_cert(&public), Err(MurmurError::NoSecretKey)));
        node.set_cert(&cert).unwrap();
    }

    #[test]
    fn bad_gossip_endpoint_is_rejected() {
        let node = Node::new();
        assert!(matches!(
            node.gossip_connect("carrier-pigeon://home"),
            Err(MurmurError::Transport(_))
        ));
    }

    #[tokio::test]
    async fn messaging_before_start_fails() {
        let node = Node::new();
        assert!(matches!(
            node.whisper("someone", ["hi"]).await,
            Err(MurmurError::NotStarted)
        ));
        assert!(matches!(
            node.shout("news", ["hi"]).await,
            Err(MurmurError::NotStarted)
        ));
    }

    #[tokio::test]
    async fn queries_before_start_are_empty() {
        let node = Node::new();
        node.join("news").await.unwrap();
        assert!(node.peers().await.is_empty());
        assert!(node.peers_by_group("news").await.is_empty());
        assert!(node.peer_groups().await.is_empty());
        assert_eq!(node.peer_address("x").await, None);
        assert_eq!(node.peer_header_value("x", "X-ANY").await, None);
        assert_eq!(node.own_groups().await, vec!["news"]);

        node.leave("news").await.unwrap();
        assert!(node.own_groups().await.is_empty());
    }

    #[tokio::test]
    async fn gossip_start_without_endpoint_fails_and_stays_stopped() {
        let node = Node::new();
        node.gossip_connect("inproc://nowhere").unwrap();
        assert!(matches!(node.start().await, Err(MurmurError::MissingEndpoint)));
        assert!(!node.is_started());
        node.set_name("still-configurable").unwrap();
    }

    #[test]
    fn unsupported_options_say_so() {
        let node = Node::new();
        assert!(matches!(
            node.set_beacon_peer_port(5670),
            Err(MurmurError::Transport(TransportError::NotSupported(_)))
        ));
        let key = Cert::new().public_txt();
        assert!(matches!(
            node.gossip_connect_curve(&key, "tcp://127.0.0.1:5670"),
            Err(MurmurError::Transport(TransportError::NotSupported(_)))
        ));
    }

    #[tokio::test]
    async fn require_peer_before_start_fails() {
        let node = Node::new();
        assert!(matches!(
            node.require_peer("ABC", "tcp://127.0.0.1:5670").await,
            Err(MurmurError::NotStarted)
        ));
        assert!(matches!(
            node.require_peer("ABC", "tcp://*:5670").await,
            Err(MurmurError::Transport(TransportError::InvalidEndpoint(_)))
        ));
    }

    #[tokio::test]
    async fn stop_without_start_is_a_no_op() {
        let node = Node::new();
        node.stop().await.unwrap();
        node.stop().await.unwrap();
        assert!(!node.is_started());
    }
}
