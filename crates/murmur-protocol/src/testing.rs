//! Test helpers: synthesized events and in-process clusters.
//!
//! Enabled with the `test-utils` feature.

use std::time::Duration;

use bytes::Bytes;
use indexmap::IndexMap;
use rand::Rng;

use crate::{Event, MurmurError, Node};

pub const DEFAULT_GROUP: &str = "default";
pub const DEFAULT_MSG: &str = "A message.";
/// Network the synthesized peers pretend to live on.
pub const DEFAULT_NETWORK: [u8; 3] = [10, 18, 4];

/// Builds synthesized events that all appear to come from one peer.
///
/// Fields are public; change them between calls to vary the events.
#[derive(Debug, Clone)]
pub struct EventFactory {
    pub peer_uuid: String,
    pub peer_name: String,
    pub peer_addr: String,
    pub headers: IndexMap<String, String>,
    pub group: String,
    pub msg: String,
}

impl EventFactory {
    /// A factory for a random peer on [`DEFAULT_NETWORK`].
    pub fn new() -> Self {
        let peer_uuid = format!("{:X}", uuid::Uuid::new_v4().simple());
        Self {
            peer_name: format!("S-{}", &peer_uuid[..6]),
            peer_addr: Self::random_addr(),
            peer_uuid,
            headers: IndexMap::new(),
            group: DEFAULT_GROUP.to_string(),
            msg: DEFAULT_MSG.to_string(),
        }
    }

    /// `tcp://` address with a random host on [`DEFAULT_NETWORK`] and an
    /// ephemeral port.
    pub fn random_addr() -> String {
        let mut rng = rand::rng();
        let [a, b, c] = DEFAULT_NETWORK;
        let host: u8 = rng.random_range(1..=254);
        let port: u16 = rng.random_range(49152..65535);
        format!("tcp://{a}.{b}.{c}.{host}:{port}")
    }

    pub fn peer_uuid(mut self, uuid: impl Into<String>) -> Self {
        self.peer_uuid = uuid.into();
        self
    }

    pub fn peer_name(mut self, name: impl Into<String>) -> Self {
        self.peer_name = name.into();
        self
    }

    pub fn peer_addr(mut self, addr: impl Into<String>) -> Self {
        self.peer_addr = addr.into();
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn msg(mut self, msg: impl Into<String>) -> Self {
        self.msg = msg.into();
        self
    }

    fn default_frames(&self) -> Vec<Bytes> {
        vec![Bytes::from(self.msg.clone())]
    }

    pub fn enter(&self) -> Event {
        Event::Enter {
            peer_uuid: self.peer_uuid.clone(),
            peer_name: self.peer_name.clone(),
            peer_addr: self.peer_addr.clone(),
            headers: self.headers.clone(),
        }
    }

    pub fn join(&self) -> Event {
        Event::Join {
            peer_uuid: self.peer_uuid.clone(),
            peer_name: self.peer_name.clone(),
            group: self.group.clone(),
        }
    }

    pub fn leave(&self) -> Event {
        Event::Leave {
            peer_uuid: self.peer_uuid.clone(),
            peer_name: self.peer_name.clone(),
            group: self.group.clone(),
        }
    }

    pub fn shout(&self) -> Event {
        self.shout_frames(&self.group, self.default_frames())
    }

    /// A SHOUT to `group` carrying `frames`.
    pub fn shout_frames(&self, group: &str, frames: Vec<Bytes>) -> Event {
        Event::Shout {
            peer_uuid: self.peer_uuid.clone(),
            peer_name: self.peer_name.clone(),
            group: group.to_string(),
            frames,
        }
    }

    pub fn whisper(&self) -> Event {
        self.whisper_frames(self.default_frames())
    }

    pub fn whisper_frames(&self, frames: Vec<Bytes>) -> Event {
        Event::Whisper {
            peer_uuid: self.peer_uuid.clone(),
            peer_name: self.peer_name.clone(),
            frames,
        }
    }

    pub fn evasive(&self) -> Event {
        Event::Evasive {
            peer_uuid: self.peer_uuid.clone(),
            peer_name: self.peer_name.clone(),
        }
    }

    pub fn silent(&self) -> Event {
        Event::Silent {
            peer_uuid: self.peer_uuid.clone(),
            peer_name: self.peer_name.clone(),
        }
    }

    pub fn exit(&self) -> Event {
        Event::Exit {
            peer_uuid: self.peer_uuid.clone(),
            peer_name: self.peer_name.clone(),
        }
    }
}

impl Default for EventFactory {
    fn default() -> Self {
        Self::new()
    }
}

// ── Clusters ────────────────────────────────────────────────────────

fn random_hex() -> String {
    let bytes: [u8; 16] = rand::rng().random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Nodes joined over an in-process gossip hub.
///
/// The first node started binds the hub; later ones connect to it. Every
/// node gets its own `inproc://` endpoint, so no network is touched.
#[derive(Debug)]
pub struct TestCluster {
    hub: String,
    hub_bound: bool,
    nodes: Vec<Node>,
}

impl TestCluster {
    pub fn new() -> Self {
        Self {
            hub: format!("inproc://gossip-hub-{}", random_hex()),
            hub_bound: false,
            nodes: Vec::new(),
        }
    }

    pub fn hub_endpoint(&self) -> &str {
        &self.hub
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// Start a node named `name` (or the default) in this cluster.
    pub async fn started_node(&mut self, name: Option<&str>) -> Result<Node, MurmurError> {
        self.started_node_with(name, |_| Ok(())).await
    }

    /// Like [`TestCluster::started_node`], running `configure` on the node
    /// before it starts.
    pub async fn started_node_with(
        &mut self,
        name: Option<&str>,
        configure: impl FnOnce(&Node) -> Result<(), MurmurError>,
    ) -> Result<Node, MurmurError> {
        let node = match name {
            Some(name) => Node::named(name),
            None => Node::new(),
        };
        node.set_endpoint(&format!("inproc://node-test-{}", random_hex()))
            .await?;
        configure(&node)?;

        if self.hub_bound {
            node.gossip_connect(&self.hub)?;
        } else {
            node.gossip_bind(&self.hub).await?;
            self.hub_bound = true;
        }

        node.start().await?;
        self.nodes.push(node.clone());
        Ok(node)
    }

    /// Stop every node this cluster started, last first.
    pub async fn stop_all(&mut self) {
        for node in self.nodes.drain(..).rev() {
            let _ = node.stop().await;
        }
    }
}

impl Default for TestCluster {
    fn default() -> Self {
        Self::new()
    }
}

/// How long cluster tests wait for an event before giving up.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);
