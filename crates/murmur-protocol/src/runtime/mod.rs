/// Node runtime: one task per started node that owns the roster and links.
///
/// The task multiplexes application commands, inbound wire messages,
/// discovery traffic (beacon or gossip) and the liveness timer. The
/// application talks to it through a [`RuntimeHandle`]; events flow back
/// through the node's inbox.
mod links;
mod r#loop;

use std::sync::Arc;

use bytes::Bytes;
use indexmap::IndexSet;
use murmur_base::Cert;
use murmur_transport::{
    Authenticator, Beacon, Endpoint, GossipClient, GossipHub, LinkSecurity, Listener,
    TransportError,
};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::config::NodeConfig;
use crate::inbox::Inbox;
use crate::metrics::NodeMetrics;
use crate::MurmurError;

/// Command queue depth between a node handle and its runtime.
const COMMAND_BUFFER: usize = 256;
/// Queue depth for link and gossip traffic into the runtime.
const INBOUND_BUFFER: usize = 1024;

// ── Pre-start state ─────────────────────────────────────────────────

/// Everything a stopped node has accumulated through its setters.
#[derive(Default)]
pub(crate) struct Pending {
    pub(crate) config: NodeConfig,
    pub(crate) groups: IndexSet<String>,
    /// Listener bound by `set_endpoint`.
    pub(crate) listener: Option<Listener>,
    pub(crate) gossip_hubs: Vec<GossipHub>,
    pub(crate) gossip_connects: Vec<Endpoint>,
    pub(crate) cert: Option<Cert>,
    pub(crate) authenticator: Option<Authenticator>,
    /// Endpoint put in `Hello` and gossip in place of the bound one.
    pub(crate) advertised: Option<Endpoint>,
}

impl Pending {
    pub(crate) fn new(config: NodeConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    fn gossip_mode(&self) -> bool {
        !self.gossip_hubs.is_empty() || !self.gossip_connects.is_empty()
    }
}

/// Identity shared between the node handle and its runtime.
pub(crate) struct Identity {
    pub(crate) uuid: uuid::Uuid,
    pub(crate) uuid_str: String,
    pub(crate) name: String,
}

// ── Commands (node → runtime) ───────────────────────────────────────

pub(crate) enum NodeCommand {
    Join {
        group: String,
    },
    Leave {
        group: String,
    },
    Whisper {
        peer: String,
        frames: Vec<Bytes>,
    },
    Shout {
        group: String,
        frames: Vec<Bytes>,
    },
    Peers {
        reply: oneshot::Sender<Vec<String>>,
    },
    PeersByGroup {
        group: String,
        reply: oneshot::Sender<Vec<String>>,
    },
    OwnGroups {
        reply: oneshot::Sender<Vec<String>>,
    },
    PeerGroups {
        reply: oneshot::Sender<Vec<String>>,
    },
    PeerAddress {
        peer: String,
        reply: oneshot::Sender<Option<String>>,
    },
    PeerHeader {
        peer: String,
        name: String,
        reply: oneshot::Sender<Option<String>>,
    },
    RequirePeer {
        uuid: String,
        endpoint: String,
    },
    Stop {
        ack: oneshot::Sender<()>,
    },
}

// ── Inbound traffic (link tasks → runtime) ──────────────────────────

#[derive(Debug)]
pub(crate) enum Inbound {
    /// A message on an accepted connection. `from` is the uuid its `Hello`
    /// announced.
    Message {
        conn_id: u64,
        from: String,
        msg: murmur_transport::WireMessage,
    },
    /// An accepted connection closed.
    Closed { conn_id: u64, from: String },
    /// The outbound link to a peer could not be opened or broke.
    LinkFailed {
        uuid: String,
        link_id: u64,
        reason: String,
    },
}

// ── Discovery ───────────────────────────────────────────────────────

/// Discovery handles owned by the runtime. Exactly one of `beacon` and
/// `gossip` is set.
pub(crate) struct Discovery {
    pub(crate) beacon: Option<BeaconDiscovery>,
    pub(crate) gossip: Option<GossipDiscovery>,
}

pub(crate) struct BeaconDiscovery {
    pub(crate) beacon: Beacon,
    /// TCP port announced in each beacon.
    pub(crate) port: u16,
}

pub(crate) struct GossipDiscovery {
    /// Hubs this node serves; dropped when the runtime ends.
    pub(crate) hubs: Vec<GossipHub>,
    pub(crate) clients: Vec<GossipClient>,
    pub(crate) rx: mpsc::Receiver<murmur_transport::GossipMessage>,
}

// ── RuntimeHandle ───────────────────────────────────────────────────

/// Handle to a running node runtime. Cheap to clone.
#[derive(Clone)]
pub(crate) struct RuntimeHandle {
    cmd_tx: mpsc::Sender<NodeCommand>,
    bound: Endpoint,
}

impl RuntimeHandle {
    pub(crate) fn bound_endpoint(&self) -> &Endpoint {
        &self.bound
    }

    pub(crate) async fn send(&self, cmd: NodeCommand) -> Result<(), MurmurError> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|_| MurmurError::Terminated)
    }

    async fn query<T: Default>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> NodeCommand,
    ) -> T {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(build(tx)).await;
        rx.await.unwrap_or_default()
    }

    pub(crate) async fn peers(&self) -> Vec<String> {
        self.query(|reply| NodeCommand::Peers { reply }).await
    }

    pub(crate) async fn peers_by_group(&self, group: String) -> Vec<String> {
        self.query(|reply| NodeCommand::PeersByGroup { group, reply })
            .await
    }

    pub(crate) async fn own_groups(&self) -> Vec<String> {
        self.query(|reply| NodeCommand::OwnGroups { reply }).await
    }

    pub(crate) async fn peer_groups(&self) -> Vec<String> {
        self.query(|reply| NodeCommand::PeerGroups { reply }).await
    }

    pub(crate) async fn peer_address(&self, peer: String) -> Option<String> {
        self.query(|reply| NodeCommand::PeerAddress { peer, reply })
            .await
    }

    pub(crate) async fn peer_header(&self, peer: String, name: String) -> Option<String> {
        self.query(|reply| NodeCommand::PeerHeader { peer, name, reply })
            .await
    }

    /// Ask the runtime to announce departure and wind down. Resolves once
    /// the STOP event is queued.
    pub(crate) async fn stop(&self) {
        let (ack, done) = oneshot::channel();
        if self.cmd_tx.send(NodeCommand::Stop { ack }).await.is_ok() {
            let _ = done.await;
        }
    }
}

// ── Launch ──────────────────────────────────────────────────────────

/// Bind, connect and spawn the runtime for `pending`.
///
/// Every fallible step runs before anything is moved out of `pending`, so
/// a failed start leaves the node stopped with its configuration intact.
pub(crate) async fn launch(
    identity: Arc<Identity>,
    pending: &mut Pending,
    inbox: Arc<Inbox>,
    metrics: Arc<NodeMetrics>,
) -> Result<RuntimeHandle, MurmurError> {
    let gossip = pending.gossip_mode();

    if pending.listener.is_none() {
        if gossip {
            return Err(MurmurError::MissingEndpoint);
        }
        let any: Endpoint = "tcp://*:*".parse()?;
        pending.listener = Some(Listener::bind(&any).await?);
    }
    let bound = match &pending.listener {
        Some(listener) => listener.endpoint().clone(),
        None => return Err(MurmurError::MissingEndpoint),
    };

    let security = match &pending.cert {
        Some(cert) => LinkSecurity::secure(cert.clone())?,
        None => LinkSecurity::plain(),
    };
    let security = match &pending.authenticator {
        Some(auth) => security.with_authenticator(auth.clone()),
        None => security,
    };

    let (discovery, advertised) = if gossip {
        let (gossip_tx, gossip_rx) = mpsc::channel(INBOUND_BUFFER);
        let hub_endpoints = pending
            .gossip_hubs
            .iter()
            .map(|hub| hub.endpoint().clone().with_host("127.0.0.1"));
        let mut clients = Vec::new();
        for endpoint in hub_endpoints.chain(pending.gossip_connects.iter().cloned()) {
            clients.push(GossipClient::connect(&endpoint, gossip_tx.clone()).await?);
        }
        let advertised = match &pending.advertised {
            Some(endpoint) => endpoint.to_string(),
            None => bound.clone().with_host("127.0.0.1").to_string(),
        };
        for client in &clients {
            client.publish(&identity.uuid_str, &advertised).await?;
        }
        let hubs = std::mem::take(&mut pending.gossip_hubs);
        (
            Discovery {
                beacon: None,
                gossip: Some(GossipDiscovery {
                    hubs,
                    clients,
                    rx: gossip_rx,
                }),
            },
            advertised,
        )
    } else {
        let &Endpoint::Tcp {
            port: Some(port), ..
        } = &bound
        else {
            return Err(TransportError::NotSupported(format!(
                "beacon discovery needs a tcp endpoint, got {bound}"
            ))
            .into());
        };
        let beacon = Beacon::bind(pending.config.port, pending.config.interface.as_deref())?;
        let advertised = match &pending.advertised {
            Some(endpoint) => endpoint.to_string(),
            None => bound
                .clone()
                .with_host(beacon.local_ip().to_string())
                .to_string(),
        };
        (
            Discovery {
                beacon: Some(BeaconDiscovery { beacon, port }),
                gossip: None,
            },
            advertised,
        )
    };

    let Some(listener) = pending.listener.take() else {
        return Err(MurmurError::MissingEndpoint);
    };

    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
    let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_BUFFER);
    let cancel = CancellationToken::new();

    tokio::spawn(links::accept_loop(
        listener,
        security.clone(),
        inbound_tx.clone(),
        cancel.clone(),
    ));

    tracing::info!(
        node = %identity.uuid_str,
        name = %identity.name,
        endpoint = %advertised,
        mode = if gossip { "gossip" } else { "beacon" },
        "node started"
    );

    let runtime = r#loop::Runtime::new(r#loop::RuntimeParts {
        identity,
        config: pending.config.clone(),
        groups: pending.groups.clone(),
        advertised,
        security,
        inbox,
        metrics,
        inbound_tx,
        cancel,
    });
    tokio::spawn(r#loop::runtime_loop(runtime, discovery, cmd_rx, inbound_rx));

    Ok(RuntimeHandle { cmd_tx, bound })
}
