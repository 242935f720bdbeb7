//! Gossip discovery: a rendezvous hub that relays published tuples.
//!
//! Nodes publish `uuid → endpoint` tuples to a hub. The hub remembers every
//! tuple, sends the full set to each newly connected client, and forwards
//! each new tuple to every other client. Tuples published by a client are
//! withdrawn when its link closes.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::endpoint::Endpoint;
use crate::link::{Link, Listener};
use crate::security::LinkSecurity;
use crate::TransportError;

/// Tuple traffic between hub and clients, in both directions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum GossipMessage {
    Publish { key: String, value: String },
    Unpublish { key: String },
}

// ── Hub ─────────────────────────────────────────────────────────────

enum HubEvent {
    Joined {
        id: u64,
        tx: mpsc::Sender<GossipMessage>,
    },
    Message {
        id: u64,
        msg: GossipMessage,
    },
    Left {
        id: u64,
    },
}

/// A running gossip hub. Dropping it stops the hub and closes its clients.
#[derive(Debug)]
pub struct GossipHub {
    endpoint: Endpoint,
    task: JoinHandle<()>,
}

impl GossipHub {
    /// Bind `endpoint` and start relaying.
    pub async fn bind(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let listener = Listener::bind(endpoint).await?;
        let endpoint = listener.endpoint().clone();
        tracing::debug!(%endpoint, "gossip: hub bound");
        let task = tokio::spawn(hub_loop(listener));
        Ok(Self { endpoint, task })
    }

    /// The bound endpoint (wildcard TCP ports resolved).
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl Drop for GossipHub {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn hub_loop(mut listener: Listener) {
    let (event_tx, mut event_rx) = mpsc::channel::<HubEvent>(256);
    let mut clients: HashMap<u64, mpsc::Sender<GossipMessage>> = HashMap::new();
    // key → (value, owning client)
    let mut tuples: IndexMap<String, (String, u64)> = IndexMap::new();
    let mut client_tasks = tokio::task::JoinSet::new();
    let mut next_id = 0u64;

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let accepted = match accepted {
                    Ok(a) => a,
                    Err(e) => {
                        tracing::warn!("gossip: accept failed: {e}");
                        continue;
                    }
                };
                next_id += 1;
                client_tasks.spawn(serve_client(next_id, accepted, event_tx.clone()));
            }
            Some(event) = event_rx.recv() => match event {
                HubEvent::Joined { id, tx } => {
                    for (key, (value, _)) in &tuples {
                        let _ = tx.send(GossipMessage::Publish { key: key.clone(), value: value.clone() }).await;
                    }
                    clients.insert(id, tx);
                }
                HubEvent::Message { id, msg } => {
                    match &msg {
                        GossipMessage::Publish { key, value } => {
                            tuples.insert(key.clone(), (value.clone(), id));
                        }
                        GossipMessage::Unpublish { key } => {
                            tuples.shift_remove(key);
                        }
                    }
                    forward(&clients, id, &msg).await;
                }
                HubEvent::Left { id } => {
                    clients.remove(&id);
                    let orphaned: Vec<String> = tuples
                        .iter()
                        .filter(|(_, (_, owner))| *owner == id)
                        .map(|(key, _)| key.clone())
                        .collect();
                    for key in orphaned {
                        tuples.shift_remove(&key);
                        forward(&clients, id, &GossipMessage::Unpublish { key }).await;
                    }
                }
            },
            Some(_) = client_tasks.join_next() => {}
        }
    }
}

async fn forward(
    clients: &HashMap<u64, mpsc::Sender<GossipMessage>>,
    from: u64,
    msg: &GossipMessage,
) {
    for (&id, tx) in clients {
        if id != from {
            let _ = tx.send(msg.clone()).await;
        }
    }
}

async fn serve_client(id: u64, accepted: crate::link::Accepted, events: mpsc::Sender<HubEvent>) {
    let mut link = match Link::accept(accepted, &LinkSecurity::plain()).await {
        Ok(link) => link,
        Err(e) => {
            tracing::debug!("gossip: client handshake failed: {e}");
            return;
        }
    };

    let (tx, mut out_rx) = mpsc::channel(256);
    if events.send(HubEvent::Joined { id, tx }).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            msg = link.recv::<GossipMessage>() => match msg {
                Ok(Some(msg)) => {
                    if events.send(HubEvent::Message { id, msg }).await.is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::debug!("gossip: client {id} read failed: {e}");
                    break;
                }
            },
            Some(out) = out_rx.recv() => {
                if let Err(e) = link.send(&out).await {
                    tracing::debug!("gossip: client {id} write failed: {e}");
                    break;
                }
            }
        }
    }

    let _ = events.send(HubEvent::Left { id }).await;
}

// ── Client ──────────────────────────────────────────────────────────

/// A connection to a gossip hub. Tuples delivered by the hub are forwarded
/// to the channel passed to [`GossipClient::connect`].
///
/// Dropping the client flushes any queued publications, then closes the link.
#[derive(Debug)]
pub struct GossipClient {
    endpoint: Endpoint,
    tx: mpsc::Sender<GossipMessage>,
}

impl GossipClient {
    pub async fn connect(
        endpoint: &Endpoint,
        deliver: mpsc::Sender<GossipMessage>,
    ) -> Result<Self, TransportError> {
        let mut link = Link::connect(endpoint, &LinkSecurity::plain()).await?;
        let (tx, mut out_rx) = mpsc::channel::<GossipMessage>(64);
        let hub = endpoint.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = link.recv::<GossipMessage>() => match msg {
                        Ok(Some(msg)) => {
                            if deliver.send(msg).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => {
                            tracing::debug!(%hub, "gossip: hub closed the link");
                            break;
                        }
                        Err(e) => {
                            tracing::debug!(%hub, "gossip: read failed: {e}");
                            break;
                        }
                    },
                    out = out_rx.recv() => match out {
                        Some(out) => {
                            if let Err(e) = link.send(&out).await {
                                tracing::debug!(%hub, "gossip: write failed: {e}");
                                break;
                            }
                        }
                        None => break,
                    },
                }
            }
        });

        Ok(Self {
            endpoint: endpoint.clone(),
            tx,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub async fn publish(&self, key: &str, value: &str) -> Result<(), TransportError> {
        self.tx
            .send(GossipMessage::Publish {
                key: key.to_string(),
                value: value.to_string(),
            })
            .await
            .map_err(|_| TransportError::Closed)
    }

    pub async fn unpublish(&self, key: &str) -> Result<(), TransportError> {
        self.tx
            .send(GossipMessage::Unpublish {
                key: key.to_string(),
            })
            .await
            .map_err(|_| TransportError::Closed)
    }
}

