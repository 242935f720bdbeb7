//! Wait on many nodes at once.
//!
//! A [`Poller`] holds nodes keyed by their event-pipe endpoint and resolves
//! [`Poller::wait`] with the first node that has an event queued. When
//! several are ready, the one registered first wins.

use std::sync::Arc;
use std::time::Duration;

use indexmap::IndexMap;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::node::Node;
use crate::MurmurError;

pub struct Poller {
    nodes: IndexMap<String, Node>,
    signal: Arc<Notify>,
    interrupt: CancellationToken,
}

impl Poller {
    pub fn new() -> Self {
        Self {
            nodes: IndexMap::new(),
            signal: Arc::new(Notify::new()),
            interrupt: CancellationToken::new(),
        }
    }

    /// A poller with `nodes` registered in iteration order.
    pub fn with_nodes<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Self {
        let mut poller = Self::new();
        for node in nodes {
            poller.add(node);
        }
        poller
    }

    /// Register `node`. Returns false if it was already registered.
    pub fn add(&mut self, node: &Node) -> bool {
        if self.nodes.contains_key(node.endpoint()) {
            return false;
        }
        node.inbox().watch(&self.signal);
        self.nodes.insert(node.endpoint().to_string(), node.clone());
        true
    }

    /// Unregister `node`. Removing a node that is not registered does
    /// nothing and returns false.
    pub fn remove(&mut self, node: &Node) -> bool {
        match self.nodes.shift_remove(node.endpoint()) {
            Some(removed) => {
                removed.inbox().unwatch(&self.signal);
                true
            }
            None => false,
        }
    }

    /// A copy of the endpoint → node registrations, in registration order.
    pub fn nodes(&self) -> IndexMap<String, Node> {
        self.nodes.clone()
    }

    pub fn contains(&self, node: &Node) -> bool {
        self.nodes.contains_key(node.endpoint())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Token that fails the current and every later [`Poller::wait`] with
    /// [`MurmurError::Interrupted`] once cancelled.
    pub fn interrupt_token(&self) -> CancellationToken {
        self.interrupt.clone()
    }

    /// Cancel the interrupt token on Ctrl+C.
    pub fn interrupt_on_ctrl_c(&self) {
        let token = self.interrupt.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::debug!("poller: interrupted by ctrl-c");
                token.cancel();
            }
        });
    }

    /// Clear a previous interruption so `wait` can be used again.
    pub fn reset_interrupt(&mut self) {
        if self.interrupt.is_cancelled() {
            self.interrupt = CancellationToken::new();
        }
    }

    fn first_ready(&self) -> Option<Node> {
        self.nodes
            .values()
            .find(|node| node.inbox().is_ready())
            .cloned()
    }

    /// Wait until a registered node has an event queued.
    ///
    /// - `None` waits indefinitely
    /// - `Some(Duration::ZERO)` checks once and returns immediately
    /// - `Ok(None)` means the timeout elapsed with nothing ready
    ///
    /// The returned node still holds its event; read it with
    /// [`Node::recv`] or [`Node::try_recv`].
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<Option<Node>, MurmurError> {
        let deadline = timeout.map(|t| tokio::time::Instant::now() + t);

        loop {
            if self.interrupt.is_cancelled() {
                return Err(MurmurError::Interrupted);
            }

            let notified = self.signal.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(node) = self.first_ready() {
                return Ok(Some(node));
            }
            if timeout == Some(Duration::ZERO) {
                return Ok(None);
            }

            let expired = async {
                match deadline {
                    Some(deadline) => tokio::time::sleep_until(deadline).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                biased;
                _ = self.interrupt.cancelled() => return Err(MurmurError::Interrupted),
                _ = &mut notified => {}
                _ = expired => return Ok(self.first_ready()),
            }
        }
    }
}

impl Default for Poller {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        for node in self.nodes.values() {
            node.inbox().unwatch(&self.signal);
        }
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .finish()
    }
}
