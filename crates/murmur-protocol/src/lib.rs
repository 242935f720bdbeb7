//! murmur: peer-to-peer group messaging.
//!
//! A [`Node`] joins a decentralized cluster of equivalent nodes, discovers
//! peers over UDP beacons or a gossip hub, joins named groups and exchanges
//! direct ([`Node::whisper`]) and group ([`Node::shout`]) multi-part
//! messages. Membership churn and messages arrive as [`Event`]s. A
//! [`Poller`] waits on many nodes at once.
//!
//! ```rust,no_run
//! use murmur_protocol::{EventType, Node};
//!
//! # async fn example() -> Result<(), murmur_protocol::MurmurError> {
//! let node = Node::named("alpha");
//! node.join("news").await?;
//! node.start().await?;
//!
//! loop {
//!     let event = node.recv().await?;
//!     if event.kind() == EventType::Enter {
//!         node.whisper(event.peer_uuid(), ["hello", "there"]).await?;
//!     }
//! }
//! # }
//! ```

pub mod config;
mod error;
pub mod event;
pub mod frame;
mod inbox;
mod liveness;
pub mod metrics;
mod node;
mod poller;
mod roster;
mod runtime;

#[cfg(feature = "test-utils")]
pub mod testing;

pub use config::NodeConfig;
pub use error::MurmurError;
pub use event::{Event, EventCriteria, EventFields, EventType};
pub use frame::{FrameError, IntoFrame};
pub use metrics::{MetricsSnapshot, NodeMetrics};
pub use node::Node;
pub use poller::Poller;

pub use murmur_base::{z85, Cert, CertError, Certstore};
pub use murmur_transport::{interfaces, Authenticator, InterfaceInfo};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
