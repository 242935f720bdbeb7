//! murmur messaging engine.
//!
//! Everything below the node API: endpoint parsing, listeners and framed
//! links over in-process pipes, TCP and local sockets, CURVE-style link
//! security with an explicit [`Authenticator`], UDP beacon discovery and
//! the gossip rendezvous hub.
//!
//! ```rust,no_run
//! use murmur_transport::{Endpoint, Link, LinkSecurity, Listener, WireMessage};
//!
//! # async fn example() -> Result<(), murmur_transport::TransportError> {
//! let endpoint: Endpoint = "inproc://example".parse()?;
//! let mut listener = Listener::bind(&endpoint).await?;
//!
//! let mut client = Link::connect(&endpoint, &LinkSecurity::plain()).await?;
//! client.send(&WireMessage::Ping).await?;
//!
//! let mut server = Link::accept(listener.accept().await?, &LinkSecurity::plain()).await?;
//! let msg: Option<WireMessage> = server.recv().await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod beacon;
pub mod endpoint;
mod error;
pub mod gossip;
pub mod interfaces;
pub mod link;
pub mod security;
pub mod wire;

pub use auth::Authenticator;
pub use beacon::{Beacon, BeaconPacket, DEFAULT_BEACON_PORT};
pub use endpoint::Endpoint;
pub use error::TransportError;
pub use gossip::{GossipClient, GossipHub, GossipMessage};
pub use interfaces::{interfaces, InterfaceInfo};
pub use link::{Accepted, Link, Listener};
pub use security::LinkSecurity;
pub use wire::WireMessage;
