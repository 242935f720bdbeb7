//! Wire vocabulary exchanged between nodes.
//!
//! Each message is one length-delimited frame carrying MessagePack. The
//! first frame a node sends on a new outbound link is always `Hello`.

use bytes::Bytes;
use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::TransportError;

/// Peer-to-peer protocol messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WireMessage {
    /// Introduces the sender: identity, where to reach it, current groups.
    Hello {
        uuid: String,
        name: String,
        endpoint: String,
        groups: Vec<String>,
        status: u8,
        headers: IndexMap<String, String>,
    },
    /// A direct multi-part message.
    Whisper { frames: Vec<Bytes> },
    /// A multi-part message for every member of `group`.
    Shout { group: String, frames: Vec<Bytes> },
    /// The sender joined `group`. `status` increments on every join/leave.
    Join { group: String, status: u8 },
    /// The sender left `group`.
    Leave { group: String, status: u8 },
    /// Liveness probe sent to an evasive peer.
    Ping,
    /// Answer to `Ping`.
    PingOk,
}

impl WireMessage {
    /// Short name for log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Hello { .. } => "HELLO",
            Self::Whisper { .. } => "WHISPER",
            Self::Shout { .. } => "SHOUT",
            Self::Join { .. } => "JOIN",
            Self::Leave { .. } => "LEAVE",
            Self::Ping => "PING",
            Self::PingOk => "PING-OK",
        }
    }
}

/// Link setup messages, always sent in the clear before any `WireMessage`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum Handshake {
    /// Connector → listener. Carries the connector's public key on secure links.
    Hello { version: u8, public_key: Option<[u8; 32]> },
    /// Listener → connector on success.
    Welcome { public_key: Option<[u8; 32]> },
    /// Listener → connector when the link is refused.
    Denied { reason: String },
}

pub(crate) const HANDSHAKE_VERSION: u8 = 1;

pub(crate) fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>, TransportError> {
    Ok(rmp_serde::to_vec(msg)?)
}

pub(crate) fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, TransportError> {
    Ok(rmp_serde::from_slice(data)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hello_survives_messagepack() {
        let mut headers = IndexMap::new();
        headers.insert("X-HELLO".to_string(), "World".to_string());
        let hello = WireMessage::Hello {
            uuid: "A".repeat(32),
            name: "alpha".into(),
            endpoint: "inproc://alpha".into(),
            groups: vec!["news".into()],
            status: 3,
            headers,
        };
        let decoded: WireMessage = decode(&encode(&hello).unwrap()).unwrap();
        assert_eq!(decoded, hello);
    }

    #[test]
    fn empty_whisper_is_valid() {
        let msg = WireMessage::Whisper { frames: vec![] };
        let decoded: WireMessage = decode(&encode(&msg).unwrap()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn garbage_fails_to_decode() {
        assert!(decode::<WireMessage>(&[0xc1, 0x00, 0xff]).is_err());
    }

    #[test]
    fn kinds_are_upper_case() {
        assert_eq!(WireMessage::Ping.kind(), "PING");
        assert_eq!(WireMessage::PingOk.kind(), "PING-OK");
    }
}
