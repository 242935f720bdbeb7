//! UDP beacon discovery.
//!
//! Each node broadcasts a 22-byte beacon on a shared port every interval:
//! `"ZRE"`, version `0x01`, the 16-byte node uuid, and the node's TCP
//! listening port (big endian). Port 0 announces departure.

use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};

use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

use crate::interfaces;
use crate::TransportError;

/// Default beacon port.
pub const DEFAULT_BEACON_PORT: u16 = 5670;

const PREFIX: &[u8; 3] = b"ZRE";
const VERSION: u8 = 0x01;

/// Encoded beacon size in bytes.
pub const BEACON_SIZE: usize = 22;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeaconPacket {
    pub uuid: [u8; 16],
    pub port: u16,
}

impl BeaconPacket {
    pub fn new(uuid: [u8; 16], port: u16) -> Self {
        Self { uuid, port }
    }

    /// The departure beacon for `uuid`.
    pub fn departure(uuid: [u8; 16]) -> Self {
        Self { uuid, port: 0 }
    }

    pub fn is_departure(&self) -> bool {
        self.port == 0
    }

    pub fn encode(&self) -> [u8; BEACON_SIZE] {
        let mut out = [0u8; BEACON_SIZE];
        out[..3].copy_from_slice(PREFIX);
        out[3] = VERSION;
        out[4..20].copy_from_slice(&self.uuid);
        out[20..].copy_from_slice(&self.port.to_be_bytes());
        out
    }

    /// Parse a received datagram. Foreign or malformed datagrams yield `None`.
    pub fn decode(data: &[u8]) -> Option<Self> {
        if data.len() != BEACON_SIZE || &data[..3] != PREFIX || data[3] != VERSION {
            return None;
        }
        let mut uuid = [0u8; 16];
        uuid.copy_from_slice(&data[4..20]);
        let port = u16::from_be_bytes([data[20], data[21]]);
        Some(Self { uuid, port })
    }
}

/// A UDP socket bound to the beacon port with broadcast enabled.
///
/// Several beacons may share one port on the same host.
#[derive(Debug)]
pub struct Beacon {
    socket: UdpSocket,
    target: SocketAddr,
    local_ip: IpAddr,
}

impl Beacon {
    /// Bind the beacon port. `interface` selects the broadcast interface by
    /// name; `None` uses the default route's interface, falling back to
    /// loopback with the limited broadcast address.
    pub fn bind(port: u16, interface: Option<&str>) -> Result<Self, TransportError> {
        let (local_ip, broadcast) = match interfaces::select(interface) {
            Some(info) => (IpAddr::V4(info.address), info.broadcast),
            None => {
                if let Some(name) = interface {
                    tracing::warn!(interface = %name, "beacon: interface not found, using loopback");
                }
                (IpAddr::V4(Ipv4Addr::LOCALHOST), Ipv4Addr::BROADCAST)
            }
        };

        let socket = Self::open_socket(port).map_err(|source| TransportError::Bind {
            endpoint: format!("udp://*:{port}"),
            source,
        })?;

        tracing::debug!(%local_ip, %broadcast, port, "beacon: bound");
        Ok(Self {
            socket,
            target: SocketAddr::V4(SocketAddrV4::new(broadcast, port)),
            local_ip,
        })
    }

    fn open_socket(port: u16) -> io::Result<UdpSocket> {
        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_reuse_address(true)?;
        #[cfg(all(unix, not(any(target_os = "solaris", target_os = "illumos"))))]
        socket.set_reuse_port(true)?;
        socket.set_broadcast(true)?;
        socket.set_nonblocking(true)?;
        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        socket.bind(&SocketAddr::V4(addr).into())?;
        UdpSocket::from_std(socket.into())
    }

    /// Address peers should use to reach this host's TCP listener.
    pub fn local_ip(&self) -> IpAddr {
        self.local_ip
    }

    /// Broadcast one beacon.
    pub async fn publish(&self, packet: &BeaconPacket) -> Result<(), TransportError> {
        self.socket.send_to(&packet.encode(), self.target).await?;
        Ok(())
    }

    /// Wait for the next well-formed beacon.
    pub async fn recv(&self) -> Result<(BeaconPacket, SocketAddr), TransportError> {
        let mut buf = [0u8; 64];
        loop {
            let (len, from) = self.socket.recv_from(&mut buf).await?;
            match BeaconPacket::decode(&buf[..len]) {
                Some(packet) => return Ok((packet, from)),
                None => tracing::trace!(%from, len, "beacon: ignoring foreign datagram"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packet_layout() {
        let packet = BeaconPacket::new([0xAB; 16], 0x1234);
        let bytes = packet.encode();
        assert_eq!(&bytes[..4], b"ZRE\x01");
        assert_eq!(&bytes[4..20], &[0xAB; 16]);
        assert_eq!(&bytes[20..], &[0x12, 0x34]);
        assert_eq!(BeaconPacket::decode(&bytes), Some(packet));
    }

    #[test]
    fn departure_uses_port_zero() {
        let packet = BeaconPacket::departure([1; 16]);
        assert!(packet.is_departure());
        assert!(!BeaconPacket::new([1; 16], 9).is_departure());
    }

    #[test]
    fn foreign_datagrams_rejected() {
        assert_eq!(BeaconPacket::decode(b"hello"), None);
        let mut bytes = BeaconPacket::new([2; 16], 1).encode();
        bytes[3] = 0x02;
        assert_eq!(BeaconPacket::decode(&bytes), None);
        let bytes = BeaconPacket::new([2; 16], 1).encode();
        assert_eq!(BeaconPacket::decode(&bytes[..21]), None);
    }
}
