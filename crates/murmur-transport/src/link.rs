//! Listeners and framed links over inproc, TCP and IPC streams.
//!
//! A [`Link`] is a length-delimited stream that has completed the
//! [`Handshake`]. After the handshake every frame is one MessagePack value,
//! sealed when the link is secure.

use std::collections::HashMap;
use std::io;
use std::net::IpAddr;
use std::sync::{LazyLock, Mutex};

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::endpoint::Endpoint;
use crate::security::{LinkCipher, LinkSecurity};
use crate::wire::{self, Handshake, HANDSHAKE_VERSION};
use crate::TransportError;

/// Maximum frame size accepted from a peer (1 MB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Buffer size of each in-process pipe.
const INPROC_BUFFER: usize = 64 * 1024;

/// Any bidirectional byte stream a link can run over.
pub trait LinkStream: AsyncRead + AsyncWrite + Send + Unpin + 'static {}
impl<T: AsyncRead + AsyncWrite + Send + Unpin + 'static> LinkStream for T {}

pub type BoxStream = Box<dyn LinkStream>;

// ── In-process registry ─────────────────────────────────────────────

/// Bound `inproc://` names → acceptor channel of the owning listener.
static INPROC: LazyLock<Mutex<HashMap<String, mpsc::Sender<DuplexStream>>>> =
    LazyLock::new(Default::default);

fn inproc_registry() -> std::sync::MutexGuard<'static, HashMap<String, mpsc::Sender<DuplexStream>>> {
    INPROC.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

struct InprocListener {
    name: String,
    rx: mpsc::Receiver<DuplexStream>,
}

impl InprocListener {
    fn bind(name: &str) -> io::Result<Self> {
        let mut registry = inproc_registry();
        if registry.get(name).is_some_and(|tx| !tx.is_closed()) {
            return Err(io::Error::new(
                io::ErrorKind::AddrInUse,
                "inproc name already bound",
            ));
        }
        let (tx, rx) = mpsc::channel(64);
        registry.insert(name.to_string(), tx);
        Ok(Self {
            name: name.to_string(),
            rx,
        })
    }
}

impl Drop for InprocListener {
    fn drop(&mut self) {
        inproc_registry().remove(&self.name);
    }
}

// ── Listener ────────────────────────────────────────────────────────

enum ListenerKind {
    Inproc(InprocListener),
    Tcp(TcpListener),
    #[cfg(unix)]
    Ipc(tokio::net::UnixListener, std::path::PathBuf),
}

/// A bound endpoint accepting raw streams.
pub struct Listener {
    kind: ListenerKind,
    endpoint: Endpoint,
}

/// A freshly accepted stream, before the handshake.
pub struct Accepted {
    pub stream: BoxStream,
    pub peer_ip: Option<IpAddr>,
}

impl Listener {
    /// Bind `endpoint`. A wildcard TCP port is resolved to the port actually bound.
    pub async fn bind(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let bind_err = |source| TransportError::Bind {
            endpoint: endpoint.to_string(),
            source,
        };

        match endpoint {
            Endpoint::Inproc(name) => Ok(Self {
                kind: ListenerKind::Inproc(InprocListener::bind(name).map_err(bind_err)?),
                endpoint: endpoint.clone(),
            }),
            Endpoint::Tcp { host, port } => {
                let bind_host = if host == "*" { "0.0.0.0" } else { host.as_str() };
                let listener = TcpListener::bind((bind_host, port.unwrap_or(0)))
                    .await
                    .map_err(bind_err)?;
                let local = listener.local_addr().map_err(bind_err)?;
                Ok(Self {
                    kind: ListenerKind::Tcp(listener),
                    endpoint: Endpoint::Tcp {
                        host: host.clone(),
                        port: Some(local.port()),
                    },
                })
            }
            #[cfg(unix)]
            Endpoint::Ipc(path) => {
                let listener = tokio::net::UnixListener::bind(path).map_err(bind_err)?;
                Ok(Self {
                    kind: ListenerKind::Ipc(listener, path.clone()),
                    endpoint: endpoint.clone(),
                })
            }
            #[cfg(not(unix))]
            Endpoint::Ipc(_) => Err(TransportError::NotSupported(
                "ipc endpoints on this platform".into(),
            )),
        }
    }

    /// The bound endpoint. For TCP the port is concrete; a `*` host stays `*`.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Wait for the next incoming stream.
    pub async fn accept(&mut self) -> Result<Accepted, TransportError> {
        match &mut self.kind {
            ListenerKind::Inproc(inproc) => {
                let stream = inproc.rx.recv().await.ok_or(TransportError::Closed)?;
                Ok(Accepted {
                    stream: Box::new(stream),
                    peer_ip: None,
                })
            }
            ListenerKind::Tcp(listener) => {
                let (stream, addr) = listener.accept().await?;
                let _ = stream.set_nodelay(true);
                Ok(Accepted {
                    stream: Box::new(stream),
                    peer_ip: Some(addr.ip()),
                })
            }
            #[cfg(unix)]
            ListenerKind::Ipc(listener, _) => {
                let (stream, _) = listener.accept().await?;
                Ok(Accepted {
                    stream: Box::new(stream),
                    peer_ip: None,
                })
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        #[cfg(unix)]
        if let ListenerKind::Ipc(_, path) = &self.kind {
            let _ = std::fs::remove_file(path);
        }
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("endpoint", &self.endpoint.to_string())
            .finish()
    }
}

/// Open a raw stream to `endpoint`.
pub async fn connect_stream(endpoint: &Endpoint) -> Result<BoxStream, TransportError> {
    let connect_err = |source| TransportError::Connect {
        endpoint: endpoint.to_string(),
        source,
    };

    if endpoint.is_wildcard() {
        return Err(TransportError::InvalidEndpoint(format!(
            "cannot connect to wildcard endpoint {endpoint}"
        )));
    }

    match endpoint {
        Endpoint::Inproc(name) => {
            let acceptor = inproc_registry().get(name).cloned();
            let acceptor = acceptor.ok_or_else(|| {
                connect_err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "no inproc listener bound",
                ))
            })?;
            let (local, remote) = tokio::io::duplex(INPROC_BUFFER);
            acceptor.send(remote).await.map_err(|_| {
                connect_err(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "inproc listener closed",
                ))
            })?;
            Ok(Box::new(local))
        }
        Endpoint::Tcp { host, port } => {
            let port = port.unwrap_or(0);
            let stream = tokio::net::TcpStream::connect((host.as_str(), port))
                .await
                .map_err(connect_err)?;
            let _ = stream.set_nodelay(true);
            Ok(Box::new(stream))
        }
        #[cfg(unix)]
        Endpoint::Ipc(path) => {
            let stream = tokio::net::UnixStream::connect(path)
                .await
                .map_err(connect_err)?;
            Ok(Box::new(stream))
        }
        #[cfg(not(unix))]
        Endpoint::Ipc(_) => Err(TransportError::NotSupported(
            "ipc endpoints on this platform".into(),
        )),
    }
}

// ── Link ────────────────────────────────────────────────────────────

/// A handshaken, framed link.
pub struct Link {
    framed: Framed<BoxStream, LengthDelimitedCodec>,
    cipher: Option<LinkCipher>,
    peer_ip: Option<IpAddr>,
    peer_key: Option<[u8; 32]>,
}

impl Link {
    fn framed(stream: BoxStream) -> Framed<BoxStream, LengthDelimitedCodec> {
        let codec = LengthDelimitedCodec::builder()
            .max_frame_length(MAX_FRAME_SIZE)
            .new_codec();
        Framed::new(stream, codec)
    }

    /// Connect to `endpoint` and run the connector side of the handshake.
    pub async fn connect(
        endpoint: &Endpoint,
        security: &LinkSecurity,
    ) -> Result<Self, TransportError> {
        let stream = connect_stream(endpoint).await?;
        Self::connect_over(stream, security).await
    }

    /// Run the connector side of the handshake over an open stream.
    pub async fn connect_over(
        stream: BoxStream,
        security: &LinkSecurity,
    ) -> Result<Self, TransportError> {
        let mut framed = Self::framed(stream);
        let hello = Handshake::Hello {
            version: HANDSHAKE_VERSION,
            public_key: security.public_key(),
        };
        framed.send(Bytes::from(wire::encode(&hello)?)).await?;

        let reply = framed.next().await.ok_or(TransportError::Closed)??;
        let peer_key = match wire::decode::<Handshake>(&reply)? {
            Handshake::Welcome { public_key } => public_key,
            Handshake::Denied { reason } => return Err(TransportError::Rejected(reason)),
            Handshake::Hello { .. } => {
                return Err(TransportError::Handshake("unexpected hello from listener".into()))
            }
        };

        let cipher = match (security.is_secure(), peer_key) {
            (true, Some(key)) => Some(security.cipher_for(&key)?),
            (false, None) => None,
            _ => {
                return Err(TransportError::Handshake(
                    "security mode mismatch with listener".into(),
                ))
            }
        };

        Ok(Self {
            framed,
            cipher,
            peer_ip: None,
            peer_key,
        })
    }

    /// Run the listener side of the handshake, applying the authenticator.
    pub async fn accept(
        accepted: Accepted,
        security: &LinkSecurity,
    ) -> Result<Self, TransportError> {
        let Accepted { stream, peer_ip } = accepted;
        let mut framed = Self::framed(stream);

        let first = framed.next().await.ok_or(TransportError::Closed)??;
        let (version, peer_key) = match wire::decode::<Handshake>(&first)? {
            Handshake::Hello {
                version,
                public_key,
            } => (version, public_key),
            _ => return Err(TransportError::Handshake("expected hello".into())),
        };

        let verdict = Self::vet(version, peer_ip, peer_key.as_ref(), security);
        if let Err(reason) = verdict {
            let denied = Handshake::Denied {
                reason: reason.clone(),
            };
            let _ = framed.send(Bytes::from(wire::encode(&denied)?)).await;
            return Err(TransportError::Rejected(reason));
        }

        let cipher = match peer_key {
            Some(key) => Some(security.cipher_for(&key)?),
            None => None,
        };

        let welcome = Handshake::Welcome {
            public_key: security.public_key(),
        };
        framed.send(Bytes::from(wire::encode(&welcome)?)).await?;

        Ok(Self {
            framed,
            cipher,
            peer_ip,
            peer_key,
        })
    }

    fn vet(
        version: u8,
        peer_ip: Option<IpAddr>,
        peer_key: Option<&[u8; 32]>,
        security: &LinkSecurity,
    ) -> Result<(), String> {
        if version != HANDSHAKE_VERSION {
            return Err(format!("unsupported handshake version {version}"));
        }
        if let Some(auth) = security.authenticator() {
            if !auth.allows_address(peer_ip) {
                return Err("address not allowed".into());
            }
        }
        match (security.is_secure(), peer_key) {
            (true, Some(key)) => {
                let allowed = security
                    .authenticator()
                    .map_or(true, |auth| auth.allows_key(key));
                if allowed {
                    Ok(())
                } else {
                    Err("client key not allowed".into())
                }
            }
            (false, None) => Ok(()),
            (true, None) => Err("secure link required".into()),
            (false, Some(_)) => Err("listener does not accept secure links".into()),
        }
    }

    /// Remote IP for TCP links.
    pub fn peer_ip(&self) -> Option<IpAddr> {
        self.peer_ip
    }

    /// Remote public key for secure links.
    pub fn peer_key(&self) -> Option<&[u8; 32]> {
        self.peer_key.as_ref()
    }

    pub fn is_secure(&self) -> bool {
        self.cipher.is_some()
    }

    /// Serialize and send one message.
    pub async fn send<T: Serialize>(&mut self, msg: &T) -> Result<(), TransportError> {
        let mut data = wire::encode(msg)?;
        if let Some(cipher) = &self.cipher {
            data = cipher.seal(&data)?;
        }
        if data.len() > MAX_FRAME_SIZE {
            return Err(TransportError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("message too large: {} bytes (max {MAX_FRAME_SIZE})", data.len()),
            )));
        }
        self.framed.send(Bytes::from(data)).await?;
        Ok(())
    }

    /// Receive one message. `Ok(None)` means the peer closed the link.
    pub async fn recv<T: DeserializeOwned>(&mut self) -> Result<Option<T>, TransportError> {
        let Some(frame) = self.framed.next().await else {
            return Ok(None);
        };
        let frame = frame?;
        let data = match &self.cipher {
            Some(cipher) => cipher.open(&frame)?,
            None => frame.to_vec(),
        };
        Ok(Some(wire::decode(&data)?))
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("peer_ip", &self.peer_ip)
            .field("secure", &self.is_secure())
            .finish()
    }
}
