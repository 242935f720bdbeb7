//! Endpoint strings of the form `scheme://address`.
//!
//! - `inproc://name`: in-process pipe, no network
//! - `tcp://host:port`: `*` as host binds every interface, `*` or `0` as
//!   port picks an ephemeral one
//! - `ipc://path`: local socket (unix only)

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::TransportError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Inproc(String),
    Tcp { host: String, port: Option<u16> },
    Ipc(PathBuf),
}

impl Endpoint {
    /// `tcp://host:port`.
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp {
            host: host.into(),
            port: Some(port),
        }
    }

    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Inproc(_) => "inproc",
            Self::Tcp { .. } => "tcp",
            Self::Ipc(_) => "ipc",
        }
    }

    /// Whether this endpoint names a wildcard host or port, which is valid
    /// for binding but not for connecting.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Tcp { host, port } if host == "*" || port.is_none())
    }

    /// Replace a wildcard TCP host with `host`. Other endpoints are unchanged.
    pub fn with_host(self, host: impl Into<String>) -> Self {
        match self {
            Self::Tcp { host: h, port } if h == "*" => Self::Tcp {
                host: host.into(),
                port,
            },
            other => other,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inproc(name) => write!(f, "inproc://{name}"),
            Self::Tcp { host, port } => {
                let host = if host.contains(':') {
                    format!("[{host}]")
                } else {
                    host.clone()
                };
                match port {
                    Some(port) => write!(f, "tcp://{host}:{port}"),
                    None => write!(f, "tcp://{host}:*"),
                }
            }
            Self::Ipc(path) => write!(f, "ipc://{}", path.display()),
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TransportError::InvalidEndpoint(s.to_string());

        let (scheme, address) = s.split_once("://").ok_or_else(invalid)?;
        if address.is_empty() {
            return Err(invalid());
        }

        match scheme {
            "inproc" => Ok(Self::Inproc(address.to_string())),
            "ipc" => Ok(Self::Ipc(PathBuf::from(address))),
            "tcp" => {
                let (host, port) = address.rsplit_once(':').ok_or_else(invalid)?;
                let host = host
                    .strip_prefix('[')
                    .and_then(|h| h.strip_suffix(']'))
                    .unwrap_or(host);
                if host.is_empty() {
                    return Err(invalid());
                }
                let port = match port {
                    "*" | "0" => None,
                    p => Some(p.parse::<u16>().map_err(|_| invalid())?),
                };
                Ok(Self::Tcp {
                    host: host.to_string(),
                    port,
                })
            }
            _ => Err(invalid()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_scheme() {
        assert_eq!(
            "inproc://node-1".parse::<Endpoint>().unwrap(),
            Endpoint::Inproc("node-1".into())
        );
        assert_eq!(
            "tcp://127.0.0.1:5670".parse::<Endpoint>().unwrap(),
            Endpoint::tcp("127.0.0.1", 5670)
        );
        assert_eq!(
            "ipc:///tmp/murmur.sock".parse::<Endpoint>().unwrap(),
            Endpoint::Ipc("/tmp/murmur.sock".into())
        );
    }

    #[test]
    fn tcp_wildcards() {
        let ep: Endpoint = "tcp://*:*".parse().unwrap();
        assert!(ep.is_wildcard());
        assert_eq!(
            ep,
            Endpoint::Tcp {
                host: "*".into(),
                port: None
            }
        );

        let ep: Endpoint = "tcp://10.0.0.1:0".parse().unwrap();
        assert!(ep.is_wildcard());
        assert!(!Endpoint::tcp("10.0.0.1", 9000).is_wildcard());
    }

    #[test]
    fn ipv6_hosts_are_bracketed() {
        let ep: Endpoint = "tcp://[::1]:9000".parse().unwrap();
        assert_eq!(ep, Endpoint::tcp("::1", 9000));
        assert_eq!(ep.to_string(), "tcp://[::1]:9000");
    }

    #[test]
    fn display_roundtrips() {
        for s in ["inproc://a", "tcp://192.168.1.2:7000", "tcp://*:*", "ipc:///tmp/x"] {
            assert_eq!(s.parse::<Endpoint>().unwrap().to_string(), s);
        }
    }

    #[test]
    fn with_host_only_replaces_wildcard() {
        let ep: Endpoint = "tcp://*:7000".parse().unwrap();
        assert_eq!(ep.with_host("10.1.1.1"), Endpoint::tcp("10.1.1.1", 7000));
        let ep = Endpoint::tcp("10.2.2.2", 7000);
        assert_eq!(ep.clone().with_host("10.1.1.1"), ep);
    }

    #[test]
    fn rejects_malformed() {
        for s in ["", "inproc://", "udp://x:1", "tcp://nohost", "tcp://:1", "tcp://h:99999", "plain"] {
            assert!(s.parse::<Endpoint>().is_err(), "{s} should be rejected");
        }
    }
}
