use std::io;

/// Errors returned by the murmur transport layer.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("connection to {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("not supported: {0}")]
    NotSupported(String),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("message serialization failed: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    #[error("message deserialization failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),

    #[error("handshake failed: {0}")]
    Handshake(String),

    #[error("link rejected: {0}")]
    Rejected(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("link closed")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_error_carries_endpoint() {
        let err = TransportError::Bind {
            endpoint: "tcp://127.0.0.1:1".into(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(err.to_string(), "failed to bind tcp://127.0.0.1:1: in use");
    }

    #[test]
    fn not_supported_display() {
        let err = TransportError::NotSupported("ipc endpoints on this platform".into());
        assert_eq!(err.to_string(), "not supported: ipc endpoints on this platform");
    }
}
