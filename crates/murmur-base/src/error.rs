use std::path::PathBuf;

/// Errors returned by certificate, certificate store and Z85 operations.
#[derive(Debug, thiserror::Error)]
pub enum CertError {
    #[error("invalid key pair: expected two 32-byte or two 40-character keys")]
    InvalidKeyPair,

    #[error("invalid key: expected 32 bytes or 40 Z85 characters, got {len}")]
    InvalidKey { len: usize },

    #[error("public and secret key do not form a matching pair")]
    MismatchedKeyPair,

    #[error("invalid z85 input: {0}")]
    Z85(String),

    #[error("failed to load cert from {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    #[error("failed to save cert to {}: {source}", path.display())]
    Save {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read cert directory {}: {source}", path.display())]
    Directory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
