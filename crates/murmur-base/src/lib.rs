//! Base types for the murmur stack.
//!
//! - [`Cert`]: an X25519 key pair with metadata, saved as a public/secret file pair
//! - [`Certstore`]: certificates keyed by Z85 public key, optionally directory backed
//! - [`z85`]: the printable key encoding

pub mod cert;
pub mod certstore;
mod error;
pub mod z85;

pub use cert::{Cert, EMPTY_KEY, Z85_EMPTY_KEY};
pub use certstore::Certstore;
pub use error::CertError;
