/// Link security: static X25519 keys from a [`Cert`], one shared key per link.
///
/// Both ends derive the link key from X25519(own secret, peer public) via
/// HKDF-SHA256, then seal every frame with XChaCha20-Poly1305 under a fresh
/// random 24-byte nonce. A sealed frame is `nonce || ciphertext`.
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    XChaCha20Poly1305, XNonce,
};
use hkdf::Hkdf;
use murmur_base::Cert;
use rand::RngCore;
use sha2::Sha256;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::auth::Authenticator;
use crate::TransportError;

/// HKDF info string for domain separation.
const HKDF_INFO: &[u8] = b"murmur-link-xchacha20poly1305-v1";

const NONCE_LEN: usize = 24;

/// What a node brings to each link it opens or accepts.
#[derive(Debug, Clone, Default)]
pub struct LinkSecurity {
    cert: Option<Cert>,
    authenticator: Option<Authenticator>,
}

impl LinkSecurity {
    /// Unencrypted links, no key checks.
    pub fn plain() -> Self {
        Self::default()
    }

    /// Encrypted links using `cert`, which must carry a secret key.
    pub fn secure(cert: Cert) -> Result<Self, TransportError> {
        if !cert.has_secret() {
            return Err(TransportError::Crypto(
                "certificate has no secret key".into(),
            ));
        }
        Ok(Self {
            cert: Some(cert),
            authenticator: None,
        })
    }

    /// Enforce `authenticator` on accepted links.
    pub fn with_authenticator(mut self, authenticator: Authenticator) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn is_secure(&self) -> bool {
        self.cert.is_some()
    }

    pub fn public_key(&self) -> Option<[u8; 32]> {
        self.cert.as_ref().map(|c| *c.public_key())
    }

    pub fn authenticator(&self) -> Option<&Authenticator> {
        self.authenticator.as_ref()
    }

    pub(crate) fn cipher_for(&self, peer_public: &[u8; 32]) -> Result<LinkCipher, TransportError> {
        let cert = self
            .cert
            .as_ref()
            .ok_or_else(|| TransportError::Crypto("link is not secure".into()))?;
        LinkCipher::new(cert.secret_key(), peer_public)
    }
}

/// Symmetric frame sealing for one link.
pub(crate) struct LinkCipher {
    cipher: XChaCha20Poly1305,
}

impl LinkCipher {
    pub(crate) fn new(secret: &[u8; 32], peer_public: &[u8; 32]) -> Result<Self, TransportError> {
        let secret = StaticSecret::from(*secret);
        let shared = secret.diffie_hellman(&PublicKey::from(*peer_public));
        if !shared.was_contributory() {
            return Err(TransportError::Crypto("peer sent a low-order public key".into()));
        }

        let hkdf = Hkdf::<Sha256>::new(None, shared.as_bytes());
        let mut key = [0u8; 32];
        hkdf.expand(HKDF_INFO, &mut key)
            .map_err(|e| TransportError::Crypto(format!("key derivation failed: {e}")))?;

        Ok(Self {
            cipher: XChaCha20Poly1305::new(&key.into()),
        })
    }

    pub(crate) fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, TransportError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill_bytes(&mut nonce_bytes);
        let nonce = XNonce::from(nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| TransportError::Crypto(format!("encryption failed: {e}")))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(sealed)
    }

    pub(crate) fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, TransportError> {
        if sealed.len() < NONCE_LEN {
            return Err(TransportError::Crypto("sealed frame too short".into()));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(XNonce::from_slice(nonce), ciphertext)
            .map_err(|_| TransportError::Crypto("frame authentication failed".into()))
    }
}
