//! CURVE certificates: an X25519 key pair plus ordered metadata.
//!
//! A certificate is saved as a small indented text document. `save` writes a
//! public file at `path` and a secret file at `path + "_secret"`; `load`
//! prefers the secret file when both exist.

use std::fmt;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rand::RngCore;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::z85;
use crate::CertError;

/// The all-zero key marking the secret half of a public-only certificate.
pub const EMPTY_KEY: [u8; 32] = [0u8; 32];

/// [`EMPTY_KEY`] in Z85 text form.
pub const Z85_EMPTY_KEY: &str = "0000000000000000000000000000000000000000";

/// Suffix appended to a certificate path for its secret file.
pub const SECRET_SUFFIX: &str = "_secret";

/// An X25519 key pair with string metadata.
///
/// Equality compares key material only; metadata is ignored. `Clone`
/// produces an independent deep copy.
#[derive(Clone)]
pub struct Cert {
    public: [u8; 32],
    secret: [u8; 32],
    meta: IndexMap<String, String>,
}

impl Cert {
    /// Generate a fresh random key pair.
    pub fn new() -> Self {
        let mut seed = [0u8; 32];
        rand::rng().fill_bytes(&mut seed);
        let secret = StaticSecret::from(seed);
        let public = PublicKey::from(&secret);
        Self {
            public: public.to_bytes(),
            secret: secret.to_bytes(),
            meta: IndexMap::new(),
        }
    }

    /// Build a certificate from explicit key material.
    ///
    /// Accepts either two raw 32-byte keys or two 40-character Z85 keys.
    /// An all-zero secret yields a public-only certificate; any other secret
    /// must match the public key.
    pub fn from_keys(
        public: impl AsRef<[u8]>,
        secret: impl AsRef<[u8]>,
    ) -> Result<Self, CertError> {
        let (public, secret) = (public.as_ref(), secret.as_ref());
        let (public, secret) = match (public.len(), secret.len()) {
            (32, 32) => (raw_key(public)?, raw_key(secret)?),
            (40, 40) => (text_key(public)?, text_key(secret)?),
            _ => return Err(CertError::InvalidKeyPair),
        };

        if secret != EMPTY_KEY {
            let derived = PublicKey::from(&StaticSecret::from(secret));
            if derived.to_bytes() != public {
                return Err(CertError::MismatchedKeyPair);
            }
        }

        Ok(Self {
            public,
            secret,
            meta: IndexMap::new(),
        })
    }

    /// Build a public-only certificate from a 32-byte or 40-character key.
    pub fn from_public(public: impl AsRef<[u8]>) -> Result<Self, CertError> {
        let public = public.as_ref();
        let public = match public.len() {
            32 => raw_key(public)?,
            40 => text_key(public)?,
            len => return Err(CertError::InvalidKey { len }),
        };
        Ok(Self {
            public,
            secret: EMPTY_KEY,
            meta: IndexMap::new(),
        })
    }

    /// Load a certificate saved with [`Cert::save`], [`Cert::save_public`] or
    /// [`Cert::save_secret`].
    ///
    /// `path + "_secret"` is tried first so that a full pair wins over its
    /// public half.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CertError> {
        let path = path.as_ref();
        let secret_path = secret_path(path);

        let text = fs::read_to_string(&secret_path)
            .or_else(|_| fs::read_to_string(path))
            .map_err(|e| CertError::Load {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        parse(&text).map_err(|reason| CertError::Load {
            path: path.to_path_buf(),
            reason,
        })
    }

    // ── Key accessors ────────────────────────────────────────────────

    pub fn public_key(&self) -> &[u8; 32] {
        &self.public
    }

    /// The secret key, or [`EMPTY_KEY`] for a public-only certificate.
    pub fn secret_key(&self) -> &[u8; 32] {
        &self.secret
    }

    pub fn public_txt(&self) -> String {
        z85::encode_key(&self.public)
    }

    pub fn secret_txt(&self) -> String {
        z85::encode_key(&self.secret)
    }

    /// Whether this certificate carries secret key material.
    pub fn has_secret(&self) -> bool {
        self.secret != EMPTY_KEY
    }

    // ── Metadata ─────────────────────────────────────────────────────

    /// Set a metadata value, replacing any previous value under `name`.
    pub fn set_meta(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.meta.insert(name.into(), value.into());
    }

    pub fn meta(&self, name: &str) -> Option<&str> {
        self.meta.get(name).map(String::as_str)
    }

    /// Metadata names in insertion order.
    pub fn meta_keys(&self) -> Vec<&str> {
        self.meta.keys().map(String::as_str).collect()
    }

    /// Remove a metadata entry, returning its value if it was set.
    pub fn unset_meta(&mut self, name: &str) -> Option<String> {
        self.meta.shift_remove(name)
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Write the public certificate to `path` and the full pair to
    /// `path + "_secret"`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), CertError> {
        let path = path.as_ref();
        self.save_public(path)?;
        self.save_secret(secret_path(path))
    }

    /// Write only the public key and metadata to `path`.
    pub fn save_public(&self, path: impl AsRef<Path>) -> Result<(), CertError> {
        let path = path.as_ref();
        write_file(path, &self.render(false), false)
    }

    /// Write the full key pair and metadata to `path`.
    pub fn save_secret(&self, path: impl AsRef<Path>) -> Result<(), CertError> {
        let path = path.as_ref();
        write_file(path, &self.render(true), true)
    }

    fn render(&self, with_secret: bool) -> String {
        let mut out = String::new();
        out.push_str("#   ****  Generated by murmur  ****\n");
        if with_secret {
            out.push_str("#   CURVE **Secret** Certificate\n");
            out.push_str("#   DO NOT PROVIDE THIS FILE TO OTHER USERS nor change its permissions.\n");
        } else {
            out.push_str("#   CURVE Public Certificate\n");
            out.push_str("#   Exchange securely, or use a secure mechanism to verify the contents\n");
            out.push_str("#   of this file after exchange. Store public certificates in your home\n");
            out.push_str("#   directory, in the .curve subdirectory.\n");
        }
        out.push('\n');

        out.push_str("metadata\n");
        for (name, value) in &self.meta {
            out.push_str(&format!(
                "    {} = \"{}\"\n",
                escape(name, true),
                escape(value, false)
            ));
        }
        out.push_str("curve\n");
        out.push_str(&format!("    public-key = \"{}\"\n", self.public_txt()));
        if with_secret {
            out.push_str(&format!("    secret-key = \"{}\"\n", self.secret_txt()));
        }
        out
    }
}

impl Default for Cert {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Cert {
    fn eq(&self, other: &Self) -> bool {
        self.public == other.public && self.secret == other.secret
    }
}

impl Eq for Cert {}

impl fmt::Debug for Cert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cert")
            .field("public", &self.public_txt())
            .field("has_secret", &self.has_secret())
            .field("meta", &self.meta)
            .finish()
    }
}

/// `path + "_secret"`.
pub fn secret_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(SECRET_SUFFIX);
    PathBuf::from(os)
}

fn raw_key(bytes: &[u8]) -> Result<[u8; 32], CertError> {
    bytes
        .try_into()
        .map_err(|_| CertError::InvalidKey { len: bytes.len() })
}

fn text_key(bytes: &[u8]) -> Result<[u8; 32], CertError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| CertError::Z85("key text is not valid UTF-8".into()))?;
    z85::decode_key(text)
}

fn write_file(path: &Path, contents: &str, private: bool) -> Result<(), CertError> {
    let save_err = |source| CertError::Save {
        path: path.to_path_buf(),
        source,
    };

    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    if private {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = options.open(path).map_err(save_err)?;
    file.write_all(contents.as_bytes()).map_err(save_err)?;
    file.flush().map_err(save_err)
}

// ── Parsing ─────────────────────────────────────────────────────────

fn parse(text: &str) -> Result<Cert, String> {
    let mut section = String::new();
    let mut meta = IndexMap::new();
    let mut public = None;
    let mut secret = None;

    for (lineno, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        if !line.starts_with(' ') && !line.starts_with('\t') {
            section = trimmed.to_string();
            continue;
        }

        let (key, value) = trimmed
            .split_once('=')
            .ok_or_else(|| format!("line {}: expected `name = \"value\"`", lineno + 1))?;
        let key = key.trim();
        let value = unquote(value.trim());

        match (section.as_str(), key) {
            ("metadata", _) => {
                let key = unescape(key).map_err(|e| format!("line {}: {e}", lineno + 1))?;
                let value = unescape(value).map_err(|e| format!("line {}: {e}", lineno + 1))?;
                meta.insert(key, value);
            }
            ("curve", "public-key") => public = Some(value.to_string()),
            ("curve", "secret-key") => secret = Some(value.to_string()),
            _ => {}
        }
    }

    let public = public.ok_or("missing curve/public-key")?;
    let mut cert = match secret {
        Some(secret) => Cert::from_keys(public.as_bytes(), secret.as_bytes()),
        None => Cert::from_public(public.as_bytes()),
    }
    .map_err(|e| e.to_string())?;
    cert.meta = meta;
    Ok(cert)
}

/// Backslash-escape metadata text so every entry stays on one
/// `name = "value"` line. Names also escape `=` and whitespace.
fn escape(text: &str, name: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() || (name && (c == '=' || c.is_whitespace())) => {
                out.push_str(&format!("\\u{{{:x}}}", c as u32));
            }
            c => out.push(c),
        }
    }
    out
}

fn unescape(text: &str) -> Result<String, String> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('u') => {
                let rest = chars.as_str();
                let code = rest
                    .strip_prefix('{')
                    .and_then(|r| r.split_once('}'))
                    .ok_or("malformed \\u{..} escape")?
                    .0;
                let decoded = u32::from_str_radix(code, 16)
                    .ok()
                    .and_then(char::from_u32)
                    .ok_or_else(|| format!("invalid escape \\u{{{code}}}"))?;
                out.push(decoded);
                // skip `{code}`
                chars = rest[code.len() + 2..].chars();
            }
            Some(other) => return Err(format!("unknown escape \\{other}")),
            None => return Err("dangling backslash".into()),
        }
    }
    Ok(out)
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_cert_has_matching_pair() {
        let cert = Cert::new();
        assert!(cert.has_secret());
        assert_eq!(cert.public_txt().len(), 40);
        assert_eq!(cert.secret_txt().len(), 40);
        let again = Cert::from_keys(cert.public_key(), cert.secret_key()).unwrap();
        assert_eq!(again, cert);
    }

    #[test]
    fn from_keys_detects_encoding_by_length() {
        let cert = Cert::new();
        let from_txt = Cert::from_keys(cert.public_txt(), cert.secret_txt()).unwrap();
        assert_eq!(from_txt.public_key(), cert.public_key());
        assert_eq!(from_txt.secret_key(), cert.secret_key());
    }

    #[test]
    fn from_keys_rejects_mixed_lengths() {
        let cert = Cert::new();
        let err = Cert::from_keys(cert.public_key(), cert.secret_txt()).unwrap_err();
        assert!(matches!(err, CertError::InvalidKeyPair));
        assert!(matches!(
            Cert::from_keys(b"short", b"short"),
            Err(CertError::InvalidKeyPair)
        ));
    }

    #[test]
    fn from_keys_rejects_mismatched_secret() {
        let a = Cert::new();
        let b = Cert::new();
        assert!(matches!(
            Cert::from_keys(a.public_key(), b.secret_key()),
            Err(CertError::MismatchedKeyPair)
        ));
    }

    #[test]
    fn zero_secret_is_public_only() {
        let cert = Cert::new();
        let public_only = Cert::from_keys(cert.public_key(), EMPTY_KEY).unwrap();
        assert!(!public_only.has_secret());
        assert_eq!(public_only.secret_txt(), Z85_EMPTY_KEY);
    }

    #[test]
    fn from_public_accepts_both_encodings() {
        let cert = Cert::new();
        let a = Cert::from_public(cert.public_key()).unwrap();
        let b = Cert::from_public(cert.public_txt()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.secret_key(), &EMPTY_KEY);
        assert!(matches!(
            Cert::from_public(b"nope"),
            Err(CertError::InvalidKey { len: 4 })
        ));
    }

    #[test]
    fn metadata_keeps_insertion_order_and_overwrites() {
        let mut cert = Cert::new();
        cert.set_meta("name", "alice");
        cert.set_meta("organization", "acme");
        cert.set_meta("name", "bob");
        assert_eq!(cert.meta("name"), Some("bob"));
        assert_eq!(cert.meta_keys(), vec!["name", "organization"]);

        assert_eq!(cert.unset_meta("name").as_deref(), Some("bob"));
        assert_eq!(cert.meta("name"), None);
        assert_eq!(cert.meta_keys(), vec!["organization"]);
    }

    #[test]
    fn equality_ignores_metadata() {
        let mut a = Cert::new();
        let b = a.clone();
        a.set_meta("name", "changed");
        assert_eq!(a, b);
        assert_ne!(a, Cert::new());
    }

    #[test]
    fn clone_is_independent() {
        let mut original = Cert::new();
        original.set_meta("name", "original");
        let mut copy = original.clone();
        copy.set_meta("name", "copy");
        assert_eq!(original.meta("name"), Some("original"));
        assert_eq!(copy.meta("name"), Some("copy"));
    }

    #[test]
    fn debug_hides_secret() {
        let cert = Cert::new();
        let debug = format!("{cert:?}");
        assert!(debug.contains(&cert.public_txt()));
        assert!(!debug.contains(&cert.secret_txt()));
    }

    #[test]
    fn parse_ignores_comments_and_unknown_sections() {
        let cert = Cert::new();
        let text = format!(
            "# comment\n\nother\n    x = \"y\"\nmetadata\n    name = \"n\"\ncurve\n    public-key = \"{}\"\n",
            cert.public_txt()
        );
        let parsed = parse(&text).unwrap();
        assert_eq!(parsed.public_key(), cert.public_key());
        assert_eq!(parsed.meta_keys(), vec!["name"]);
        assert!(!parsed.has_secret());
    }

    #[test]
    fn parse_requires_public_key() {
        assert!(parse("metadata\n    name = \"n\"\n").is_err());
    }
}
