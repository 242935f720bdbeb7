//! Certificate store keyed by Z85 public key.
//!
//! A store is either purely in memory or bound to a directory. Directory
//! stores are scanned on creation and rescanned on a lookup miss, so a
//! certificate saved into the directory later is still found. Inserted
//! certificates live in memory only.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::cert::{Cert, SECRET_SUFFIX};
use crate::CertError;

#[derive(Debug, Default)]
pub struct Certstore {
    location: Option<PathBuf>,
    certs: HashMap<String, Cert>,
}

impl Certstore {
    /// An empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store backed by `dir`, pre-populated from the certificates found there.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, CertError> {
        let dir = dir.as_ref().to_path_buf();
        let certs = scan(&dir)?;
        tracing::debug!(dir = %dir.display(), count = certs.len(), "certstore: loaded directory");
        Ok(Self {
            location: Some(dir),
            certs,
        })
    }

    /// The backing directory, if any.
    pub fn location(&self) -> Option<&Path> {
        self.location.as_deref()
    }

    /// Find a certificate by its 40-character public key. Returns a copy.
    pub fn lookup(&self, public_txt: &str) -> Option<Cert> {
        if let Some(cert) = self.certs.get(public_txt) {
            return Some(cert.clone());
        }

        let dir = self.location.as_ref()?;
        match scan(dir) {
            Ok(mut found) => found.remove(public_txt),
            Err(e) => {
                tracing::warn!("certstore: rescan failed: {e}");
                None
            }
        }
    }

    /// Store an independent copy of `cert`. Nothing is written to disk.
    pub fn insert(&mut self, cert: &Cert) {
        self.certs.insert(cert.public_txt(), cert.clone());
    }

    /// Whether a certificate with this public key is known.
    pub fn contains(&self, public_txt: &str) -> bool {
        self.lookup(public_txt).is_some()
    }

    /// Number of certificates currently held in memory.
    pub fn len(&self) -> usize {
        self.certs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.certs.is_empty()
    }

    /// Iterate over the certificates held in memory.
    pub fn iter(&self) -> impl Iterator<Item = &Cert> {
        self.certs.values()
    }
}

/// Load every readable certificate in `dir`. Unparseable files are skipped.
fn scan(dir: &Path) -> Result<HashMap<String, Cert>, CertError> {
    let dir_err = |source| CertError::Directory {
        path: dir.to_path_buf(),
        source,
    };

    let mut paths = Vec::new();
    for entry in fs::read_dir(dir).map_err(dir_err)? {
        let path = entry.map_err(dir_err)?.path();
        if path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut certs = HashMap::new();
    for path in paths {
        // Sorted order puts "x" before "x_secret"; loading "x" already picks
        // up its secret half, so the second entry is a duplicate.
        if path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_suffix(SECRET_SUFFIX))
            .is_some_and(|public_name| dir.join(public_name).is_file())
        {
            continue;
        }

        match Cert::load(&path).ok() {
            Some(cert) => {
                certs.entry(cert.public_txt()).or_insert(cert);
            }
            None => tracing::debug!(path = %path.display(), "certstore: skipping unreadable file"),
        }
    }
    Ok(certs)
}
