//! Link authentication policy.
//!
//! An [`Authenticator`] is an explicit handle: build it, hand clones to the
//! nodes that should enforce it, drop it when done. Address rules apply to
//! every TCP link; key rules apply to secure links only.

use std::collections::HashSet;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

use murmur_base::{z85, CertError, Certstore};

#[derive(Debug, Clone)]
enum CurvePolicy {
    AllowAny,
    Store(Arc<Certstore>),
}

#[derive(Debug, Clone)]
pub struct Authenticator {
    curve: CurvePolicy,
    allow: HashSet<IpAddr>,
    deny: HashSet<IpAddr>,
    verbose: bool,
}

impl Authenticator {
    /// Accept any client key on secure links.
    pub fn allow_any() -> Self {
        Self {
            curve: CurvePolicy::AllowAny,
            allow: HashSet::new(),
            deny: HashSet::new(),
            verbose: false,
        }
    }

    /// Accept only client keys present in `store`.
    pub fn with_certstore(store: Certstore) -> Self {
        Self {
            curve: CurvePolicy::Store(Arc::new(store)),
            ..Self::allow_any()
        }
    }

    /// Accept only client keys whose certificates are saved in `dir`.
    ///
    /// Certificates added to the directory later are picked up on demand.
    pub fn with_directory(dir: impl AsRef<Path>) -> Result<Self, CertError> {
        Ok(Self::with_certstore(Certstore::open(dir)?))
    }

    /// Whitelist an address. Once any address is allowed, all others are refused.
    pub fn allow(mut self, ip: IpAddr) -> Self {
        self.allow.insert(ip);
        self
    }

    /// Blacklist an address. Ignored while a whitelist is in effect.
    pub fn deny(mut self, ip: IpAddr) -> Self {
        self.deny.insert(ip);
        self
    }

    /// Log every decision at `info`.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Check a remote address. Links without one (inproc, ipc) always pass.
    pub fn allows_address(&self, ip: Option<IpAddr>) -> bool {
        let Some(ip) = ip else {
            return true;
        };
        let allowed = if self.allow.is_empty() {
            !self.deny.contains(&ip)
        } else {
            self.allow.contains(&ip)
        };
        self.log_decision("address", &ip.to_string(), allowed);
        allowed
    }

    /// Check a client's public key.
    pub fn allows_key(&self, public_key: &[u8; 32]) -> bool {
        let key_txt = z85::encode(public_key).unwrap_or_default();
        let allowed = match &self.curve {
            CurvePolicy::AllowAny => true,
            CurvePolicy::Store(store) => store.contains(&key_txt),
        };
        self.log_decision("key", &key_txt, allowed);
        allowed
    }

    fn log_decision(&self, what: &str, subject: &str, allowed: bool) {
        if self.verbose {
            tracing::info!(%what, %subject, allowed, "auth: decision");
        } else {
            tracing::trace!(%what, %subject, allowed, "auth: decision");
        }
    }
}

impl Default for Authenticator {
    fn default() -> Self {
        Self::allow_any()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_base::Cert;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn default_allows_everything() {
        let auth = Authenticator::default();
        assert!(auth.allows_address(Some(ip("10.0.0.1"))));
        assert!(auth.allows_address(None));
        assert!(auth.allows_key(Cert::new().public_key()));
    }

    #[test]
    fn deny_list_blocks_listed_addresses() {
        let auth = Authenticator::allow_any().deny(ip("10.0.0.66"));
        assert!(!auth.allows_address(Some(ip("10.0.0.66"))));
        assert!(auth.allows_address(Some(ip("10.0.0.1"))));
    }

    #[test]
    fn allow_list_wins_over_deny_list() {
        let auth = Authenticator::allow_any()
            .allow(ip("127.0.0.1"))
            .deny(ip("127.0.0.1"));
        assert!(auth.allows_address(Some(ip("127.0.0.1"))));
        assert!(!auth.allows_address(Some(ip("10.0.0.1"))));
        assert!(auth.allows_address(None));
    }

    #[test]
    fn certstore_policy_checks_keys() {
        let known = Cert::new();
        let mut store = Certstore::new();
        store.insert(&known);

        let auth = Authenticator::with_certstore(store);
        assert!(auth.allows_key(known.public_key()));
        assert!(!auth.allows_key(Cert::new().public_key()));
    }
}
