use std::time::Duration;

use indexmap::IndexMap;
use murmur_transport::DEFAULT_BEACON_PORT;

/// Default beacon/heartbeat interval.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);
/// Default quiet time before a peer is reported EVASIVE.
pub const DEFAULT_EVASIVE_TIMEOUT: Duration = Duration::from_millis(5000);
/// Default quiet time (after which one more interval must pass) before SILENT.
pub const DEFAULT_SILENT_TIMEOUT: Duration = Duration::from_millis(5000);
/// Default quiet time before a peer is dropped with EXIT.
pub const DEFAULT_EXPIRED_TIMEOUT: Duration = Duration::from_millis(30000);
/// Default per-peer outbound queue depth.
pub const DEFAULT_LINK_BUFFER: usize = 1024;
/// Default number of unread events a node holds before dropping new ones.
pub const DEFAULT_EVENT_BUFFER: usize = 4096;

/// Node configuration, set through [`Node`](crate::Node) setters before start.
///
/// Environment overrides (read by [`NodeConfig::new`]):
/// - `MURMUR_BEACON_PORT`: UDP beacon port
/// - `MURMUR_INTERFACE`: network interface used for beacons
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub(crate) name: Option<String>,
    pub(crate) port: u16,
    pub(crate) interval: Duration,
    pub(crate) evasive_timeout: Duration,
    pub(crate) silent_timeout: Duration,
    pub(crate) expired_timeout: Duration,
    pub(crate) interface: Option<String>,
    pub(crate) headers: IndexMap<String, String>,
    pub(crate) verbose: bool,
    pub(crate) link_buffer: usize,
    pub(crate) event_buffer: usize,
}

impl NodeConfig {
    pub fn new() -> Self {
        let port = std::env::var("MURMUR_BEACON_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_BEACON_PORT);
        let interface = std::env::var("MURMUR_INTERFACE").ok().filter(|v| !v.is_empty());

        Self {
            name: None,
            port,
            interval: DEFAULT_INTERVAL,
            evasive_timeout: DEFAULT_EVASIVE_TIMEOUT,
            silent_timeout: DEFAULT_SILENT_TIMEOUT,
            expired_timeout: DEFAULT_EXPIRED_TIMEOUT,
            interface,
            headers: IndexMap::new(),
            verbose: false,
            link_buffer: DEFAULT_LINK_BUFFER,
            event_buffer: DEFAULT_EVENT_BUFFER,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn evasive_timeout(mut self, timeout: Duration) -> Self {
        self.evasive_timeout = timeout;
        self
    }

    pub fn silent_timeout(mut self, timeout: Duration) -> Self {
        self.silent_timeout = timeout;
        self
    }

    pub fn expired_timeout(mut self, timeout: Duration) -> Self {
        self.expired_timeout = timeout;
        self
    }

    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Outbound messages queued per peer before new ones are dropped.
    pub fn link_buffer(mut self, depth: usize) -> Self {
        self.link_buffer = depth.max(1);
        self
    }

    /// Unread events held for the application. Past this, new events are
    /// dropped and counted in [`NodeMetrics::events_dropped`](crate::NodeMetrics).
    pub fn event_buffer(mut self, depth: usize) -> Self {
        self.event_buffer = depth.max(1);
        self
    }

    pub fn headers(&self) -> &IndexMap<String, String> {
        &self.headers
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::new()
    }
}
