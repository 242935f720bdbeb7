use clap::Args;
use murmur_protocol::{Authenticator, Cert, Node, NodeConfig};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// First frame of a ping whisper.
pub const PING: &str = "PING";
/// First frame of the reply to a ping.
pub const PONG: &str = "PONG";

/// Node identity, discovery and security flags shared by every subcommand.
#[derive(Args)]
pub struct NodeArgs {
    /// Public name of this node.
    #[arg(short, long)]
    pub name: Option<String>,

    /// UDP beacon port (beacon discovery).
    #[arg(long)]
    pub port: Option<u16>,

    /// Network interface for beacons.
    #[arg(long)]
    pub interface: Option<String>,

    /// Beacon interval in ms.
    #[arg(long)]
    pub interval: Option<u64>,

    /// Link endpoint to bind, e.g. tcp://*:5800. Required for gossip.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// Run a gossip hub on this endpoint (switches to gossip discovery).
    #[arg(long)]
    pub gossip_bind: Option<String>,

    /// Gossip hub to discover peers through (repeatable).
    #[arg(long)]
    pub gossip_connect: Vec<String>,

    /// Header advertised to peers as NAME=VALUE (repeatable).
    #[arg(long, value_parser = parse_pair)]
    pub header: Vec<(String, String)>,

    /// Certificate for encrypted links (public file path; the secret file must exist).
    #[arg(long)]
    pub cert: Option<PathBuf>,

    /// Only accept clients whose certificates are in this directory.
    #[arg(long, requires = "cert")]
    pub trust_dir: Option<PathBuf>,

    /// Log every wire message at info.
    #[arg(short, long)]
    pub verbose: bool,
}

impl NodeArgs {
    /// Configure a node from the flags. The node is not started.
    pub async fn build(&self) -> anyhow::Result<Node> {
        let mut config = NodeConfig::new().verbose(self.verbose);
        if let Some(name) = &self.name {
            config = config.name(name.clone());
        }
        if let Some(port) = self.port {
            config = config.port(port);
        }
        if let Some(interface) = &self.interface {
            config = config.interface(interface.clone());
        }
        if let Some(ms) = self.interval {
            config = config.interval(Duration::from_millis(ms));
        }
        for (name, value) in &self.header {
            config = config.header(name.clone(), value.clone());
        }

        let node = Node::with_config(config);
        if let Some(endpoint) = &self.endpoint {
            node.set_endpoint(endpoint).await?;
        }
        if let Some(hub) = &self.gossip_bind {
            node.gossip_bind(hub).await?;
        }
        for hub in &self.gossip_connect {
            node.gossip_connect(hub)?;
        }
        if let Some(path) = &self.cert {
            let cert = Cert::load(path)?;
            node.set_cert(&cert)?;
            let authenticator = match &self.trust_dir {
                Some(dir) => Authenticator::with_directory(dir)?,
                None => Authenticator::allow_any(),
            };
            node.set_authenticator(authenticator.verbose(self.verbose))?;
        }
        tracing::debug!(node = %node.uuid(), secure = self.cert.is_some(), "node configured");
        Ok(node)
    }
}

/// Parse `NAME=VALUE`.
pub fn parse_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got '{s}'")),
    }
}

/// Setup Ctrl+C handler, returns a flag that goes false on signal.
pub fn setup_ctrlc() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        eprintln!("\nCtrl+C received, shutting down...");
        r.store(false, Ordering::Relaxed);
    });
    running
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pairs_split_on_first_equals() {
        assert_eq!(
            parse_pair("X-Role=a=b").unwrap(),
            ("X-Role".to_string(), "a=b".to_string())
        );
        assert_eq!(parse_pair("empty=").unwrap(), ("empty".into(), String::new()));
        assert!(parse_pair("novalue").is_err());
        assert!(parse_pair("=x").is_err());
    }
}
