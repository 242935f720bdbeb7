mod common;
mod events;
mod keygen;
mod listen;
mod ping;
mod shout;

use clap::{Parser, Subcommand};
use common::NodeArgs;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "murmur", about = "Peer-to-peer group messaging node")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Join groups and print every event as a JSON line. Answers PING whispers.
    Listen {
        #[command(flatten)]
        node: NodeArgs,
        /// Groups to join (repeatable).
        #[arg(short, long)]
        group: Vec<String>,
    },

    /// Join a group and shout messages to it.
    Shout {
        #[command(flatten)]
        node: NodeArgs,
        /// Group to shout to.
        #[arg(short, long)]
        group: String,
        /// Message text; the sequence number is sent as a second frame.
        #[arg(short, long, default_value = "hello")]
        message: String,
        /// Number of shouts.
        #[arg(long, default_value = "10")]
        count: u32,
        /// Delay between shouts in ms.
        #[arg(long, default_value = "1000")]
        delay: u64,
        /// How long to wait for a group member before shouting, in ms.
        #[arg(long, default_value = "5000")]
        wait: u64,
    },

    /// Whisper PING to every peer that enters and report the PONG round trip.
    Ping {
        #[command(flatten)]
        node: NodeArgs,
        /// Pings per peer.
        #[arg(long, default_value = "5")]
        count: u32,
        /// Delay between pings in ms.
        #[arg(long, default_value = "1000")]
        delay: u64,
        /// Stop after this many seconds.
        #[arg(long, default_value = "30")]
        duration: u64,
    },

    /// Generate a certificate and save it as a public/secret file pair.
    Keygen {
        /// Path of the public file; the secret file gets a `_secret` suffix.
        #[arg(short, long)]
        out: PathBuf,
        /// Metadata entries as NAME=VALUE (repeatable).
        #[arg(long, value_parser = common::parse_pair)]
        meta: Vec<(String, String)>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let start = Instant::now();

    eprintln!("murmur v{}", murmur_protocol::VERSION);

    match cli.command {
        Command::Listen { node, group } => {
            let node = node.build().await?;
            listen::run(node, group, start).await?;
        }

        Command::Shout {
            node,
            group,
            message,
            count,
            delay,
            wait,
        } => {
            let node = node.build().await?;
            shout::run(
                node,
                shout::ShoutConfig {
                    group,
                    message,
                    count,
                    delay_ms: delay,
                    wait_ms: wait,
                },
                start,
            )
            .await?;
        }

        Command::Ping {
            node,
            count,
            delay,
            duration,
        } => {
            let node = node.build().await?;
            ping::run(
                node,
                ping::PingConfig {
                    count,
                    delay_ms: delay,
                    duration_s: duration,
                },
                start,
            )
            .await?;
        }

        Command::Keygen { out, meta } => {
            keygen::run(&out, meta)?;
        }
    }

    Ok(())
}
