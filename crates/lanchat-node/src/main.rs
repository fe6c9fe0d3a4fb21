//! LAN-Chat node entry point.
//!
//! Parses the command line, loads the configuration, starts the node, and
//! then drives it from stdin until `/quit`, EOF, or Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! lanchat <NAME> [OPTIONS]
//!
//! Options:
//!   --pass <PASSWORD>       Shared password; enables verification and encryption
//!   --debug                 Write debug-level logs to ./debug.log
//!   --config <PATH>         Config file [default: platform config dir]
//!   --received-dir <DIR>    Where received files are written
//! ```
//!
//! The password may also come from `LANCHAT_PASSWORD`.  It is never stored
//! in the config file.

use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use lanchat_node::infrastructure::console::{
    parse_command, render_event, render_peers, Command, CommandError, HELP,
};
use lanchat_node::infrastructure::node::{Node, NodeHandle, NodeOptions};
use lanchat_node::infrastructure::storage::config::{load_config, load_config_from, AppConfig};

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Serverless LAN chat and file transfer with optional shared-password encryption.
#[derive(Debug, Parser)]
#[command(name = "lanchat", version)]
struct Cli {
    /// Display name announced to peers.
    name: String,

    /// Shared password.  Peers started with the same password exchange
    /// encrypted messages; leave empty to disable encryption.
    #[arg(long, default_value = "", env = "LANCHAT_PASSWORD", hide_env_values = true)]
    pass: String,

    /// Write debug-level logs to `debug.log` in the working directory.
    #[arg(long)]
    debug: bool,

    /// Path to the config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for received files; overrides `storage.received_dir`.
    #[arg(long)]
    received_dir: Option<PathBuf>,
}

impl Cli {
    fn load_config(&self) -> anyhow::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => load_config_from(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?,
            None => load_config().context("failed to load config")?,
        };
        if let Some(dir) = &self.received_dir {
            config.storage.received_dir = dir.clone();
        }
        Ok(config)
    }
}

fn init_logging(debug: bool, config: &AppConfig) -> anyhow::Result<()> {
    if debug {
        let file = File::create("debug.log").context("failed to create debug.log")?;
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::new("debug"))
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else {
        // Level from `RUST_LOG`, else from the config file.
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| EnvFilter::new(&config.node.log_level)),
            )
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = cli.load_config()?;
    init_logging(cli.debug, &config)?;

    info!("LAN-Chat starting as {}", cli.name);

    let (node, mut events) = Node::start(NodeOptions::new(cli.name.as_str(), &cli.pass, config))
        .await
        .context("failed to start node")?;

    println!(
        "lanchat: running as {} (encryption {}); type /help for commands",
        node.name(),
        if node.encryption_enabled() { "on" } else { "off" }
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line.context("failed to read stdin")? {
                    Some(line) => {
                        if !handle_line(&node, &line) {
                            break;
                        }
                    }
                    None => break,
                }
            }
            Some(event) = events.recv() => {
                println!("{}", render_event(&event));
            }
            _ = &mut shutdown => {
                info!("shutdown signal received");
                break;
            }
        }
    }

    node.shutdown().await;
    info!("LAN-Chat stopped");
    Ok(())
}

/// Runs one console command.  Returns `false` when the user asked to quit.
///
/// Sends run on their own task so a slow peer never blocks the prompt;
/// their failures arrive on the event stream.
fn handle_line(node: &NodeHandle, line: &str) -> bool {
    match parse_command(line) {
        Ok(Command::Quit) => return false,
        Ok(Command::Help) => println!("{HELP}"),
        Ok(Command::Peers) => println!("{}", render_peers(&node.peers())),
        Ok(Command::Chat { address, text }) => {
            let sender = node.sender();
            let name = node.name().to_string();
            tokio::spawn(async move {
                match sender.send_chat(address, &text).await {
                    Ok(framing) => println!("<{name}> {text} ({framing:?} to {address})"),
                    Err(e) => debug!("chat to {address} failed: {e}"),
                }
            });
        }
        Ok(Command::File { address, path }) => {
            let sender = node.sender();
            tokio::spawn(async move {
                if let Err(e) = sender.send_file(address, &path).await {
                    debug!("file {} to {address} failed: {e}", path.display());
                }
            });
        }
        Err(CommandError::Empty) => {}
        Err(e @ CommandError::Unknown(_)) => println!("{e}\n{HELP}"),
        Err(e) => println!("{e}"),
    }
    true
}
