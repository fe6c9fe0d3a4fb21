//! Line-oriented console driver for the `lanchat` binary.
//!
//! Parses slash commands typed on stdin and renders [`NodeEvent`]s and the
//! peer list as single lines of text.  Holds no state and no protocol logic;
//! `main` feeds it lines and prints what it returns.

use std::fmt::Write as _;
use std::net::IpAddr;
use std::path::PathBuf;

use lanchat_core::{NodeEvent, PeerRecord};
use thiserror::Error;

/// Usage text printed by `/help` and after an unknown command.
pub const HELP: &str = "\
commands:
  /peers                 list discovered peers
  /chat <ip> <text>      send a chat line
  /file <ip> <path>      send a file
  /help                  show this help
  /quit                  exit";

/// A parsed console command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Peers,
    Chat { address: IpAddr, text: String },
    File { address: IpAddr, path: PathBuf },
    Help,
    Quit,
}

/// Why a console line could not be turned into a [`Command`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("empty input")]
    Empty,

    #[error("unknown command: {0}")]
    Unknown(String),

    #[error("usage: {0}")]
    Usage(&'static str),

    #[error("not an IP address: {0}")]
    InvalidAddress(String),
}

/// Parses one console line.
///
/// # Errors
///
/// Returns [`CommandError`] for blank input, an unknown verb, missing
/// arguments, or an address that is not an IP literal.
pub fn parse_command(line: &str) -> Result<Command, CommandError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(CommandError::Empty);
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim_start()),
        None => (line, ""),
    };

    match verb {
        "/peers" => Ok(Command::Peers),
        "/help" => Ok(Command::Help),
        "/quit" | "/exit" => Ok(Command::Quit),
        "/chat" => {
            let (address, text) = address_and_rest(rest, "/chat <ip> <text>")?;
            Ok(Command::Chat {
                address,
                text: text.to_string(),
            })
        }
        "/file" => {
            let (address, path) = address_and_rest(rest, "/file <ip> <path>")?;
            Ok(Command::File {
                address,
                path: PathBuf::from(path),
            })
        }
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

fn address_and_rest<'a>(
    args: &'a str,
    usage: &'static str,
) -> Result<(IpAddr, &'a str), CommandError> {
    let (address, rest) = args
        .split_once(char::is_whitespace)
        .ok_or(CommandError::Usage(usage))?;
    let rest = rest.trim_start();
    if rest.is_empty() {
        return Err(CommandError::Usage(usage));
    }
    let address = address
        .parse()
        .map_err(|_| CommandError::InvalidAddress(address.to_string()))?;
    Ok((address, rest))
}

/// Renders one event as a single console line.
pub fn render_event(event: &NodeEvent) -> String {
    match event {
        NodeEvent::PeerSeen(peer) => {
            format!("* peer {} at {}", peer.display_name, peer.address)
        }
        NodeEvent::PeerVerified { address, secure } => {
            if *secure {
                format!("* {address} shares our password; messages are encrypted")
            } else {
                format!("* {address} could not be verified; messages are plaintext")
            }
        }
        NodeEvent::ChatReceived(msg) => {
            let lock = if msg.encrypted { " [enc]" } else { "" };
            format!("<{}@{}>{lock} {}", msg.sender, msg.from, msg.text)
        }
        NodeEvent::TransferStatus(status) => {
            if status.is_failure() {
                format!("! {status}")
            } else {
                format!("- {status}")
            }
        }
    }
}

/// Renders the peer list, one peer per line, in the order given.
pub fn render_peers(peers: &[PeerRecord]) -> String {
    if peers.is_empty() {
        return "no peers discovered yet".to_string();
    }
    let mut out = String::new();
    for peer in peers {
        let mode = if peer.secure { "secure" } else { "plain" };
        let _ = writeln!(
            out,
            "{:<16} {:<20} {:<7} {}",
            peer.address, peer.display_name, mode, peer.last_message_preview
        );
    }
    out.truncate(out.trim_end().len());
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
