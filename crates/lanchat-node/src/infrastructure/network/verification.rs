//! Initiating side of the verification handshake.
//!
//! ```text
//! dial <peer>:<transfer_port>  ── fail ──────────────────►  Unreachable
//!   │
//!   ▼
//! send "VERIFY:<fingerprint>\n"
//!   │
//!   ▼
//! read one line ── "VMATCH" ──────────────────────────────►  Match
//!               ── "VNOMATCH" / anything else ────────────►  NoMatch
//!               ── read error / timeout / EOF / overlong ──►  Unreachable
//! ```
//!
//! Every branch is terminal; there is no retry.  Only `Match` makes the
//! peer secure, so any failure falls back to plaintext.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lanchat_core::protocol::parse_reply;
use lanchat_core::{encode_header, Header, Reply, SharedSecret};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::time;

use crate::application::discover_peers::{PeerVerifier, VerificationOutcome};
use crate::infrastructure::network::transport::{connect_with_timeout, read_reply_line};

/// Runs `VERIFY` handshakes over TCP.
#[derive(Debug, Clone)]
pub struct TcpPeerVerifier {
    secret: Arc<SharedSecret>,
    port: u16,
    connect_timeout: Duration,
    reply_timeout: Duration,
}

impl TcpPeerVerifier {
    pub fn new(
        secret: Arc<SharedSecret>,
        port: u16,
        connect_timeout: Duration,
        reply_timeout: Duration,
    ) -> Self {
        Self {
            secret,
            port,
            connect_timeout,
            reply_timeout,
        }
    }

    async fn handshake(&self, target: SocketAddr) -> Result<VerificationOutcome, String> {
        let mut stream = connect_with_timeout(target, self.connect_timeout)
            .await
            .map_err(|e| e.to_string())?;

        let line = encode_header(&Header::Verify {
            fingerprint: self.secret.fingerprint().to_string(),
        })
        .map_err(|e| e.to_string())?;
        stream
            .write_all(line.as_bytes())
            .await
            .map_err(|e| e.to_string())?;

        let mut reader = BufReader::new(&mut stream);
        let reply = time::timeout(self.reply_timeout, read_reply_line(&mut reader))
            .await
            .map_err(|_| format!("no reply within {:?}", self.reply_timeout))?
            .map_err(|e| e.to_string())?;
        if reply.is_empty() {
            return Err("connection closed without a reply".to_string());
        }

        Ok(match parse_reply(&reply) {
            Some(Reply::VerifyMatch) => VerificationOutcome::Match,
            _ => VerificationOutcome::NoMatch,
        })
    }
}

#[async_trait]
impl PeerVerifier for TcpPeerVerifier {
    async fn verify(&self, address: IpAddr) -> VerificationOutcome {
        self.handshake(SocketAddr::new(address, self.port))
            .await
            .unwrap_or_else(VerificationOutcome::Unreachable)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
