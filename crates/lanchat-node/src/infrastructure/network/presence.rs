//! UDP presence: the `IAM:<name>` heartbeat and the discovery receive loop.
//!
//! The broadcaster sends one datagram per interval to the broadcast address
//! and never waits for an answer.  A failed send is logged and simply
//! skipped; the next tick tries again.
//!
//! The listener hands every datagram to [`DiscoverPeersUseCase`], which owns
//! the self-filter, the registry update, and the verification trigger.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use lanchat_core::protocol::encode_announcement;
use lanchat_core::{Announcement, ProtocolError};
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::application::discover_peers::DiscoverPeersUseCase;

/// Largest datagram the listener reads; longer ones are truncated by the OS.
const MAX_DATAGRAM: usize = 2048;

/// Error type for setting up the broadcaster.
#[derive(Debug, Error)]
pub enum PresenceError {
    /// The local name cannot be framed as an announcement.
    #[error("cannot announce this name: {0}")]
    InvalidName(#[from] ProtocolError),

    /// The sending socket could not be created.
    #[error("failed to open broadcast socket: {0}")]
    Socket(#[from] std::io::Error),
}

/// Periodically announces this node on the discovery port.
#[derive(Debug)]
pub struct PresenceBroadcaster {
    socket: UdpSocket,
    target: SocketAddr,
    datagram: Vec<u8>,
    interval: Duration,
}

impl PresenceBroadcaster {
    /// Opens an ephemeral UDP socket with broadcast enabled.
    ///
    /// # Errors
    ///
    /// Returns [`PresenceError`] for an unannounceable name or a socket error.
    pub async fn bind(
        name: &str,
        target: SocketAddr,
        interval: Duration,
    ) -> Result<Self, PresenceError> {
        let datagram = encode_announcement(&Announcement::new(name))?;
        let local: SocketAddr = match target.ip() {
            IpAddr::V4(_) => (IpAddr::from([0, 0, 0, 0]), 0).into(),
            IpAddr::V6(_) => (IpAddr::from([0u16; 8]), 0).into(),
        };
        let socket = UdpSocket::bind(local).await?;
        socket.set_broadcast(true)?;
        Ok(Self {
            socket,
            target,
            datagram,
            interval,
        })
    }

    /// Sends one announcement.
    ///
    /// # Errors
    ///
    /// Returns the socket error; callers usually ignore it.
    pub async fn announce_once(&self) -> std::io::Result<()> {
        self.socket.send_to(&self.datagram, self.target).await?;
        Ok(())
    }

    /// Announces forever, once per interval, starting immediately.
    pub async fn run(self) {
        info!("announcing to {} every {:?}", self.target, self.interval);
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.announce_once().await {
                debug!("presence send to {} failed: {e}", self.target);
            }
        }
    }
}

/// Receives datagrams on `socket` forever and feeds them to `discovery`.
pub async fn run_discovery_listener(socket: UdpSocket, discovery: DiscoverPeersUseCase) {
    match socket.local_addr() {
        Ok(addr) => info!("discovery listener on UDP {addr}"),
        Err(e) => debug!("discovery listener address unavailable: {e}"),
    }

    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        let (len, source) = match socket.recv_from(&mut buf).await {
            Ok(pair) => pair,
            Err(e) => {
                // Windows reports ICMP port-unreachable as a recv error.
                warn!("discovery recv error: {e}");
                time::sleep(Duration::from_millis(100)).await;
                continue;
            }
        };
        discovery.handle_datagram(source.ip(), &buf[..len]);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
