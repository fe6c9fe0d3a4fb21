//! DiscoverPeersUseCase: turns `IAM:` announcements into registry updates.
//!
//! For each announcement:
//!
//! 1. Drop it if the name equals our own (broadcast loops back to the sender
//!    on some networks).
//! 2. Upsert the source address into the [`PeerRegistry`].
//! 3. Publish `PeerSeen` if the address is new or changed its name.
//! 4. If the address is new and a password is configured, start one
//!    verification attempt in the background.  Its result lands in the
//!    registry and on the event bus as `PeerVerified`.
//!
//! Re-announcements from a known address only refresh `last_seen`.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use lanchat_core::{parse_announcement, Announcement, NodeEvent};
use tracing::{debug, info};

use crate::application::event_bus::EventBus;
use crate::application::peer_registry::PeerRegistry;

/// Typed result of one verification attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// The peer answered `VMATCH`.
    Match,
    /// The peer answered `VNOMATCH` or something unrecognised.
    NoMatch,
    /// The peer could not be reached or did not answer.
    Unreachable(String),
}

impl VerificationOutcome {
    /// Only an explicit match makes a peer secure.
    pub fn is_secure(&self) -> bool {
        matches!(self, VerificationOutcome::Match)
    }
}

/// Performs the verification handshake against a peer.
///
/// The TCP implementation lives in `infrastructure::network::verification`;
/// tests use scripted doubles.
#[async_trait]
pub trait PeerVerifier: Send + Sync {
    async fn verify(&self, address: IpAddr) -> VerificationOutcome;
}

/// What an announcement led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnouncementOutcome {
    /// The announcement carried our own name.
    Ignored,
    /// A known address re-announced the same name.
    Refreshed,
    /// A known address announced a different name.
    Renamed,
    /// A new (or stale) address; `verifying` says whether a handshake started.
    Discovered { verifying: bool },
}

/// Handles presence announcements for one node.
#[derive(Clone)]
pub struct DiscoverPeersUseCase {
    local_name: String,
    registry: Arc<PeerRegistry>,
    events: EventBus,
    /// `None` when no password is configured.
    verifier: Option<Arc<dyn PeerVerifier>>,
}

impl DiscoverPeersUseCase {
    pub fn new(
        local_name: impl Into<String>,
        registry: Arc<PeerRegistry>,
        events: EventBus,
        verifier: Option<Arc<dyn PeerVerifier>>,
    ) -> Self {
        Self {
            local_name: local_name.into(),
            registry,
            events,
            verifier,
        }
    }

    /// Parses a raw datagram and handles it.  Anything that is not an
    /// announcement is dropped and yields `None`.
    pub fn handle_datagram(&self, source: IpAddr, datagram: &[u8]) -> Option<AnnouncementOutcome> {
        match parse_announcement(datagram) {
            Ok(announcement) => Some(self.handle_announcement(source, &announcement)),
            Err(e) => {
                debug!("ignoring datagram from {source}: {e}");
                None
            }
        }
    }

    /// Applies one announcement from `source`.
    ///
    /// Must be called from within a Tokio runtime when a verifier is set,
    /// because the handshake is spawned as a task.
    pub fn handle_announcement(
        &self,
        source: IpAddr,
        announcement: &Announcement,
    ) -> AnnouncementOutcome {
        if announcement.name == self.local_name {
            return AnnouncementOutcome::Ignored;
        }

        let upsert = self.registry.upsert(source, &announcement.name);

        if !upsert.is_new {
            if upsert.renamed {
                debug!("peer {source} renamed to {}", announcement.name);
                self.events.publish(NodeEvent::PeerSeen(upsert.record));
                return AnnouncementOutcome::Renamed;
            }
            return AnnouncementOutcome::Refreshed;
        }

        info!("discovered peer {} ({source})", announcement.name);
        self.events.publish(NodeEvent::PeerSeen(upsert.record));

        let verifying = self.verifier.is_some();
        if verifying {
            let this = self.clone();
            tokio::spawn(async move {
                this.verify_peer(source).await;
            });
        } else {
            debug!("no password set, skipping verification for {source}");
        }
        AnnouncementOutcome::Discovered { verifying }
    }

    /// Runs one handshake against `address` and records the outcome.
    ///
    /// Returns the new `secure` flag.  Without a verifier the peer stays
    /// unverified and nothing is published.
    pub async fn verify_peer(&self, address: IpAddr) -> bool {
        let Some(verifier) = &self.verifier else {
            return false;
        };

        let outcome = verifier.verify(address).await;
        let secure = outcome.is_secure();
        match &outcome {
            VerificationOutcome::Unreachable(reason) => {
                debug!("verification of {address} failed: {reason}")
            }
            _ => info!("verification of {address}: secure={secure}"),
        }

        self.registry.set_secure(address, secure);
        self.events.publish(NodeEvent::PeerVerified { address, secure });
        secure
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
