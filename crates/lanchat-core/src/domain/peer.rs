//! The record kept for every remote address that has announced itself.

use std::net::IpAddr;
use std::time::{Duration, Instant};

/// Preview text given to a peer the moment it is discovered.
pub const DISCOVERED_PREVIEW: &str = "Connected";

/// One entry per distinct network address observed on the discovery port.
///
/// The address is the identity: a later announcement from the same address
/// with a different name overwrites `display_name` in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerRecord {
    /// Most recently announced name for this address.  Not unique.
    pub display_name: String,
    /// Source IP of the announcements; the registry key.
    pub address: IpAddr,
    /// When the address was first recorded.
    pub first_seen: Instant,
    /// When the last announcement from this address arrived.
    pub last_seen: Instant,
    /// `true` once a verification handshake confirmed a shared password.
    pub secure: bool,
    /// Last chat line or status shown for this peer.
    pub last_message_preview: String,
}

impl PeerRecord {
    /// Creates an unverified record first seen at `now`.
    pub fn new(address: IpAddr, display_name: impl Into<String>, now: Instant) -> Self {
        Self {
            display_name: display_name.into(),
            address,
            first_seen: now,
            last_seen: now,
            secure: false,
            last_message_preview: DISCOVERED_PREVIEW.to_string(),
        }
    }

    /// `true` when no announcement arrived within `window` before `now`.
    pub fn is_stale(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > window
    }
}
