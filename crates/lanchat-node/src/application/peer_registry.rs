//! PeerRegistry: the in-memory table of every address that has announced itself.
//!
//! The registry is the only state shared between the discovery listener, the
//! verification attempts, the connection handlers, and the send path.  All
//! access goes through one `Mutex`, so `upsert`, `set_secure`, and `snapshot`
//! are linearizable with respect to each other.
//!
//! Records are never removed; the table lives as long as the process.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use lanchat_core::PeerRecord;

/// Result of [`PeerRegistry::upsert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upsert {
    /// The record as it stands after the update.
    pub record: PeerRecord,
    /// `true` when the address was absent, or present but stale.
    pub is_new: bool,
    /// `true` when a known address announced a different name.
    pub renamed: bool,
}

/// Concurrent-safe peer table keyed by address.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: Mutex<HashMap<IpAddr, PeerRecord>>,
    /// When set, an address silent for longer than this counts as new again.
    stale_after: Option<Duration>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry that treats addresses silent for longer than
    /// `stale_after` as newly discovered.  `None` means never.
    pub fn with_stale_window(stale_after: Option<Duration>) -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            stale_after,
        }
    }

    /// Records an announcement from `address` carrying `name`.
    ///
    /// The insert and the `is_new` decision happen under one lock, so two
    /// concurrent duplicate announcements yield exactly one `is_new == true`.
    pub fn upsert(&self, address: IpAddr, name: &str) -> Upsert {
        self.upsert_at(address, name, Instant::now())
    }

    /// [`upsert`](Self::upsert) with an explicit clock reading.
    pub fn upsert_at(&self, address: IpAddr, name: &str, now: Instant) -> Upsert {
        let mut peers = self.lock();
        match peers.get_mut(&address) {
            Some(record) => {
                let is_new = self
                    .stale_after
                    .is_some_and(|window| record.is_stale(now, window));
                let renamed = record.display_name != name;
                if renamed {
                    record.display_name = name.to_string();
                }
                record.last_seen = now;
                Upsert {
                    record: record.clone(),
                    is_new,
                    renamed,
                }
            }
            None => {
                let record = PeerRecord::new(address, name, now);
                peers.insert(address, record.clone());
                Upsert {
                    record,
                    is_new: true,
                    renamed: false,
                }
            }
        }
    }

    /// Sets the verified flag for `address`.
    ///
    /// Returns `false` if the address has never announced itself.
    pub fn set_secure(&self, address: IpAddr, secure: bool) -> bool {
        match self.lock().get_mut(&address) {
            Some(record) => {
                record.secure = secure;
                true
            }
            None => false,
        }
    }

    /// `true` only for a known address whose last verification matched.
    pub fn is_secure(&self, address: IpAddr) -> bool {
        self.lock().get(&address).is_some_and(|r| r.secure)
    }

    /// Replaces the preview line of a known address.  Unknown addresses are ignored.
    pub fn set_preview(&self, address: IpAddr, preview: &str) {
        if let Some(record) = self.lock().get_mut(&address) {
            record.last_message_preview = preview.to_string();
        }
    }

    /// Returns a copy of the record for `address`.
    pub fn get(&self, address: IpAddr) -> Option<PeerRecord> {
        self.lock().get(&address).cloned()
    }

    /// Returns every record in discovery order.
    pub fn snapshot(&self) -> Vec<PeerRecord> {
        let mut peers: Vec<PeerRecord> = self.lock().values().cloned().collect();
        peers.sort_by(|a, b| {
            a.first_seen
                .cmp(&b.first_seen)
                .then_with(|| a.address.cmp(&b.address))
        });
        peers
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<IpAddr, PeerRecord>> {
        // Every critical section leaves the map consistent, so a panic
        // elsewhere does not invalidate it.
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Read-only projection of the registry's `secure` flags.
///
/// Holds no copy of its own, so it can never disagree with the registry.
#[derive(Debug, Clone)]
pub struct SecureSessionView {
    registry: Arc<PeerRegistry>,
}

impl SecureSessionView {
    pub fn new(registry: Arc<PeerRegistry>) -> Self {
        Self { registry }
    }

    pub fn is_secure(&self, address: IpAddr) -> bool {
        self.registry.is_secure(address)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_registry_starts_empty() {
        let registry = PeerRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_first_upsert_is_new() {
        // Arrange
        let registry = PeerRegistry::new();

        // Act
        let result = registry.upsert(ip("192.168.1.10"), "alice");

        // Assert
        assert!(result.is_new);
        assert!(!result.renamed);
        assert_eq!(result.record.display_name, "alice");
        assert!(!result.record.secure);
    }

    #[test]
    fn test_repeated_upsert_keeps_one_record_with_latest_name() {
        // Arrange
        let registry = PeerRegistry::new();
        let addr = ip("192.168.1.10");

        // Act
        registry.upsert(addr, "alice");
        registry.upsert(addr, "alice-laptop");
        let last = registry.upsert(addr, "al");

        // Assert
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(addr).unwrap().display_name, "al");
        assert!(!last.is_new);
        assert!(last.renamed);
    }

    #[test]
    fn test_reannouncement_updates_last_seen_but_is_not_new() {
        let registry = PeerRegistry::new();
        let addr = ip("10.0.0.5");
        let start = Instant::now();

        registry.upsert_at(addr, "bob", start);
        let again = registry.upsert_at(addr, "bob", start + Duration::from_secs(3));

        assert!(!again.is_new);
        assert!(!again.renamed);
        assert_eq!(again.record.last_seen, start + Duration::from_secs(3));
        assert_eq!(again.record.first_seen, start);
    }

    #[test]
    fn test_without_stale_window_known_address_is_never_new_again() {
        let registry = PeerRegistry::new();
        let addr = ip("10.0.0.5");
        let start = Instant::now();

        registry.upsert_at(addr, "bob", start);
        let much_later = registry.upsert_at(addr, "bob", start + Duration::from_secs(86_400));

        assert!(!much_later.is_new);
    }

    #[test]
    fn test_stale_window_makes_silent_address_new_again() {
        // Arrange
        let registry = PeerRegistry::with_stale_window(Some(Duration::from_secs(30)));
        let addr = ip("10.0.0.5");
        let start = Instant::now();
        registry.upsert_at(addr, "bob", start);

        // Act
        let fresh = registry.upsert_at(addr, "bob", start + Duration::from_secs(10));
        let stale = registry.upsert_at(addr, "bob", start + Duration::from_secs(45));

        // Assert
        assert!(!fresh.is_new);
        assert!(stale.is_new);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_set_secure_survives_later_upsert() {
        let registry = PeerRegistry::new();
        let addr = ip("10.0.0.7");
        registry.upsert(addr, "carol");

        assert!(registry.set_secure(addr, true));
        registry.upsert(addr, "carol-renamed");

        assert!(registry.is_secure(addr));
    }

    #[test]
    fn test_set_secure_on_unknown_address_returns_false() {
        let registry = PeerRegistry::new();
        assert!(!registry.set_secure(ip("10.0.0.99"), true));
        assert!(!registry.is_secure(ip("10.0.0.99")));
    }

    #[test]
    fn test_set_preview_updates_known_peer_only() {
        let registry = PeerRegistry::new();
        let addr = ip("10.0.0.8");
        registry.upsert(addr, "dave");

        registry.set_preview(addr, "hello there");
        registry.set_preview(ip("10.0.0.9"), "ignored");

        assert_eq!(registry.get(addr).unwrap().last_message_preview, "hello there");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_snapshot_is_in_discovery_order() {
        let registry = PeerRegistry::new();
        let start = Instant::now();
        registry.upsert_at(ip("10.0.0.3"), "third", start + Duration::from_secs(2));
        registry.upsert_at(ip("10.0.0.1"), "first", start);
        registry.upsert_at(ip("10.0.0.2"), "second", start + Duration::from_secs(1));

        let names: Vec<String> = registry
            .snapshot()
            .into_iter()
            .map(|r| r.display_name)
            .collect();

        assert_eq!(names, ["first", "second", "third"]);
    }

    #[test]
    fn test_concurrent_duplicate_announcements_yield_one_new() {
        // Arrange
        let registry = Arc::new(PeerRegistry::new());
        let addr = ip("192.168.1.50");

        // Act
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.upsert(addr, &format!("peer-{i}")).is_new)
            })
            .collect();
        let new_count = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|is_new| *is_new)
            .count();

        // Assert
        assert_eq!(new_count, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_secure_session_view_tracks_registry() {
        let registry = Arc::new(PeerRegistry::new());
        let view = SecureSessionView::new(Arc::clone(&registry));
        let addr = ip("10.1.1.1");
        registry.upsert(addr, "eve");

        assert!(!view.is_secure(addr));
        registry.set_secure(addr, true);
        assert!(view.is_secure(addr));
        registry.set_secure(addr, false);
        assert!(!view.is_secure(addr));
    }
}
