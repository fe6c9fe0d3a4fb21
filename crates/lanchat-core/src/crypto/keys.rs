//! Key and fingerprint derivation from the shared password.
//!
//! Two one-way values are derived from the operator-supplied password and
//! nothing else ever leaves the process:
//!
//! ```text
//! key         = SHA-256(password)                       32 bytes, AES-256-GCM key
//! fingerprint = hex(SHA-256("LAN-CHAT-VERIFY:" + password))   sent in VERIFY
//! ```
//!
//! The prefix keeps the fingerprint in its own namespace so that a captured
//! fingerprint can never be replayed as the encryption key.
//!
//! The empty password is the "no password configured" sentinel.  Both
//! derivations are total over every string, but [`SharedSecret::from_password`]
//! refuses to build a secret from `""`, so callers are forced to handle the
//! disabled case explicitly with `Option<SharedSecret>`.

use std::fmt;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// Length of the derived AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;

/// Namespace prefix hashed in front of the password for the fingerprint.
pub const FINGERPRINT_DOMAIN: &str = "LAN-CHAT-VERIFY:";

/// Derives the 32-byte symmetric key: `SHA-256(password)`.
pub fn derive_key(password: &str) -> [u8; KEY_SIZE] {
    Sha256::digest(password.as_bytes()).into()
}

/// Derives the lowercase hex verification fingerprint of `password`.
///
/// # Examples
///
/// ```rust
/// use lanchat_core::fingerprint;
///
/// let fp = fingerprint("hunter2");
/// assert_eq!(fp.len(), 64);
/// assert_eq!(fp, fingerprint("hunter2"));
/// ```
pub fn fingerprint(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(FINGERPRINT_DOMAIN.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// The in-memory form of a configured password.
///
/// Holds only the derived key (wiped on drop) and the public fingerprint.
/// The password string itself is not retained.
#[derive(Clone)]
pub struct SharedSecret {
    key: Zeroizing<[u8; KEY_SIZE]>,
    fingerprint: String,
}

impl SharedSecret {
    /// Builds a secret from `password`, or `None` when the password is empty.
    pub fn from_password(password: &str) -> Option<Self> {
        if password.is_empty() {
            return None;
        }
        Some(Self {
            key: Zeroizing::new(derive_key(password)),
            fingerprint: fingerprint(password),
        })
    }

    /// The AES-256-GCM key.
    pub fn key(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    /// The hex fingerprint sent in `VERIFY:` headers.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Compares a remote fingerprint against ours in constant time.
    ///
    /// Inputs of a different length compare unequal without an early exit
    /// on content.
    pub fn matches_fingerprint(&self, remote: &str) -> bool {
        self.fingerprint.as_bytes().ct_eq(remote.as_bytes()).into()
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedSecret")
            .field("fingerprint", &self.fingerprint)
            .finish_non_exhaustive()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
