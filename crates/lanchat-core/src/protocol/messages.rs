//! All LAN-Chat wire message types.
//!
//! | Direction     | Header                          | Payload                  | Response              |
//! |---------------|---------------------------------|--------------------------|-----------------------|
//! | UDP broadcast | `IAM:<name>`                    | –                        | none                  |
//! | TCP           | `VERIFY:<fingerprint-hex>\n`    | –                        | `VMATCH` / `VNOMATCH` |
//! | TCP           | `FILE:<filename>\n`             | raw bytes to EOF         | `ACCEPTED`            |
//! | TCP           | `EFILE:<filename>\n`            | base64 sealed blob to EOF| `ACCEPTED`            |
//! | TCP           | `CHAT:<sender>:<text>\n`        | –                        | none                  |
//! | TCP           | `ECHAT:<sender>:<base64>\n`     | –                        | none                  |
//!
//! Payloads carry no length prefix; the sender closes its write half to mark
//! the end of a file.  A connection therefore carries exactly one request.

use std::fmt;

// ── Protocol constants ────────────────────────────────────────────────────────

/// UDP port used for `IAM:` presence datagrams.
pub const DISCOVERY_PORT: u16 = 9999;

/// TCP port used for every request and transfer.
pub const TRANSFER_PORT: u16 = 8080;

/// Prefix of a presence datagram.
pub const ANNOUNCE_PREFIX: &str = "IAM:";

/// Prefix applied to every file written by the receiver.
pub const RECEIVED_FILE_PREFIX: &str = "received_";

/// Largest header line the receiver buffers before dropping the connection.
pub const DEFAULT_MAX_HEADER_BYTES: usize = 1024 * 1024;

/// Placeholder published when an `ECHAT` line fails authentication.
pub const UNDECRYPTABLE_CHAT_PLACEHOLDER: &str = "[Could not decrypt - password mismatch]";

/// Placeholder published when an `ECHAT` line arrives and no password is set.
pub const NO_PASSWORD_CHAT_PLACEHOLDER: &str = "[Encrypted message - no password set]";

// ── Presence ──────────────────────────────────────────────────────────────────

/// A presence announcement carried in one UDP datagram.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    /// The display name chosen by the announcing node.
    pub name: String,
}

impl Announcement {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

// ── TCP request headers ───────────────────────────────────────────────────────

/// The closed set of request types a connection may open with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeaderKind {
    File,
    EncryptedFile,
    Chat,
    EncryptedChat,
    Verify,
}

impl HeaderKind {
    /// The tag written before the first `:` on the wire.
    pub fn tag(self) -> &'static str {
        match self {
            HeaderKind::File => "FILE",
            HeaderKind::EncryptedFile => "EFILE",
            HeaderKind::Chat => "CHAT",
            HeaderKind::EncryptedChat => "ECHAT",
            HeaderKind::Verify => "VERIFY",
        }
    }

    /// Resolves a wire tag, or `None` for anything outside the enumeration.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "FILE" => Some(HeaderKind::File),
            "EFILE" => Some(HeaderKind::EncryptedFile),
            "CHAT" => Some(HeaderKind::Chat),
            "ECHAT" => Some(HeaderKind::EncryptedChat),
            "VERIFY" => Some(HeaderKind::Verify),
            _ => None,
        }
    }
}

impl fmt::Display for HeaderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// The first line of every TCP connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    /// Plaintext file; raw bytes follow until EOF.
    File { name: String },
    /// Encrypted file; one base64 wire token follows until EOF.
    EncryptedFile { name: String },
    /// Plaintext chat line.
    Chat { sender: String, text: String },
    /// Encrypted chat line; `payload` is a base64 wire token.
    EncryptedChat { sender: String, payload: String },
    /// Password fingerprint probe.
    Verify { fingerprint: String },
}

impl Header {
    pub fn kind(&self) -> HeaderKind {
        match self {
            Header::File { .. } => HeaderKind::File,
            Header::EncryptedFile { .. } => HeaderKind::EncryptedFile,
            Header::Chat { .. } => HeaderKind::Chat,
            Header::EncryptedChat { .. } => HeaderKind::EncryptedChat,
            Header::Verify { .. } => HeaderKind::Verify,
        }
    }
}

// ── Replies ───────────────────────────────────────────────────────────────────

/// Single-line replies written by the receiving side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// The file header was understood; the payload may follow.
    Accepted,
    /// The probed fingerprint equals ours.
    VerifyMatch,
    /// The probed fingerprint differs, or we have no password.
    VerifyNoMatch,
}

impl Reply {
    pub fn as_str(self) -> &'static str {
        match self {
            Reply::Accepted => "ACCEPTED",
            Reply::VerifyMatch => "VMATCH",
            Reply::VerifyNoMatch => "VNOMATCH",
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_kind_tags_round_trip() {
        for kind in [
            HeaderKind::File,
            HeaderKind::EncryptedFile,
            HeaderKind::Chat,
            HeaderKind::EncryptedChat,
            HeaderKind::Verify,
        ] {
            assert_eq!(HeaderKind::from_tag(kind.tag()), Some(kind));
        }
    }

    #[test]
    fn test_unknown_tag_is_rejected() {
        assert_eq!(HeaderKind::from_tag("PING"), None);
        assert_eq!(HeaderKind::from_tag("chat"), None);
    }

    #[test]
    fn test_reply_wire_strings() {
        assert_eq!(Reply::Accepted.to_string(), "ACCEPTED");
        assert_eq!(Reply::VerifyMatch.to_string(), "VMATCH");
        assert_eq!(Reply::VerifyNoMatch.to_string(), "VNOMATCH");
    }

    #[test]
    fn test_default_ports_match_protocol() {
        assert_eq!(DISCOVERY_PORT, 9999);
        assert_eq!(TRANSFER_PORT, 8080);
    }
}
