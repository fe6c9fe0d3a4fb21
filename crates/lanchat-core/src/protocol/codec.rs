//! Line codec for LAN-Chat presence datagrams and TCP headers.
//!
//! Header wire format (UTF-8, one line):
//! ```text
//! <TAG>:<field>[:<field>]\n
//! ```
//! `CHAT` and `ECHAT` split on the *first* `:` after the tag, so the sender
//! may not contain `:` while the text may.  Encoding rejects any field that
//! would break this framing instead of silently rewriting it.

use thiserror::Error;

use crate::protocol::messages::{Announcement, Header, HeaderKind, Reply, ANNOUNCE_PREFIX};

/// Errors that can occur while encoding or decoding protocol lines.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The line does not start with a recognised `<TAG>:` prefix.
    #[error("unrecognised header type: {0:?}")]
    UnknownType(String),

    /// A `CHAT`/`ECHAT` line has no `:` between sender and body.
    #[error("{0} header is missing the sender separator")]
    MissingSeparator(HeaderKind),

    /// A field is empty or contains a character that breaks framing.
    #[error("invalid {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },

    /// The datagram is not an `IAM:` announcement.
    #[error("datagram is not a presence announcement")]
    NotAnnouncement,

    /// The bytes are not valid UTF-8.
    #[error("line is not valid UTF-8")]
    InvalidUtf8,

    /// The header exceeded the receiver's buffer limit before a newline arrived.
    #[error("header exceeds {limit} bytes")]
    HeaderTooLong { limit: usize },
}

// ── Presence datagrams ────────────────────────────────────────────────────────

/// Encodes an announcement as `IAM:<name>` (no trailing newline).
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidField`] for an empty name or one that
/// contains a line break.
pub fn encode_announcement(announcement: &Announcement) -> Result<Vec<u8>, ProtocolError> {
    check_single_line("name", &announcement.name)?;
    check_non_empty("name", &announcement.name)?;
    Ok(format!("{ANNOUNCE_PREFIX}{}", announcement.name).into_bytes())
}

/// Parses one UDP datagram as an `IAM:<name>` announcement.
///
/// # Errors
///
/// Returns [`ProtocolError::NotAnnouncement`] when the prefix is missing,
/// [`ProtocolError::InvalidUtf8`] for non-UTF-8 bytes, and
/// [`ProtocolError::InvalidField`] for an empty name.
///
/// # Examples
///
/// ```rust
/// use lanchat_core::parse_announcement;
///
/// let a = parse_announcement(b"IAM:alice").unwrap();
/// assert_eq!(a.name, "alice");
/// ```
pub fn parse_announcement(datagram: &[u8]) -> Result<Announcement, ProtocolError> {
    let text = std::str::from_utf8(datagram).map_err(|_| ProtocolError::InvalidUtf8)?;
    let name = text
        .strip_prefix(ANNOUNCE_PREFIX)
        .ok_or(ProtocolError::NotAnnouncement)?
        .trim_end_matches(['\r', '\n']);
    check_non_empty("name", name)?;
    Ok(Announcement::new(name))
}

// ── TCP headers ───────────────────────────────────────────────────────────────

/// Encodes a header as one newline-terminated line.
///
/// # Errors
///
/// Returns [`ProtocolError::InvalidField`] if any field is empty where a
/// value is required, contains a line break, or (for senders) contains `:`.
pub fn encode_header(header: &Header) -> Result<String, ProtocolError> {
    let tag = header.kind().tag();
    let line = match header {
        Header::File { name } | Header::EncryptedFile { name } => {
            check_single_line("filename", name)?;
            check_non_empty("filename", name)?;
            format!("{tag}:{name}\n")
        }
        Header::Chat { sender, text } => {
            check_sender(sender)?;
            check_single_line("text", text)?;
            format!("{tag}:{sender}:{text}\n")
        }
        Header::EncryptedChat { sender, payload } => {
            check_sender(sender)?;
            check_single_line("payload", payload)?;
            check_non_empty("payload", payload)?;
            format!("{tag}:{sender}:{payload}\n")
        }
        Header::Verify { fingerprint } => {
            check_single_line("fingerprint", fingerprint)?;
            format!("{tag}:{fingerprint}\n")
        }
    };
    Ok(line)
}

/// Parses the first line of a TCP connection.
///
/// A trailing `\n` or `\r\n` is stripped.  File names and fingerprints are
/// trimmed of surrounding whitespace; chat text is kept verbatim.
///
/// # Errors
///
/// Returns [`ProtocolError::UnknownType`] for anything outside the closed
/// header enumeration, [`ProtocolError::MissingSeparator`] for a chat line
/// without a sender, and [`ProtocolError::InvalidField`] for an empty file name.
///
/// # Examples
///
/// ```rust
/// use lanchat_core::{parse_header, Header};
///
/// let h = parse_header("CHAT:alice:hello\n").unwrap();
/// assert_eq!(h, Header::Chat { sender: "alice".into(), text: "hello".into() });
/// ```
pub fn parse_header(line: &str) -> Result<Header, ProtocolError> {
    let line = strip_line_ending(line);
    let (tag, rest) = line
        .split_once(':')
        .ok_or_else(|| ProtocolError::UnknownType(truncate(line)))?;
    let kind = HeaderKind::from_tag(tag).ok_or_else(|| ProtocolError::UnknownType(truncate(tag)))?;

    let header = match kind {
        HeaderKind::File | HeaderKind::EncryptedFile => {
            let name = rest.trim();
            check_non_empty("filename", name)?;
            let name = name.to_string();
            if kind == HeaderKind::File {
                Header::File { name }
            } else {
                Header::EncryptedFile { name }
            }
        }
        HeaderKind::Chat => {
            let (sender, text) = rest
                .split_once(':')
                .ok_or(ProtocolError::MissingSeparator(kind))?;
            Header::Chat {
                sender: sender.to_string(),
                text: text.to_string(),
            }
        }
        HeaderKind::EncryptedChat => {
            let (sender, payload) = rest
                .split_once(':')
                .ok_or(ProtocolError::MissingSeparator(kind))?;
            Header::EncryptedChat {
                sender: sender.to_string(),
                payload: payload.trim().to_string(),
            }
        }
        HeaderKind::Verify => Header::Verify {
            fingerprint: rest.trim().to_string(),
        },
    };
    Ok(header)
}

// ── Replies ───────────────────────────────────────────────────────────────────

/// Encodes a reply as one newline-terminated line.
pub fn encode_reply(reply: Reply) -> String {
    format!("{}\n", reply.as_str())
}

/// Parses a reply line; surrounding whitespace is ignored.
pub fn parse_reply(line: &str) -> Option<Reply> {
    match line.trim() {
        "ACCEPTED" => Some(Reply::Accepted),
        "VMATCH" => Some(Reply::VerifyMatch),
        "VNOMATCH" => Some(Reply::VerifyNoMatch),
        _ => None,
    }
}

// ── Field validation ──────────────────────────────────────────────────────────

fn check_single_line(field: &'static str, value: &str) -> Result<(), ProtocolError> {
    if value.contains(['\n', '\r']) {
        return Err(ProtocolError::InvalidField {
            field,
            reason: "contains a line break",
        });
    }
    Ok(())
}

fn check_non_empty(field: &'static str, value: &str) -> Result<(), ProtocolError> {
    if value.is_empty() {
        return Err(ProtocolError::InvalidField {
            field,
            reason: "is empty",
        });
    }
    Ok(())
}

fn check_sender(sender: &str) -> Result<(), ProtocolError> {
    check_single_line("sender", sender)?;
    if sender.contains(':') {
        return Err(ProtocolError::InvalidField {
            field: "sender",
            reason: "contains ':'",
        });
    }
    Ok(())
}

fn strip_line_ending(line: &str) -> &str {
    let line = line.strip_suffix('\n').unwrap_or(line);
    line.strip_suffix('\r').unwrap_or(line)
}

/// Bounds the echo of unknown input kept in error values.
fn truncate(s: &str) -> String {
    s.chars().take(16).collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
