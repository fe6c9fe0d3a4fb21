//! Events published by the background workers of a node.
//!
//! Every worker (discovery listener, verification attempts, connection
//! handlers, outbound sends, listener supervisors) reports through this one
//! closed type, so a consumer's `match` is exhaustive and checked by the
//! compiler.

use std::fmt;
use std::net::IpAddr;

use crate::domain::peer::PeerRecord;

/// Everything a node reports to its single consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeEvent {
    /// A new address announced itself, or a known one changed its name.
    PeerSeen(PeerRecord),
    /// A verification handshake finished for `address`.
    PeerVerified { address: IpAddr, secure: bool },
    /// A chat line arrived (decrypted, or replaced by a placeholder).
    ChatReceived(ChatMessage),
    /// A transfer, send, or listener changed state.
    TransferStatus(TransferStatus),
}

/// A received chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    /// Source IP of the TCP connection.
    pub from: IpAddr,
    /// Sender name as written in the header.
    pub sender: String,
    /// Plaintext, or a placeholder when decryption was impossible.
    pub text: String,
    /// `true` when the line arrived as `ECHAT`.
    pub encrypted: bool,
}

/// Which listener a supervisor event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerKind {
    /// The UDP discovery socket.
    Udp,
    /// The TCP transfer listener.
    Tcp,
}

impl fmt::Display for ListenerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenerKind::Udp => f.write_str("UDP"),
            ListenerKind::Tcp => f.write_str("TCP"),
        }
    }
}

/// Short, user-facing outcome of a transfer or background operation.
///
/// The `Display` form is the status string shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    /// A plaintext file was written to disk.
    Received { name: String },
    /// An encrypted file was decrypted and written to disk.
    ReceivedEncrypted { name: String },
    /// An encrypted file failed authentication; nothing was written.
    DecryptFailed { name: String },
    /// An encrypted file arrived while no password is configured; discarded.
    EncryptedWithoutPassword { name: String },
    /// A received file could not be written.
    WriteFailed { name: String, reason: String },
    /// The sender's stream broke before a plaintext file was complete; the
    /// partial file was removed.
    ReceiveFailed { name: String, reason: String },
    /// An outbound file was delivered.
    Sent { name: String },
    /// An outbound chat line could not be delivered.
    ChatFailed { reason: String },
    /// An outbound file could not be delivered.
    FileFailed { reason: String },
    /// A listener could not be bound.
    ListenerFailed {
        listener: ListenerKind,
        reason: String,
        will_retry: bool,
    },
}

impl TransferStatus {
    /// `true` for every variant that reports something going wrong.
    pub fn is_failure(&self) -> bool {
        !matches!(
            self,
            TransferStatus::Received { .. }
                | TransferStatus::ReceivedEncrypted { .. }
                | TransferStatus::Sent { .. }
        )
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStatus::Received { name } => write!(f, "Received: {name}"),
            TransferStatus::ReceivedEncrypted { name } => write!(f, "Received (encrypted): {name}"),
            TransferStatus::DecryptFailed { name } => write!(f, "Failed to decrypt file: {name}"),
            TransferStatus::EncryptedWithoutPassword { name } => {
                write!(f, "Encrypted file received but no password set: {name}")
            }
            TransferStatus::WriteFailed { name, reason } => {
                write!(f, "Failed to save file {name}: {reason}")
            }
            TransferStatus::ReceiveFailed { name, reason } => {
                write!(f, "Failed to receive file {name}: {reason}")
            }
            TransferStatus::Sent { name } => write!(f, "Sent: {name}"),
            TransferStatus::ChatFailed { reason } => write!(f, "Chat error: {reason}"),
            TransferStatus::FileFailed { reason } => write!(f, "File error: {reason}"),
            TransferStatus::ListenerFailed {
                listener,
                reason,
                will_retry,
            } => {
                write!(f, "{listener} listen error: {reason}")?;
                if *will_retry {
                    f.write_str(" (retrying)")?;
                }
                Ok(())
            }
        }
    }
}

impl From<TransferStatus> for NodeEvent {
    fn from(status: TransferStatus) -> Self {
        NodeEvent::TransferStatus(status)
    }
}

impl From<ChatMessage> for NodeEvent {
    fn from(chat: ChatMessage) -> Self {
        NodeEvent::ChatReceived(chat)
    }
}
