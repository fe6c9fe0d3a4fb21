//! # lanchat-core
//!
//! Shared library for LAN-Chat containing the line-oriented wire protocol,
//! the password-derived crypto primitives, and the domain types that flow
//! between the network workers and whatever drives the node.
//!
//! This crate has zero dependencies on sockets, the file system, or any UI.
//!
//! # Architecture overview
//!
//! LAN-Chat lets machines on the same broadcast domain find each other and
//! exchange chat lines and files directly, without a server.  Two peers that
//! were started with the same password agree on that fact through a short
//! fingerprint handshake and from then on wrap every chat line and file in
//! AES-256-GCM.
//!
//! - **`crypto`** – Key and fingerprint derivation from the shared password,
//!   plus the authenticated-encryption codec that produces base64 wire tokens.
//!
//! - **`protocol`** – The `IAM:` presence datagram and the newline-terminated
//!   TCP headers (`FILE`, `EFILE`, `CHAT`, `ECHAT`, `VERIFY`) with their replies.
//!
//! - **`domain`** – The `PeerRecord` kept per remote address and the closed
//!   `NodeEvent` type published to the consumer of a running node.

pub mod crypto;
pub mod domain;
pub mod protocol;

pub use crypto::keys::{derive_key, fingerprint, SharedSecret};
pub use crypto::secure_codec::{DecryptionError, EncryptionError, SecureCodec};
pub use domain::events::{ChatMessage, ListenerKind, NodeEvent, TransferStatus};
pub use domain::peer::PeerRecord;
pub use protocol::codec::{encode_header, parse_announcement, parse_header, ProtocolError};
pub use protocol::messages::{Announcement, Header, Reply};
