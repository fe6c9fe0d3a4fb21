//! Application layer use cases for a LAN-Chat node.
//!
//! Use cases in this layer orchestrate the domain types from `lanchat_core`
//! and depend on traits (`PeerVerifier`, `MessageTransport`) rather than on
//! sockets, so every decision can be unit-tested without a network.
//!
//! # Sub-modules
//!
//! - **`peer_registry`** – The process-lifetime table of known peers, keyed by
//!   address, plus the read-only `SecureSessionView` used by the send path.
//!
//! - **`event_bus`** – The single unbounded channel from background workers to
//!   whatever drives the node.
//!
//! - **`discover_peers`** – What to do with an `IAM:` announcement: self-filter,
//!   upsert, and kick off verification for newly seen addresses.
//!
//! - **`send_message`** – Outbound chat and file sends, choosing plaintext or
//!   encrypted framing per destination on every call.

pub mod discover_peers;
pub mod event_bus;
pub mod peer_registry;
pub mod send_message;
