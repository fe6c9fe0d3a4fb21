//! Domain entities for LAN-Chat.
//!
//! Pure data with no sockets, no locks, and no file system access.  The node
//! crate owns the concurrency around these types.

/// Per-address peer state.
pub mod peer;

/// The closed event type published by a running node.
pub mod events;
