//! Network infrastructure for a LAN-Chat node.
//!
//! # Sub-modules
//!
//! - **`presence`** – Broadcasts `IAM:<name>` every few seconds and runs the
//!   UDP receive loop that feeds the discovery use case.
//!
//! - **`verification`** – The initiating side of the `VERIFY` handshake.
//!
//! - **`dispatcher`** – The TCP accept loop and the per-connection handler
//!   for `FILE`, `EFILE`, `CHAT`, `ECHAT`, and `VERIFY`.
//!
//! - **`transport`** – TCP implementation of the outbound `MessageTransport`.
//!
//! - **`supervisor`** – Binds listeners with exponential backoff and reports
//!   every failure on the event bus.

pub mod dispatcher;
pub mod presence;
pub mod supervisor;
pub mod transport;
pub mod verification;
