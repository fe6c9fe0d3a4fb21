//! Infrastructure layer for a LAN-Chat node.
//!
//! Contains the OS-facing adapters: UDP and TCP sockets, the received-file
//! store, the TOML configuration file, plus the wiring that assembles them
//! into a running node and the console driver used by the binary.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `lanchat_core`, but MUST NOT be imported by the `application` layer.

pub mod console;
pub mod network;
pub mod node;
pub mod storage;
