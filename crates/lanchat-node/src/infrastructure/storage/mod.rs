//! Storage infrastructure: configuration file and received files.
//!
//! - **`config`** – Reads the TOML configuration from the platform config
//!   directory (or an explicit path) and falls back to defaults.
//! - **`received_files`** – Writes incoming transfers as `received_<name>`
//!   inside the receive directory.

pub mod config;
pub mod received_files;
