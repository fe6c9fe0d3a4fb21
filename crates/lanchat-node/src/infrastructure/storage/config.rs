//! TOML-based configuration for a LAN-Chat node.
//!
//! Reads `AppConfig` from the platform-appropriate config file:
//! - Windows:  `%APPDATA%\LanChat\config.toml`
//! - Linux:    `~/.config/lanchat/config.toml`
//! - macOS:    `~/Library/Application Support/LanChat/config.toml`
//!
//! or from an explicit path given with `--config`.  Example:
//!
//! ```toml
//! [node]
//! log_level = "info"
//!
//! [network]
//! discovery_port = 9999
//! transfer_port = 8080
//! broadcast_interval_ms = 3000
//!
//! [storage]
//! received_dir = "."
//!
//! [supervisor]
//! max_attempts = 5
//! ```
//!
//! Every field has a serde default, so a missing file, a missing section, or
//! a missing key all fall back to the values in this module.
//!
//! The shared password is never read from or written to this file.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use lanchat_core::protocol::{DEFAULT_MAX_HEADER_BYTES, DISCOVERY_PORT, TRANSFER_PORT};
use serde::Deserialize;
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// An address field does not hold an IP address.
    #[error("invalid {field} {value:?}: not an IP address")]
    InvalidAddress { field: &'static str, value: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub supervisor: SupervisorConfig,
}

/// General node behaviour.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NodeConfig {
    /// `tracing` log level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Ports, addresses, and timing for the network workers.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// UDP port for `IAM:` presence datagrams.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    /// TCP port for every request and transfer.
    #[serde(default = "default_transfer_port")]
    pub transfer_port: u16,
    /// Address the listeners bind to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Destination of presence datagrams.
    #[serde(default = "default_broadcast_address")]
    pub broadcast_address: String,
    /// Interval between presence datagrams.
    #[serde(default = "default_broadcast_interval_ms")]
    pub broadcast_interval_ms: u64,
    /// Bound on outbound TCP connects (sends and verification).
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Bound on reading a header line or a one-line reply.
    #[serde(default = "default_header_timeout_ms")]
    pub header_timeout_ms: u64,
    /// Largest header line accepted before the connection is dropped.
    #[serde(default = "default_max_header_bytes")]
    pub max_header_bytes: usize,
    /// An address silent for longer than this is verified again when it
    /// re-announces.  Absent means a known address is never re-verified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_stale_after_secs: Option<u64>,
}

/// Where received files are written.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_received_dir")]
    pub received_dir: PathBuf,
}

/// Retry policy for listener binds.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SupervisorConfig {
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Bind attempts before giving up; `0` retries forever.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_discovery_port() -> u16 {
    DISCOVERY_PORT
}
fn default_transfer_port() -> u16 {
    TRANSFER_PORT
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_broadcast_address() -> String {
    "255.255.255.255".to_string()
}
fn default_broadcast_interval_ms() -> u64 {
    3000
}
fn default_connect_timeout_ms() -> u64 {
    2000
}
fn default_header_timeout_ms() -> u64 {
    10_000
}
fn default_max_header_bytes() -> usize {
    DEFAULT_MAX_HEADER_BYTES
}
fn default_received_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_initial_backoff_ms() -> u64 {
    1000
}
fn default_max_backoff_ms() -> u64 {
    30_000
}
fn default_max_attempts() -> u32 {
    5
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            discovery_port: default_discovery_port(),
            transfer_port: default_transfer_port(),
            bind_address: default_bind_address(),
            broadcast_address: default_broadcast_address(),
            broadcast_interval_ms: default_broadcast_interval_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            header_timeout_ms: default_header_timeout_ms(),
            max_header_bytes: default_max_header_bytes(),
            peer_stale_after_secs: None,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            received_dir: default_received_dir(),
        }
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl NetworkConfig {
    /// Parsed `bind_address`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if the field is not an IP.
    pub fn bind_ip(&self) -> Result<IpAddr, ConfigError> {
        parse_ip("bind_address", &self.bind_address)
    }

    /// Parsed `broadcast_address`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidAddress`] if the field is not an IP.
    pub fn broadcast_ip(&self) -> Result<IpAddr, ConfigError> {
        parse_ip("broadcast_address", &self.broadcast_address)
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn header_timeout(&self) -> Duration {
        Duration::from_millis(self.header_timeout_ms)
    }

    pub fn peer_stale_after(&self) -> Option<Duration> {
        self.peer_stale_after_secs.map(Duration::from_secs)
    }
}

fn parse_ip(field: &'static str, value: &str) -> Result<IpAddr, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidAddress {
        field,
        value: value.to_string(),
    })
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Determines the platform-appropriate directory for the config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when the platform config base
/// directory cannot be determined from the environment.
pub fn config_dir() -> Result<PathBuf, ConfigError> {
    platform_config_dir().ok_or(ConfigError::NoPlatformConfigDir)
}

/// Resolves the full path to the default config file.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] if the base directory cannot be
/// determined.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    Ok(config_dir()?.join("config.toml"))
}

/// Loads `AppConfig` from the default location, returning defaults if the
/// file does not exist or no config directory is known.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    match config_file_path() {
        Ok(path) => load_config_from(&path),
        Err(ConfigError::NoPlatformConfigDir) => Ok(AppConfig::default()),
        Err(e) => Err(e),
    }
}

/// Loads `AppConfig` from `path`, returning defaults if the file is absent.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Resolves the platform config directory including the `LanChat` subdirectory.
fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("LanChat"))
    }

    #[cfg(target_os = "linux")]
    {
        // XDG_CONFIG_HOME or ~/.config
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("lanchat"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("LanChat")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    {
        None
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
