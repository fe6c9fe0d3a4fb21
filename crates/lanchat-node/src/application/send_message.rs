//! SendMessageUseCase: outbound chat lines and files.
//!
//! The framing is decided per call from the registry's `secure` flag for the
//! destination, never cached:
//!
//! | Destination secure | Password set | Chat header | File header |
//! |--------------------|--------------|-------------|-------------|
//! | yes                | yes          | `ECHAT`     | `EFILE`     |
//! | otherwise          |              | `CHAT`      | `FILE`      |
//!
//! A peer whose verification flips to secure receives encrypted traffic on
//! the very next send.  Every outcome is also published as a
//! `TransferStatus` so the driver can show it.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use lanchat_core::{
    encode_header, EncryptionError, Header, ProtocolError, SecureCodec, TransferStatus,
};
use thiserror::Error;
use tracing::debug;

use crate::application::event_bus::EventBus;
use crate::application::peer_registry::SecureSessionView;

/// Error type for outbound sends.
#[derive(Debug, Error)]
pub enum SendError {
    /// The destination did not accept a connection in time or refused it.
    #[error("could not connect to {address}: {reason}")]
    Connect { address: IpAddr, reason: String },

    /// The connection broke while writing or reading.
    #[error("I/O error talking to {address}: {source}")]
    Io {
        address: IpAddr,
        #[source]
        source: std::io::Error,
    },

    /// The receiver answered something other than `ACCEPTED`.
    #[error("peer did not accept the transfer (replied {reply:?})")]
    NotAccepted { reply: String },

    /// The local file could not be read.
    #[error("cannot read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The path has no final component usable as a wire file name.
    #[error("{0} has no usable file name")]
    InvalidPath(PathBuf),

    /// A header field would break line framing.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The payload could not be sealed.
    #[error("encryption failed")]
    Encryption(#[from] EncryptionError),
}

/// Body streamed after a `FILE`/`EFILE` header once the peer accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundPayload {
    /// Bytes already in memory (the base64 token of an encrypted file).
    Bytes(Vec<u8>),
    /// A plaintext file streamed from disk.
    File(PathBuf),
}

/// Delivers header lines and payloads to a peer's transfer port.
///
/// Each call uses its own connection.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Writes one header line and closes the connection.
    async fn send_line(&self, address: IpAddr, line: String) -> Result<(), SendError>;

    /// Writes a header line, waits for `ACCEPTED`, streams `payload`, then
    /// closes the write half to mark the end of the transfer.
    async fn send_with_payload(
        &self,
        address: IpAddr,
        line: String,
        payload: OutboundPayload,
    ) -> Result<(), SendError>;
}

/// Which framing a send used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Plain,
    Encrypted,
}

/// Sends chat lines and files to peers.
#[derive(Clone)]
pub struct SendMessageUseCase {
    local_name: String,
    sessions: SecureSessionView,
    /// `None` when no password is configured.
    codec: Option<SecureCodec>,
    transport: Arc<dyn MessageTransport>,
    events: EventBus,
}

impl SendMessageUseCase {
    pub fn new(
        local_name: impl Into<String>,
        sessions: SecureSessionView,
        codec: Option<SecureCodec>,
        transport: Arc<dyn MessageTransport>,
        events: EventBus,
    ) -> Self {
        Self {
            local_name: local_name.into(),
            sessions,
            codec,
            transport,
            events,
        }
    }

    /// Sends one chat line to `address`.
    ///
    /// No status is published on success; CHAT has no acknowledgement.
    /// Failures publish `Chat error: <reason>`.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] if framing, encryption, or delivery fails.
    pub async fn send_chat(&self, address: IpAddr, text: &str) -> Result<Framing, SendError> {
        let result = self.deliver_chat(address, text).await;
        if let Err(e) = &result {
            self.events.publish(TransferStatus::ChatFailed {
                reason: e.to_string(),
            });
        }
        result
    }

    /// Sends the file at `path` to `address`.
    ///
    /// Publishes `Sent: <name>` on success and `File error: <reason>` on failure.
    ///
    /// # Errors
    ///
    /// Returns [`SendError`] if the file cannot be read, the peer does not
    /// accept, or delivery fails.
    pub async fn send_file(&self, address: IpAddr, path: &Path) -> Result<Framing, SendError> {
        match self.deliver_file(address, path).await {
            Ok((framing, name)) => {
                self.events.publish(TransferStatus::Sent { name });
                Ok(framing)
            }
            Err(e) => {
                self.events.publish(TransferStatus::FileFailed {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// The codec to use for `address`, or `None` for plaintext.
    fn codec_for(&self, address: IpAddr) -> Option<&SecureCodec> {
        self.codec
            .as_ref()
            .filter(|_| self.sessions.is_secure(address))
    }

    async fn deliver_chat(&self, address: IpAddr, text: &str) -> Result<Framing, SendError> {
        let sender = self.local_name.clone();
        let (header, framing) = match self.codec_for(address) {
            Some(codec) => {
                debug!("sending encrypted chat to {address}");
                let payload = codec.encrypt(text.as_bytes())?;
                (Header::EncryptedChat { sender, payload }, Framing::Encrypted)
            }
            None => {
                debug!("sending plaintext chat to {address}");
                (
                    Header::Chat {
                        sender,
                        text: text.to_string(),
                    },
                    Framing::Plain,
                )
            }
        };

        let line = encode_header(&header)?;
        self.transport.send_line(address, line).await?;
        Ok(framing)
    }

    async fn deliver_file(
        &self,
        address: IpAddr,
        path: &Path,
    ) -> Result<(Framing, String), SendError> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| SendError::InvalidPath(path.to_path_buf()))?;

        let read_err = |source| SendError::ReadFile {
            path: path.to_path_buf(),
            source,
        };
        let metadata = tokio::fs::metadata(path).await.map_err(read_err)?;
        if !metadata.is_file() {
            return Err(SendError::InvalidPath(path.to_path_buf()));
        }

        let (header, payload, framing) = match self.codec_for(address) {
            Some(codec) => {
                debug!("sending encrypted file {name} to {address}");
                let content = tokio::fs::read(path).await.map_err(read_err)?;
                let token = codec.encrypt(&content)?;
                (
                    Header::EncryptedFile { name: name.clone() },
                    OutboundPayload::Bytes(token.into_bytes()),
                    Framing::Encrypted,
                )
            }
            None => {
                debug!("sending plaintext file {name} to {address}");
                (
                    Header::File { name: name.clone() },
                    OutboundPayload::File(path.to_path_buf()),
                    Framing::Plain,
                )
            }
        };

        let line = encode_header(&header)?;
        self.transport
            .send_with_payload(address, line, payload)
            .await?;
        Ok((framing, name))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
