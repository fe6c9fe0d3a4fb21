//! TCP implementation of [`MessageTransport`].
//!
//! Each send opens a fresh connection to `<peer>:<transfer_port>`, bounded by
//! the connect timeout.  Chat lines are written and the connection closed.
//! File transfers wait for `ACCEPTED`, stream the payload, and then shut down
//! the write half so the receiver sees EOF.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use lanchat_core::protocol::parse_reply;
use lanchat_core::Reply;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;

use crate::application::send_message::{MessageTransport, OutboundPayload, SendError};

/// Longest reply line a peer may send, newline excluded.  The real replies
/// are at most `VNOMATCH`.
pub const MAX_REPLY_BYTES: usize = 64;

/// Outbound TCP connections to peers' transfer ports.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    port: u16,
    connect_timeout: Duration,
    reply_timeout: Duration,
}

impl TcpTransport {
    pub fn new(port: u16, connect_timeout: Duration, reply_timeout: Duration) -> Self {
        Self {
            port,
            connect_timeout,
            reply_timeout,
        }
    }

    async fn connect(&self, address: IpAddr) -> Result<TcpStream, SendError> {
        connect_with_timeout(SocketAddr::new(address, self.port), self.connect_timeout).await
    }
}

/// Reads one reply line of at most [`MAX_REPLY_BYTES`].
///
/// Returns an empty string when the peer closed without replying.
///
/// # Errors
///
/// Returns an [`io::ErrorKind::InvalidData`] error for an over-long or
/// non-UTF-8 line, and any read error as is.
pub async fn read_reply_line<R>(reader: &mut R) -> io::Result<String>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    let limit = MAX_REPLY_BYTES as u64 + 1;
    (&mut *reader).take(limit).read_line(&mut line).await?;
    if !line.ends_with('\n') && line.len() > MAX_REPLY_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("reply longer than {MAX_REPLY_BYTES} bytes"),
        ));
    }
    Ok(line)
}

/// Connects to `target`, giving up after `timeout`.
///
/// # Errors
///
/// Returns [`SendError::Connect`] on refusal or timeout.
pub async fn connect_with_timeout(target: SocketAddr, timeout: Duration) -> Result<TcpStream, SendError> {
    let connect_err = |reason: String| SendError::Connect {
        address: target.ip(),
        reason,
    };
    match time::timeout(timeout, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(connect_err(e.to_string())),
        Err(_) => Err(connect_err(format!("timed out after {timeout:?}"))),
    }
}

#[async_trait]
impl MessageTransport for TcpTransport {
    async fn send_line(&self, address: IpAddr, line: String) -> Result<(), SendError> {
        let io_err = |source| SendError::Io { address, source };
        let mut stream = self.connect(address).await?;
        stream.write_all(line.as_bytes()).await.map_err(io_err)?;
        stream.shutdown().await.map_err(io_err)?;
        Ok(())
    }

    async fn send_with_payload(
        &self,
        address: IpAddr,
        line: String,
        payload: OutboundPayload,
    ) -> Result<(), SendError> {
        let io_err = |source| SendError::Io { address, source };
        let mut stream = self.connect(address).await?;
        let (reader, mut writer) = stream.split();

        writer.write_all(line.as_bytes()).await.map_err(io_err)?;

        let mut reader = BufReader::new(reader);
        let reply = match time::timeout(self.reply_timeout, read_reply_line(&mut reader)).await {
            Ok(Ok(line)) => line,
            Ok(Err(e)) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(SendError::NotAccepted {
                    reply: e.to_string(),
                })
            }
            Ok(Err(e)) => return Err(io_err(e)),
            Err(_) => {
                return Err(SendError::NotAccepted {
                    reply: format!("no reply within {:?}", self.reply_timeout),
                })
            }
        };
        if parse_reply(&reply) != Some(Reply::Accepted) {
            return Err(SendError::NotAccepted {
                reply: reply.trim().to_string(),
            });
        }

        let sent = match payload {
            OutboundPayload::Bytes(bytes) => {
                writer.write_all(&bytes).await.map_err(io_err)?;
                bytes.len() as u64
            }
            OutboundPayload::File(path) => {
                let mut file = match tokio::fs::File::open(&path).await {
                    Ok(file) => file,
                    Err(source) => return Err(SendError::ReadFile { path, source }),
                };
                tokio::io::copy(&mut file, &mut writer)
                    .await
                    .map_err(io_err)?
            }
        };
        writer.shutdown().await.map_err(io_err)?;
        debug!("streamed {sent} payload bytes to {address}");
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
