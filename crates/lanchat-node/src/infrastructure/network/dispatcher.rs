//! ConnectionDispatcher: the TCP accept loop and per-connection handler.
//!
//! Every accepted connection runs in its own task and carries exactly one
//! request.  The handler reads one header line, then:
//!
//! | Header                   | Reply      | Effect                                           |
//! |--------------------------|------------|--------------------------------------------------|
//! | `FILE:<name>`            | `ACCEPTED` | stream the rest to `received_<name>`             |
//! | `EFILE:<name>`           | `ACCEPTED` | read to EOF, decrypt, write `received_<name>`    |
//! | `CHAT:<sender>:<text>`   | –          | publish the chat line                            |
//! | `ECHAT:<sender>:<token>` | –          | decrypt (or placeholder) and publish             |
//! | `VERIFY:<fingerprint>`   | `VMATCH`/`VNOMATCH` | constant-time fingerprint comparison    |
//!
//! Anything else drops the connection without an event.  The header read is
//! bounded in size and time; payload reads run until the sender closes.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use lanchat_core::protocol::{
    encode_reply, NO_PASSWORD_CHAT_PLACEHOLDER, UNDECRYPTABLE_CHAT_PLACEHOLDER,
};
use lanchat_core::{
    parse_header, ChatMessage, DecryptionError, Header, ProtocolError, Reply, SecureCodec,
    SharedSecret, TransferStatus,
};
use thiserror::Error;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpListener;
use tokio::time;
use tracing::{debug, info, warn};

use crate::application::event_bus::EventBus;
use crate::application::peer_registry::PeerRegistry;
use crate::infrastructure::storage::received_files::{ReceivedFileStore, StorageError};

/// Why a connection ended without being served.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No complete header arrived in time.
    #[error("header not received within {0:?}")]
    HeaderTimeout(Duration),

    /// The peer closed before sending anything.
    #[error("connection closed before a header arrived")]
    Closed,

    /// The header was too long, not UTF-8, or not a known request.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Limits applied to the header line of every connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderLimits {
    pub max_bytes: usize,
    pub timeout: Duration,
}

impl Default for HeaderLimits {
    fn default() -> Self {
        Self {
            max_bytes: lanchat_core::protocol::DEFAULT_MAX_HEADER_BYTES,
            timeout: Duration::from_secs(10),
        }
    }
}

/// Serves inbound connections on the transfer port.
#[derive(Clone)]
pub struct ConnectionDispatcher {
    secret: Option<Arc<SharedSecret>>,
    codec: Option<SecureCodec>,
    registry: Arc<PeerRegistry>,
    events: EventBus,
    store: ReceivedFileStore,
    limits: HeaderLimits,
}

impl ConnectionDispatcher {
    pub fn new(
        secret: Option<Arc<SharedSecret>>,
        registry: Arc<PeerRegistry>,
        events: EventBus,
        store: ReceivedFileStore,
        limits: HeaderLimits,
    ) -> Self {
        let codec = secret.as_deref().map(SecureCodec::new);
        Self {
            secret,
            codec,
            registry,
            events,
            store,
            limits,
        }
    }

    /// Accepts connections forever, one task per connection.
    pub async fn serve(self, listener: TcpListener) {
        match listener.local_addr() {
            Ok(addr) => info!("transfer listener on TCP {addr}"),
            Err(e) => debug!("transfer listener address unavailable: {e}"),
        }

        loop {
            let (stream, remote) = match listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept error: {e}");
                    time::sleep(Duration::from_millis(100)).await;
                    continue;
                }
            };

            let this = self.clone();
            tokio::spawn(async move {
                if let Err(e) = this.handle(stream, remote.ip()).await {
                    debug!("connection from {remote} dropped: {e}");
                }
            });
        }
    }

    /// Serves one connection from `peer` to completion.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] when the header is missing, too long, late,
    /// or unrecognised, or when the connection breaks.  Decryption and file
    /// write failures are not errors here; they are published as events.
    pub async fn handle<S>(&self, stream: S, peer: IpAddr) -> Result<(), DispatchError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut conn = BufReader::new(stream);
        let line = time::timeout(
            self.limits.timeout,
            read_header_line(&mut conn, self.limits.max_bytes),
        )
        .await
        .map_err(|_| DispatchError::HeaderTimeout(self.limits.timeout))??;
        let header = parse_header(&line)?;
        debug!("{} request from {peer}", header.kind());

        match header {
            Header::File { name } => self.receive_file(&mut conn, &name).await?,
            Header::EncryptedFile { name } => self.receive_encrypted_file(&mut conn, &name).await?,
            Header::Chat { sender, text } => self.publish_chat(peer, sender, text, false),
            Header::EncryptedChat { sender, payload } => {
                let text = self.open_chat(&payload, &sender);
                self.publish_chat(peer, sender, text, true);
            }
            Header::Verify { fingerprint } => {
                let reply = self.verify_reply(&fingerprint);
                debug!("VERIFY from {peer}: {reply}");
                send_reply(&mut conn, reply).await?;
            }
        }
        Ok(())
    }

    async fn receive_file<S>(&self, conn: &mut BufReader<S>, name: &str) -> Result<(), DispatchError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        send_reply(conn, Reply::Accepted).await?;
        let status = match self.store.save_stream(name, conn).await {
            Ok((path, bytes)) => {
                info!("received {name} ({bytes} bytes) as {}", path.display());
                TransferStatus::Received {
                    name: name.to_string(),
                }
            }
            Err(e @ StorageError::Receive { .. }) => {
                warn!("transfer of {name} from peer broke off: {e}");
                TransferStatus::ReceiveFailed {
                    name: name.to_string(),
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                warn!("failed to save {name}: {e}");
                TransferStatus::WriteFailed {
                    name: name.to_string(),
                    reason: e.to_string(),
                }
            }
        };
        self.events.publish(status);
        Ok(())
    }

    async fn receive_encrypted_file<S>(
        &self,
        conn: &mut BufReader<S>,
        name: &str,
    ) -> Result<(), DispatchError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        send_reply(conn, Reply::Accepted).await?;

        let Some(codec) = &self.codec else {
            // Drain so the sender finishes cleanly; the ciphertext is never stored.
            tokio::io::copy(conn, &mut tokio::io::sink()).await?;
            debug!("encrypted file {name} received but no password set");
            self.events.publish(TransferStatus::EncryptedWithoutPassword {
                name: name.to_string(),
            });
            return Ok(());
        };

        let mut encoded = Vec::new();
        conn.read_to_end(&mut encoded).await?;

        let plaintext = std::str::from_utf8(&encoded)
            .map_err(|_| DecryptionError)
            .and_then(|token| codec.decrypt(token));
        let status = match plaintext {
            Err(DecryptionError) => {
                debug!("file decryption failed for {name}");
                TransferStatus::DecryptFailed {
                    name: name.to_string(),
                }
            }
            Ok(plaintext) => match self.store.save_bytes(name, &plaintext).await {
                Ok(path) => {
                    info!("received encrypted {name} as {}", path.display());
                    TransferStatus::ReceivedEncrypted {
                        name: name.to_string(),
                    }
                }
                Err(e) => {
                    warn!("failed to save {name}: {e}");
                    TransferStatus::WriteFailed {
                        name: name.to_string(),
                        reason: e.to_string(),
                    }
                }
            },
        };
        self.events.publish(status);
        Ok(())
    }

    /// Decrypts an `ECHAT` token, or returns the placeholder to show instead.
    fn open_chat(&self, token: &str, sender: &str) -> String {
        let Some(codec) = &self.codec else {
            debug!("encrypted chat from {sender} but no password set");
            return NO_PASSWORD_CHAT_PLACEHOLDER.to_string();
        };
        match codec.decrypt(token) {
            Ok(plaintext) => String::from_utf8_lossy(&plaintext).into_owned(),
            Err(DecryptionError) => {
                debug!("chat decryption failed from {sender}");
                UNDECRYPTABLE_CHAT_PLACEHOLDER.to_string()
            }
        }
    }

    fn publish_chat(&self, from: IpAddr, sender: String, text: String, encrypted: bool) {
        self.registry.set_preview(from, &text);
        self.events.publish(ChatMessage {
            from,
            sender,
            text,
            encrypted,
        });
    }

    /// Without a local password nothing can match.
    fn verify_reply(&self, remote: &str) -> Reply {
        match &self.secret {
            Some(secret) if secret.matches_fingerprint(remote) => Reply::VerifyMatch,
            _ => Reply::VerifyNoMatch,
        }
    }
}

/// Reads one line of at most `max_bytes` (excluding the newline).
///
/// A final line without a newline is accepted when the peer closes.
async fn read_header_line<R>(reader: &mut R, max_bytes: usize) -> Result<String, DispatchError>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX).saturating_add(1);
    let n = (&mut *reader).take(limit).read_until(b'\n', &mut buf).await?;
    if n == 0 {
        return Err(DispatchError::Closed);
    }
    if !buf.ends_with(b"\n") && buf.len() > max_bytes {
        return Err(ProtocolError::HeaderTooLong { limit: max_bytes }.into());
    }
    String::from_utf8(buf).map_err(|_| ProtocolError::InvalidUtf8.into())
}

async fn send_reply<S>(conn: &mut BufReader<S>, reply: Reply) -> std::io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let stream = conn.get_mut();
    stream.write_all(encode_reply(reply).as_bytes()).await?;
    stream.flush().await
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::event_bus::EventStream;
    use lanchat_core::NodeEvent;
    use std::path::PathBuf;
    use tokio::io::{duplex, DuplexStream};
    use uuid::Uuid;

    const PEER: &str = "192.168.1.20";

    struct Fixture {
        dispatcher: ConnectionDispatcher,
        registry: Arc<PeerRegistry>,
        events: EventStream,
        dir: PathBuf,
    }

    impl Drop for Fixture {
        fn drop(&mut self) {
            std::fs::remove_dir_all(&self.dir).ok();
        }
    }

    fn fixture(password: Option<&str>, limits: HeaderLimits) -> Fixture {
        let dir = std::env::temp_dir().join(format!("lanchat_dispatch_{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let registry = Arc::new(PeerRegistry::new());
        let (bus, events) = EventBus::new();
        let secret = password.and_then(SharedSecret::from_password).map(Arc::new);
        let dispatcher = ConnectionDispatcher::new(
            secret,
            Arc::clone(&registry),
            bus,
            ReceivedFileStore::new(&dir),
            limits,
        );
        Fixture {
            dispatcher,
            registry,
            events,
            dir,
        }
    }

    fn peer() -> IpAddr {
        PEER.parse().unwrap()
    }

    /// Writes `request`, closes the write side, runs the handler, and returns
    /// whatever the handler replied.
    async fn exchange(dispatcher: &ConnectionDispatcher, request: &[u8]) -> (Result<(), DispatchError>, String) {
        let (mut client, server): (DuplexStream, DuplexStream) = duplex(64 * 1024);
        let handler = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.handle(server, peer()).await })
        };

        client.write_all(request).await.unwrap();
        client.shutdown().await.unwrap();
        let mut reply = String::new();
        client.read_to_string(&mut reply).await.unwrap();

        (handler.await.unwrap(), reply)
    }

    // ── CHAT / ECHAT ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_chat_is_published_verbatim() {
        // Arrange
        let mut fx = fixture(None, HeaderLimits::default());
        fx.registry.upsert(peer(), "alice");

        // Act
        let (result, reply) = exchange(&fx.dispatcher, b"CHAT:alice:hello: world\n").await;

        // Assert
        assert!(result.is_ok());
        assert!(reply.is_empty(), "CHAT has no acknowledgement");
        assert_eq!(
            fx.events.recv().await.unwrap(),
            NodeEvent::ChatReceived(ChatMessage {
                from: peer(),
                sender: "alice".into(),
                text: "hello: world".into(),
                encrypted: false,
            })
        );
        assert_eq!(fx.registry.get(peer()).unwrap().last_message_preview, "hello: world");
    }

    #[tokio::test]
    async fn test_echat_with_same_password_is_decrypted() {
        let mut fx = fixture(Some("hunter2"), HeaderLimits::default());
        let token = lanchat_core::crypto::secure_codec::encrypt(b"psst", "hunter2").unwrap();

        exchange(&fx.dispatcher, format!("ECHAT:bob:{token}\n").as_bytes()).await.0.unwrap();

        let NodeEvent::ChatReceived(chat) = fx.events.recv().await.unwrap() else {
            panic!("expected chat");
        };
        assert_eq!(chat.text, "psst");
        assert!(chat.encrypted);
    }

    #[tokio::test]
    async fn test_echat_with_other_password_yields_placeholder() {
        let mut fx = fixture(Some("other"), HeaderLimits::default());
        let token = lanchat_core::crypto::secure_codec::encrypt(b"psst", "hunter2").unwrap();

        exchange(&fx.dispatcher, format!("ECHAT:bob:{token}\n").as_bytes()).await.0.unwrap();

        let NodeEvent::ChatReceived(chat) = fx.events.recv().await.unwrap() else {
            panic!("expected chat");
        };
        assert_eq!(chat.text, UNDECRYPTABLE_CHAT_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_echat_without_password_yields_no_password_placeholder() {
        let mut fx = fixture(None, HeaderLimits::default());

        exchange(&fx.dispatcher, b"ECHAT:bob:AAAA\n").await.0.unwrap();

        let NodeEvent::ChatReceived(chat) = fx.events.recv().await.unwrap() else {
            panic!("expected chat");
        };
        assert_eq!(chat.text, NO_PASSWORD_CHAT_PLACEHOLDER);
        assert_eq!(chat.sender, "bob");
    }

    // ── FILE / EFILE ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_file_is_accepted_and_written_with_prefix() {
        // Arrange
        let mut fx = fixture(None, HeaderLimits::default());

        // Act
        let (result, reply) = exchange(&fx.dispatcher, b"FILE:notes.txt\nline one\nline two\n").await;

        // Assert
        assert!(result.is_ok());
        assert_eq!(reply, "ACCEPTED\n");
        assert_eq!(
            std::fs::read(fx.dir.join("received_notes.txt")).unwrap(),
            b"line one\nline two\n"
        );
        assert_eq!(
            fx.events.recv().await.unwrap(),
            NodeEvent::TransferStatus(TransferStatus::Received {
                name: "notes.txt".into()
            })
        );
    }

    #[tokio::test]
    async fn test_file_name_cannot_escape_receive_dir() {
        let fx = fixture(None, HeaderLimits::default());

        exchange(&fx.dispatcher, b"FILE:../../escape.txt\nx").await.0.unwrap();

        assert!(fx.dir.join("received_escape.txt").exists());
        assert!(!fx.dir.join("../../escape.txt").exists());
    }

    /// Hands out `data`, then fails every read with `ConnectionReset`.
    /// Writes are accepted and discarded.
    struct ResetAfter {
        data: &'static [u8],
    }

    impl AsyncRead for ResetAfter {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut tokio::io::ReadBuf<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            if self.data.is_empty() {
                return std::task::Poll::Ready(Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "peer reset",
                )));
            }
            let n = self.data.len().min(buf.remaining());
            buf.put_slice(&self.data[..n]);
            self.data = &self.data[n..];
            std::task::Poll::Ready(Ok(()))
        }
    }

    impl AsyncWrite for ResetAfter {
        fn poll_write(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &[u8],
        ) -> std::task::Poll<std::io::Result<usize>> {
            std::task::Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }

        fn poll_shutdown(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
        ) -> std::task::Poll<std::io::Result<()>> {
            std::task::Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_file_cut_off_by_sender_reports_receive_failure() {
        // Arrange
        let mut fx = fixture(None, HeaderLimits::default());
        let conn = ResetAfter {
            data: b"FILE:cut.bin\nfirst half of the pay",
        };

        // Act
        let result = fx.dispatcher.handle(conn, peer()).await;

        // Assert
        assert!(result.is_ok());
        let status = fx.events.recv().await.unwrap().to_status_string();
        assert!(
            status.starts_with("Failed to receive file cut.bin: connection lost"),
            "got {status:?}"
        );
        assert!(!fx.dir.join("received_cut.bin").exists());
    }

    #[tokio::test]
    async fn test_efile_with_same_password_is_decrypted_to_disk() {
        let mut fx = fixture(Some("hunter2"), HeaderLimits::default());
        let token = lanchat_core::crypto::secure_codec::encrypt(b"%PDF-1.7 ...", "hunter2").unwrap();

        let (_, reply) = exchange(&fx.dispatcher, format!("EFILE:doc.pdf\n{token}").as_bytes()).await;

        assert_eq!(reply, "ACCEPTED\n");
        assert_eq!(std::fs::read(fx.dir.join("received_doc.pdf")).unwrap(), b"%PDF-1.7 ...");
        assert_eq!(
            fx.events.recv().await.unwrap().to_status_string(),
            "Received (encrypted): doc.pdf"
        );
    }

    #[tokio::test]
    async fn test_efile_with_wrong_password_writes_nothing() {
        let mut fx = fixture(Some("other"), HeaderLimits::default());
        let token = lanchat_core::crypto::secure_codec::encrypt(b"secret", "hunter2").unwrap();

        exchange(&fx.dispatcher, format!("EFILE:doc.pdf\n{token}").as_bytes()).await.0.unwrap();

        assert!(!fx.dir.join("received_doc.pdf").exists());
        assert_eq!(
            fx.events.recv().await.unwrap().to_status_string(),
            "Failed to decrypt file: doc.pdf"
        );
    }

    #[tokio::test]
    async fn test_efile_without_password_is_discarded() {
        let mut fx = fixture(None, HeaderLimits::default());

        let (_, reply) = exchange(&fx.dispatcher, b"EFILE:report.txt\nQUJDREVGRw==").await;

        assert_eq!(reply, "ACCEPTED\n");
        assert!(!fx.dir.join("received_report.txt").exists());
        assert_eq!(
            fx.events.recv().await.unwrap().to_status_string(),
            "Encrypted file received but no password set: report.txt"
        );
    }

    // ── VERIFY ────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_verify_with_matching_fingerprint_replies_vmatch() {
        let fx = fixture(Some("hunter2"), HeaderLimits::default());
        let request = format!("VERIFY:{}\n", lanchat_core::fingerprint("hunter2"));

        let (_, reply) = exchange(&fx.dispatcher, request.as_bytes()).await;

        assert_eq!(reply, "VMATCH\n");
    }

    #[tokio::test]
    async fn test_verify_with_other_fingerprint_replies_vnomatch() {
        let fx = fixture(Some("other"), HeaderLimits::default());
        let request = format!("VERIFY:{}\n", lanchat_core::fingerprint("hunter2"));

        let (_, reply) = exchange(&fx.dispatcher, request.as_bytes()).await;

        assert_eq!(reply, "VNOMATCH\n");
    }

    #[tokio::test]
    async fn test_verify_without_password_never_matches() {
        let fx = fixture(None, HeaderLimits::default());

        let (_, empty) = exchange(&fx.dispatcher, b"VERIFY:\n").await;
        let (_, real) = exchange(
            &fx.dispatcher,
            format!("VERIFY:{}\n", lanchat_core::fingerprint("x")).as_bytes(),
        )
        .await;

        assert_eq!(empty, "VNOMATCH\n");
        assert_eq!(real, "VNOMATCH\n");
    }

    // ── Malformed input ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_unknown_header_is_dropped_silently() {
        let mut fx = fixture(None, HeaderLimits::default());

        let (result, reply) = exchange(&fx.dispatcher, b"HELLO:world\n").await;

        assert!(matches!(
            result,
            Err(DispatchError::Protocol(ProtocolError::UnknownType(_)))
        ));
        assert!(reply.is_empty());
        assert!(fx.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_oversized_header_is_rejected() {
        let fx = fixture(
            None,
            HeaderLimits {
                max_bytes: 16,
                timeout: Duration::from_secs(5),
            },
        );

        let (result, _) = exchange(&fx.dispatcher, b"CHAT:alice:this line is far too long\n").await;

        assert!(matches!(
            result,
            Err(DispatchError::Protocol(ProtocolError::HeaderTooLong { limit: 16 }))
        ));
    }

    #[tokio::test]
    async fn test_header_of_exactly_max_bytes_is_accepted() {
        let mut fx = fixture(
            None,
            HeaderLimits {
                max_bytes: 12,
                timeout: Duration::from_secs(5),
            },
        );

        exchange(&fx.dispatcher, b"CHAT:a:hello\n").await.0.unwrap();

        assert!(matches!(fx.events.recv().await, Some(NodeEvent::ChatReceived(_))));
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        // Arrange
        let fx = fixture(
            None,
            HeaderLimits {
                max_bytes: 1024,
                timeout: Duration::from_millis(50),
            },
        );
        let (_client, server) = duplex(1024);

        // Act
        let result = fx.dispatcher.handle(server, peer()).await;

        // Assert
        assert!(matches!(result, Err(DispatchError::HeaderTimeout(_))));
    }

    #[tokio::test]
    async fn test_empty_connection_is_closed() {
        let fx = fixture(None, HeaderLimits::default());

        let (result, _) = exchange(&fx.dispatcher, b"").await;

        assert!(matches!(result, Err(DispatchError::Closed)));
    }

    trait StatusString {
        fn to_status_string(&self) -> String;
    }

    impl StatusString for NodeEvent {
        fn to_status_string(&self) -> String {
            match self {
                NodeEvent::TransferStatus(status) => status.to_string(),
                other => panic!("expected a status, got {other:?}"),
            }
        }
    }
}
