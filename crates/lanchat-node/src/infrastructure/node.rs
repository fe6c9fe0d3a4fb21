//! Node wiring: builds every service from the configuration and starts the
//! background workers.
//!
//! ```text
//! Node::start()
//!  ├─ PresenceBroadcaster     (task, IAM:<name> every interval)
//!  ├─ discovery listener      (task, supervised UDP bind)
//!  │    └─ DiscoverPeersUseCase ── TcpPeerVerifier (task per new peer)
//!  ├─ ConnectionDispatcher    (task, supervised TCP bind, task per connection)
//!  └─ SendMessageUseCase      (driven by the caller through NodeHandle)
//! ```
//!
//! All workers report through one [`EventBus`]; the caller receives the
//! matching [`EventStream`].  Dropping the [`NodeHandle`] stops every worker.

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::sync::Arc;

use lanchat_core::protocol::encode_announcement;
use lanchat_core::{
    encode_header, Announcement, Header, ListenerKind, PeerRecord, ProtocolError, SecureCodec,
    SharedSecret,
};
use thiserror::Error;
use tokio::net::{TcpListener, UdpSocket};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::application::discover_peers::{DiscoverPeersUseCase, PeerVerifier};
use crate::application::event_bus::{EventBus, EventStream};
use crate::application::peer_registry::{PeerRegistry, SecureSessionView};
use crate::application::send_message::{Framing, SendError, SendMessageUseCase};
use crate::infrastructure::network::dispatcher::{ConnectionDispatcher, HeaderLimits};
use crate::infrastructure::network::presence::{
    run_discovery_listener, PresenceBroadcaster, PresenceError,
};
use crate::infrastructure::network::supervisor::{bind_with_retry, SupervisorPolicy};
use crate::infrastructure::network::transport::TcpTransport;
use crate::infrastructure::network::verification::TcpPeerVerifier;
use crate::infrastructure::storage::config::{AppConfig, ConfigError};
use crate::infrastructure::storage::received_files::ReceivedFileStore;

/// Error type for starting a node.
#[derive(Debug, Error)]
pub enum NodeError {
    /// The display name cannot be announced or used as a chat sender.
    #[error("invalid name {name:?}: {source}")]
    InvalidName {
        name: String,
        #[source]
        source: ProtocolError,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Presence(#[from] PresenceError),
}

/// Everything needed to start a node.
#[derive(Debug, Clone)]
pub struct NodeOptions {
    pub name: String,
    /// `None` disables encryption and verification.
    pub secret: Option<SharedSecret>,
    pub config: AppConfig,
}

impl NodeOptions {
    /// An empty password disables encryption.
    pub fn new(name: impl Into<String>, password: &str, config: AppConfig) -> Self {
        Self {
            name: name.into(),
            secret: SharedSecret::from_password(password),
            config,
        }
    }
}

pub struct Node;

impl Node {
    /// Validates the options, opens the broadcast socket, and spawns the
    /// background workers.
    ///
    /// Listener binds happen inside their supervised tasks; a bind failure is
    /// reported on the event stream rather than returned here.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError`] for an unusable name, an invalid address in the
    /// configuration, or a broadcast socket that cannot be opened.
    pub async fn start(options: NodeOptions) -> Result<(NodeHandle, EventStream), NodeError> {
        let NodeOptions {
            name,
            secret,
            config,
        } = options;
        validate_name(&name)?;

        let network = &config.network;
        let bind_ip = network.bind_ip()?;
        let broadcast_ip = network.broadcast_ip()?;
        let policy = SupervisorPolicy::from(&config.supervisor);

        let registry = Arc::new(PeerRegistry::with_stale_window(network.peer_stale_after()));
        let (events, stream) = EventBus::new();
        let secret = secret.map(Arc::new);

        let dispatcher = ConnectionDispatcher::new(
            secret.clone(),
            Arc::clone(&registry),
            events.clone(),
            ReceivedFileStore::new(&config.storage.received_dir),
            HeaderLimits {
                max_bytes: network.max_header_bytes,
                timeout: network.header_timeout(),
            },
        );

        let verifier = secret.clone().map(|secret| {
            Arc::new(TcpPeerVerifier::new(
                secret,
                network.transfer_port,
                network.connect_timeout(),
                network.header_timeout(),
            )) as Arc<dyn PeerVerifier>
        });
        let discovery =
            DiscoverPeersUseCase::new(name.clone(), Arc::clone(&registry), events.clone(), verifier);

        let sender = SendMessageUseCase::new(
            name.clone(),
            SecureSessionView::new(Arc::clone(&registry)),
            secret.as_deref().map(SecureCodec::new),
            Arc::new(TcpTransport::new(
                network.transfer_port,
                network.connect_timeout(),
                network.header_timeout(),
            )),
            events.clone(),
        );

        let broadcaster = PresenceBroadcaster::bind(
            &name,
            SocketAddr::new(broadcast_ip, network.discovery_port),
            network.broadcast_interval(),
        )
        .await?;

        let tcp_addr = SocketAddr::new(bind_ip, network.transfer_port);
        let udp_addr = SocketAddr::new(bind_ip, network.discovery_port);
        let tcp_events = events.clone();
        let udp_events = events;

        let tasks = vec![
            tokio::spawn(broadcaster.run()),
            tokio::spawn(async move {
                let bound = bind_with_retry(ListenerKind::Udp, policy, &udp_events, || {
                    UdpSocket::bind(udp_addr)
                })
                .await;
                if let Some(socket) = bound {
                    run_discovery_listener(socket, discovery).await;
                }
            }),
            tokio::spawn(async move {
                let bound = bind_with_retry(ListenerKind::Tcp, policy, &tcp_events, || {
                    TcpListener::bind(tcp_addr)
                })
                .await;
                if let Some(listener) = bound {
                    dispatcher.serve(listener).await;
                }
            }),
        ];

        info!(
            "node {name} started (encryption {})",
            if secret.is_some() { "enabled" } else { "disabled" }
        );

        let handle = NodeHandle {
            name,
            encrypted: secret.is_some(),
            registry,
            sender,
            tasks,
        };
        Ok((handle, stream))
    }
}

/// The name goes out in `IAM:` datagrams and as the sender of chat lines.
fn validate_name(name: &str) -> Result<(), NodeError> {
    let invalid = |source| NodeError::InvalidName {
        name: name.to_string(),
        source,
    };
    encode_announcement(&Announcement::new(name)).map_err(invalid)?;
    encode_header(&Header::Chat {
        sender: name.to_string(),
        text: String::new(),
    })
    .map_err(invalid)?;
    Ok(())
}

/// Control surface of a running node.  Dropping it stops every worker.
pub struct NodeHandle {
    name: String,
    encrypted: bool,
    registry: Arc<PeerRegistry>,
    sender: SendMessageUseCase,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `true` when the node was started with a password.
    pub fn encryption_enabled(&self) -> bool {
        self.encrypted
    }

    /// Known peers in discovery order.
    pub fn peers(&self) -> Vec<PeerRecord> {
        self.registry.snapshot()
    }

    /// A cloneable sender for use from spawned tasks.
    pub fn sender(&self) -> SendMessageUseCase {
        self.sender.clone()
    }

    /// # Errors
    ///
    /// See [`SendMessageUseCase::send_chat`].
    pub async fn send_chat(&self, address: IpAddr, text: &str) -> Result<Framing, SendError> {
        self.sender.send_chat(address, text).await
    }

    /// # Errors
    ///
    /// See [`SendMessageUseCase::send_file`].
    pub async fn send_file(&self, address: IpAddr, path: &Path) -> Result<Framing, SendError> {
        self.sender.send_file(address, path).await
    }

    /// Stops every background worker and waits until each has exited, so
    /// the listening sockets are closed when this returns.
    pub async fn shutdown(mut self) {
        let tasks = std::mem::take(&mut self.tasks);
        for task in &tasks {
            task.abort();
        }
        for task in tasks {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!("worker ended abnormally during shutdown: {e}");
                }
            }
        }
        info!("node {} stopped", self.name);
    }
}

impl Drop for NodeHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
