//! # Keyzone Server
//!
//! Async DNS listener infrastructure for the keyzone server: plain UDP and
//! TCP on a configured address, one task per datagram or connection, with a
//! bounded per-request deadline. Queries are decoded at the edge, handed to a
//! [`QueryHandler`], and the handler's response is encoded and sent back.
//!
//! Malformed inbound packets are dropped (UDP) or end the connection (TCP).
//! A request that outlives its deadline sends nothing; the client retries.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;

pub mod handler;
pub mod tcp;
pub mod udp;

pub use handler::{QueryContext, QueryHandler};
pub use tcp::TcpServer;
pub use udp::UdpServer;

/// Server error types.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// DNS transport protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Plain UDP.
    Udp,
    /// Plain TCP.
    Tcp,
}

impl Protocol {
    /// Returns the protocol name.
    pub const fn name(&self) -> &'static str {
        match self {
            Protocol::Udp => "UDP",
            Protocol::Tcp => "TCP",
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address both listeners bind to.
    pub listen: SocketAddr,

    /// Deadline for handling a single request, decode to send.
    pub request_timeout: Duration,

    /// TCP idle connection timeout.
    pub tcp_idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:53".parse().unwrap(),
            request_timeout: Duration::from_secs(5),
            tcp_idle_timeout: Duration::from_secs(10),
        }
    }
}

/// DNS server front-end running one UDP and one TCP listener.
pub struct DnsServer {
    config: ServerConfig,
    handler: Arc<dyn QueryHandler>,
    shutdown_tx: broadcast::Sender<()>,
}

impl DnsServer {
    /// Creates a new DNS server.
    pub fn new(config: ServerConfig, handler: Arc<dyn QueryHandler>) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            handler,
            shutdown_tx,
        }
    }

    /// Binds both listeners and serves until shutdown.
    pub async fn run(&self) -> Result<()> {
        let udp = UdpServer::bind(
            self.config.listen,
            self.handler.clone(),
            self.config.request_timeout,
        )
        .await?;

        let mut tcp = TcpServer::bind(
            self.config.listen,
            self.handler.clone(),
            self.config.request_timeout,
        )
        .await?;
        tcp.set_idle_timeout(self.config.tcp_idle_timeout);

        let mut udp_shutdown = self.shutdown_tx.subscribe();
        let mut tcp_shutdown = self.shutdown_tx.subscribe();

        let udp_task = tokio::spawn(async move {
            tokio::select! {
                result = udp.run() => result,
                _ = udp_shutdown.recv() => Ok(()),
            }
        });

        let tcp_task = tokio::spawn(async move {
            tokio::select! {
                result = tcp.run() => result,
                _ = tcp_shutdown.recv() => Ok(()),
            }
        });

        for task in [udp_task, tcp_task] {
            task.await
                .map_err(|e| ServerError::Io(std::io::Error::other(e)))??;
        }

        Ok(())
    }

    /// Initiates graceful shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }
}
