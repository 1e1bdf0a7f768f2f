//! TCP server implementation.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use hickory_proto::op::Message;
use socket2::{Domain, Socket, Type};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, trace};

use super::handler::{QueryContext, QueryHandler};
use super::{Protocol, Result};

/// Connection ID counter.
static CONNECTION_ID: AtomicU64 = AtomicU64::new(0);

/// TCP DNS server.
pub struct TcpServer {
    listener: TcpListener,
    handler: Arc<dyn QueryHandler>,
    request_timeout: Duration,
    idle_timeout: Duration,
    local_addr: SocketAddr,
}

impl TcpServer {
    /// Binds a new TCP server to the given address.
    pub async fn bind(
        addr: SocketAddr,
        handler: Arc<dyn QueryHandler>,
        request_timeout: Duration,
    ) -> Result<Self> {
        // Create socket with socket2 for more control
        let domain = if addr.is_ipv4() {
            Domain::IPV4
        } else {
            Domain::IPV6
        };

        let socket = Socket::new(domain, Type::STREAM, None)?;

        socket.set_reuse_address(true)?;

        #[cfg(unix)]
        socket.set_reuse_port(true)?;

        socket.set_nonblocking(true)?;

        socket.bind(&addr.into())?;
        socket.listen(1024)?;

        // Convert to tokio listener
        let std_listener: std::net::TcpListener = socket.into();
        let listener = TcpListener::from_std(std_listener)?;
        let local_addr = listener.local_addr()?;

        info!(addr = %local_addr, "TCP server listening");

        Ok(Self {
            listener,
            handler,
            request_timeout,
            idle_timeout: Duration::from_secs(10),
            local_addr,
        })
    }

    /// Returns the local address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Sets the idle timeout.
    pub fn set_idle_timeout(&mut self, timeout: Duration) {
        self.idle_timeout = timeout;
    }

    /// Runs the TCP server.
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, peer)) => {
                    let handler = self.handler.clone();
                    let request_timeout = self.request_timeout;
                    let idle_timeout = self.idle_timeout;
                    let conn_id = CONNECTION_ID.fetch_add(1, Ordering::Relaxed);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(
                            stream,
                            peer,
                            handler,
                            request_timeout,
                            idle_timeout,
                            conn_id,
                        )
                        .await
                        {
                            debug!(error = %e, client = %peer, "TCP connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "error accepting TCP connection");
                }
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<dyn QueryHandler>,
    request_timeout: Duration,
    idle_timeout: Duration,
    conn_id: u64,
) -> Result<()> {
    trace!(client = %peer, conn_id, "new TCP connection");

    let mut buf = BytesMut::with_capacity(4096);

    loop {
        match timeout(idle_timeout, read_message(&mut stream, &mut buf)).await {
            Ok(Ok(query_bytes)) => {
                // A stream that carries garbage is closed, not skipped
                let query = match Message::from_vec(&query_bytes) {
                    Ok(msg) => msg,
                    Err(e) => {
                        debug!(error = %e, client = %peer, "failed to parse TCP query, closing");
                        break;
                    }
                };

                let ctx = QueryContext::new(peer, Protocol::Tcp);

                let response = match timeout(request_timeout, handler.handle(query, ctx)).await {
                    Ok(response) => response,
                    Err(_) => {
                        debug!(client = %peer, "request deadline exceeded, closing connection");
                        break;
                    }
                };

                let wire = match response.to_vec() {
                    Ok(wire) => wire,
                    Err(e) => {
                        debug!(error = %e, client = %peer, "failed to encode response");
                        break;
                    }
                };

                match timeout(request_timeout, write_message(&mut stream, &wire)).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        debug!(error = %e, client = %peer, "TCP write error");
                        break;
                    }
                    Err(_) => {
                        debug!(client = %peer, "write deadline exceeded, closing connection");
                        break;
                    }
                }
            }
            Ok(Err(e)) => {
                if e.kind() == std::io::ErrorKind::UnexpectedEof {
                    trace!(client = %peer, conn_id, "TCP connection closed by client");
                } else {
                    debug!(error = %e, client = %peer, "TCP read error");
                }
                break;
            }
            Err(_) => {
                trace!(client = %peer, conn_id, "TCP connection idle timeout");
                break;
            }
        }
    }

    Ok(())
}

/// Reads one length-prefixed DNS message from a TCP stream.
async fn read_message(stream: &mut TcpStream, buf: &mut BytesMut) -> std::io::Result<Bytes> {
    let mut len_buf = [0u8; 2];
    stream.read_exact(&mut len_buf).await?;
    let len = u16::from_be_bytes(len_buf) as usize;

    if len == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "invalid TCP message length",
        ));
    }

    buf.clear();
    buf.resize(len, 0);
    stream.read_exact(buf).await?;

    Ok(buf.clone().freeze())
}

/// Writes one length-prefixed DNS message to a TCP stream.
async fn write_message(stream: &mut TcpStream, data: &[u8]) -> std::io::Result<()> {
    let len = data.len() as u16;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(data).await?;

    Ok(())
}
