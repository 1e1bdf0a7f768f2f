//! UDP server implementation.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use hickory_proto::op::Message;
use socket2::{Domain, Socket, Type};
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, error, info, trace};

use super::handler::{self, QueryContext, QueryHandler};
use super::{Protocol, Result};

/// Plain-UDP responses larger than this are truncated so the client retries
/// over TCP.
const MAX_UDP_RESPONSE: usize = 512;

/// UDP DNS server.
pub struct UdpServer {
    socket: Arc<UdpSocket>,
    handler: Arc<dyn QueryHandler>,
    request_timeout: Duration,
    local_addr: SocketAddr,
}

impl UdpServer {
    /// Binds a new UDP server to the given address.
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

        let socket = Socket::new(domain, Type::DGRAM, None)?;

        socket.set_reuse_address(true)?;

        #[cfg(unix)]
        socket.set_reuse_port(true)?;

        socket.set_nonblocking(true)?;

        socket.bind(&addr.into())?;

        // Convert to tokio socket
        let std_socket: std::net::UdpSocket = socket.into();
        let socket = UdpSocket::from_std(std_socket)?;
        let local_addr = socket.local_addr()?;

        info!(addr = %local_addr, "UDP server listening");

        Ok(Self {
            socket: Arc::new(socket),
            handler,
            request_timeout,
            local_addr,
        })
    }

    /// Returns the local address.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Runs the UDP server.
    pub async fn run(&self) -> Result<()> {
        let mut buf = vec![0u8; 65535];

        loop {
            match self.socket.recv_from(&mut buf).await {
                Ok((len, src)) => {
                    let data = Bytes::copy_from_slice(&buf[..len]);
                    let socket = self.socket.clone();
                    let handler = self.handler.clone();
                    let request_timeout = self.request_timeout;

                    // Process each datagram on its own task
                    tokio::spawn(async move {
                        if let Err(e) =
                            process_query(socket, handler, data, src, request_timeout).await
                        {
                            debug!(error = %e, client = %src, "error processing UDP query");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "error receiving UDP packet");
                }
            }
        }
    }
}

async fn process_query(
    socket: Arc<UdpSocket>,
    handler: Arc<dyn QueryHandler>,
    data: Bytes,
    src: SocketAddr,
    request_timeout: Duration,
) -> Result<()> {
    // Drop malformed queries without a reply
    let query = match Message::from_vec(&data) {
        Ok(msg) => msg,
        Err(e) => {
            trace!(error = %e, client = %src, "failed to parse DNS query");
            return Ok(());
        }
    };

    let ctx = QueryContext::new(src, Protocol::Udp);

    // The deadline covers resolution; an expired request sends nothing and
    // the client retries.
    let response = match timeout(request_timeout, handler.handle(query, ctx)).await {
        Ok(response) => response,
        Err(_) => {
            debug!(client = %src, "request deadline exceeded, dropping response");
            return Ok(());
        }
    };

    let wire = match response.to_vec() {
        Ok(wire) => wire,
        Err(e) => {
            debug!(error = %e, client = %src, "failed to encode response");
            return Ok(());
        }
    };

    let wire = if wire.len() > MAX_UDP_RESPONSE {
        truncated_response(&response).to_vec().map_err(|e| {
            super::ServerError::Protocol(format!("failed to encode truncated response: {e}"))
        })?
    } else {
        wire
    };

    timeout(request_timeout, socket.send_to(&wire, src))
        .await
        .map_err(|_| super::ServerError::Protocol("send deadline exceeded".into()))??;

    Ok(())
}

/// Rebuilds `response` as an empty answer with the TC bit set.
fn truncated_response(response: &Message) -> Message {
    let mut truncated = handler::response_from(response);
    truncated.set_response_code(response.response_code());
    truncated.set_authoritative(response.authoritative());
    truncated.set_truncated(true);
    truncated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::RefusedHandler;

    #[tokio::test]
    async fn udp_server_bind() {
        let handler = Arc::new(RefusedHandler);
        let server = UdpServer::bind(
            "127.0.0.1:0".parse().unwrap(),
            handler,
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert!(server.local_addr().port() > 0);
    }
}
