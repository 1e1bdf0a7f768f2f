//! Query handler interface.

use std::net::SocketAddr;
use std::time::Instant;

use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, ResponseCode};

use super::Protocol;

/// Context for a DNS query.
#[derive(Debug, Clone)]
pub struct QueryContext {
    /// Client address.
    pub client: SocketAddr,

    /// Protocol used.
    pub protocol: Protocol,

    /// When the query was received.
    pub received_at: Instant,
}

impl QueryContext {
    /// Creates a new query context.
    pub fn new(client: SocketAddr, protocol: Protocol) -> Self {
        Self {
            client,
            protocol,
            received_at: Instant::now(),
        }
    }

    /// Returns the elapsed time since the query was received.
    pub fn elapsed(&self) -> std::time::Duration {
        self.received_at.elapsed()
    }
}

/// Query handler trait.
///
/// Implement this trait to handle DNS queries. Handlers are shared across
/// every request task and must not block on anything but I/O.
#[async_trait]
pub trait QueryHandler: Send + Sync {
    /// Handles a DNS query, returning the response message to send back.
    async fn handle(&self, query: Message, context: QueryContext) -> Message;
}

/// Builds a response skeleton echoing the query's id, opcode, RD flag, and
/// question section.
pub fn response_from(query: &Message) -> Message {
    let mut response = Message::new();
    response.set_id(query.id());
    response.set_message_type(MessageType::Response);
    response.set_op_code(query.op_code());
    response.set_recursion_desired(query.recursion_desired());
    response.set_recursion_available(false);
    response.add_queries(query.queries().to_vec());
    response
}

/// Builds an empty response with the given response code.
pub fn response_with_code(query: &Message, code: ResponseCode) -> Message {
    let mut response = response_from(query);
    response.set_response_code(code);
    response
}

/// A handler that returns REFUSED for all queries. Useful for testing.
pub struct RefusedHandler;

#[async_trait]
impl QueryHandler for RefusedHandler {
    async fn handle(&self, query: Message, _context: QueryContext) -> Message {
        response_with_code(&query, ResponseCode::Refused)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    use hickory_proto::op::Query;
    use hickory_proto::rr::{Name, RecordType};

    #[test]
    fn response_echoes_question() {
        let mut query = Message::new();
        query.set_id(4242);
        query.add_query(Query::query(
            Name::from_str("example.com.").unwrap(),
            RecordType::A,
        ));

        let response = response_with_code(&query, ResponseCode::Refused);
        assert_eq!(response.id(), 4242);
        assert_eq!(response.message_type(), MessageType::Response);
        assert_eq!(response.response_code(), ResponseCode::Refused);
        assert_eq!(response.queries().len(), 1);
        assert!(response.answers().is_empty());
    }

    #[test]
    fn query_context_elapsed() {
        let ctx = QueryContext::new("127.0.0.1:12345".parse().unwrap(), Protocol::Udp);
        assert!(ctx.elapsed() >= std::time::Duration::ZERO);
    }
}
