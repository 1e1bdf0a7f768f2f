//! Query handling glue for the keyzone DNS server.
//!
//! The binary wires this handler between the listeners and the resolution
//! pipeline: admission filtering first, then store-backed resolution, with
//! metrics around both. It lives in the library target so the integration
//! tests exercise the same path production traffic takes.

use std::sync::Arc;

use async_trait::async_trait;
use hickory_proto::op::{Message, ResponseCode};
use tracing::debug;

use keyzone_filter::QueryFilterer;
use keyzone_resolver::Resolver;
use keyzone_server::handler::{response_with_code, QueryContext, QueryHandler};

/// The production query handler: filter, resolve, account.
pub struct KeyzoneHandler {
    resolver: Arc<Resolver>,
    filterer: Arc<QueryFilterer>,
}

impl KeyzoneHandler {
    /// Creates a handler over the given resolver and admission filter.
    pub fn new(resolver: Arc<Resolver>, filterer: Arc<QueryFilterer>) -> Self {
        Self { resolver, filterer }
    }
}

#[async_trait]
impl QueryHandler for KeyzoneHandler {
    async fn handle(&self, query: Message, context: QueryContext) -> Message {
        let stats = keyzone_metrics::instruments();
        let proto = context.protocol.name();

        let Some(question) = query.queries().first() else {
            return response_with_code(&query, ResponseCode::FormErr);
        };

        stats.query_received(proto, &question.query_type().to_string());

        // Admission control happens before any store I/O.
        if !self.filterer.should_accept_query(&query) {
            debug!(
                client = %context.client,
                name = %question.name(),
                qtype = %question.query_type(),
                "query refused by filter"
            );
            stats.query_refused();
            let response = response_with_code(&query, ResponseCode::Refused);
            stats.response_sent(proto, &response.response_code().to_string(), context.elapsed());
            return response;
        }

        let response = self.resolver.lookup(&query).await;

        if response.response_code() == ResponseCode::ServFail {
            stats.store_read_failed();
        }
        stats.response_sent(proto, &response.response_code().to_string(), context.elapsed());

        response
    }
}
