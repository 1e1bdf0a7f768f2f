//! # Keyzone Resolver
//!
//! The resolution pipeline: translates DNS questions into hierarchical store
//! lookups and synthesizes wire records from the values found there.
//!
//! For a question `(name, type)` the resolver reads `<base>/.TYPE` where
//! `<base>` is the reversed-label key of `name`. A leaf at that key is a
//! single record; a directory holds one record per value leaf, in store
//! order. When the exact key is absent, wildcard expansion probes `*` in
//! place of each label, deepest first. TTLs come from `.ttl` sibling leaves
//! and fall back to a process-wide default.
//!
//! Answers never chase CNAMEs: a CNAME found at the queried name is returned
//! as-is and the client re-queries the target. When no answer exists, the
//! closest enclosing SOA is attached as authority.

use std::collections::HashMap;
use std::sync::Arc;

use hickory_proto::op::{Message, MessageType, ResponseCode};
use hickory_proto::rr::{Name, Record, RecordType};
use thiserror::Error;
use tracing::{debug, warn};

use keyzone_store::{keys, Store, StoreError};

pub mod parse;

// ============================================================================
// Error Types
// ============================================================================

/// Errors raised while turning store data into resource records.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// A store node could not be interpreted as a record of the attempted
    /// type: wrong shape, wrong field count, wrong delimiter.
    #[error("cannot interpret node {key} as a {rtype} record: {message}")]
    NodeConversion {
        /// Store key of the offending node.
        key: String,
        /// The record type that was being synthesized.
        rtype: RecordType,
        /// Description of the mismatch.
        message: String,
    },

    /// A value parsed structurally but violates the type's constraints
    /// (bad IP address, out-of-range integer, unparseable domain name).
    #[error("invalid {rtype} record value: {message}")]
    BadRecordValue {
        /// The record type that was being synthesized.
        rtype: RecordType,
        /// Description of the violation.
        message: String,
    },

    /// The store could not be read.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ResolveError {
    /// Creates a new node-conversion error.
    pub fn node_conversion(
        key: impl Into<String>,
        rtype: RecordType,
        message: impl Into<String>,
    ) -> Self {
        Self::NodeConversion {
            key: key.into(),
            rtype,
            message: message.into(),
        }
    }

    /// Creates a new bad-record-value error.
    pub fn bad_value(rtype: RecordType, message: impl Into<String>) -> Self {
        Self::BadRecordValue {
            rtype,
            message: message.into(),
        }
    }
}

/// Result type for resolution operations.
pub type Result<T> = std::result::Result<T, ResolveError>;

// ============================================================================
// Supported Types
// ============================================================================

/// Record types the resolver can synthesize from stored values.
///
/// ANY queries iterate this list; questions for anything else are answered
/// with NXDOMAIN.
pub const SUPPORTED_TYPES: [RecordType; 9] = [
    RecordType::A,
    RecordType::AAAA,
    RecordType::CNAME,
    RecordType::NS,
    RecordType::SOA,
    RecordType::PTR,
    RecordType::TXT,
    RecordType::MX,
    RecordType::SRV,
];

/// Returns true if the resolver can answer questions of this type.
pub fn is_supported(rtype: RecordType) -> bool {
    SUPPORTED_TYPES.contains(&rtype)
}

// ============================================================================
// Resolver
// ============================================================================

/// A stored record value and its optional `.ttl` sidecar, pre-binding.
struct StoredValue {
    key: String,
    value: String,
    ttl: Option<String>,
}

impl StoredValue {
    /// Parses the sidecar TTL, falling back to `default` when it is missing
    /// or not a decimal number.
    fn ttl_or(&self, default: u32) -> u32 {
        match &self.ttl {
            Some(raw) => raw.trim().parse().unwrap_or(default),
            None => default,
        }
    }
}

/// Store-backed authoritative resolver.
///
/// Stateless per query: every lookup is a fresh traversal of the store, so a
/// single resolver is shared read-only across all request tasks.
pub struct Resolver {
    store: Arc<dyn Store>,
    default_ttl: u32,
}

impl Resolver {
    /// Creates a resolver over the given store.
    ///
    /// `default_ttl` is attached to records whose `.ttl` sidecar is missing
    /// or malformed.
    pub fn new(store: Arc<dyn Store>, default_ttl: u32) -> Self {
        Self { store, default_ttl }
    }

    /// Answers a DNS query message.
    ///
    /// The response echoes the question and carries answers, an optional SOA
    /// authority, and a response code per the rules in the crate docs. The
    /// AA bit is set whenever answers were produced or an enclosing SOA was
    /// found.
    pub async fn lookup(&self, query: &Message) -> Message {
        let mut response = Message::new();
        response.set_id(query.id());
        response.set_message_type(MessageType::Response);
        response.set_op_code(query.op_code());
        response.set_recursion_desired(query.recursion_desired());
        response.set_recursion_available(false);
        response.add_queries(query.queries().to_vec());

        let Some(question) = query.queries().first() else {
            response.set_response_code(ResponseCode::FormErr);
            return response;
        };

        let name = question.name().clone();
        let qtype = question.query_type();

        debug!(name = %name, qtype = %qtype, "resolving");

        let mut answers: Vec<Record> = Vec::new();
        let mut rcode = ResponseCode::NoError;

        if qtype == RecordType::ANY {
            for rtype in SUPPORTED_TYPES {
                let (records, err) = self.answers_for_type(&name, rtype).await;
                if let Some(ResolveError::Store(err)) = err {
                    warn!(name = %name, error = %err, "store read failed");
                    response.set_response_code(ResponseCode::ServFail);
                    return response;
                }
                answers.extend(records);
            }
        } else if !is_supported(qtype) {
            debug!(name = %name, qtype = %qtype, "unsupported query type");
            rcode = ResponseCode::NXDomain;
        } else {
            let (records, err) = self.answers_for_type(&name, qtype).await;
            if let Some(ResolveError::Store(err)) = err {
                warn!(name = %name, qtype = %qtype, error = %err, "store read failed");
                response.set_response_code(ResponseCode::ServFail);
                return response;
            }
            answers = records;
        }

        // No direct answer: a CNAME at the same name stands in for any other
        // type. The target is not chased; clients re-query it themselves.
        if answers.is_empty()
            && rcode == ResponseCode::NoError
            && qtype != RecordType::CNAME
            && qtype != RecordType::ANY
        {
            let (records, _) = self.answers_for_type(&name, RecordType::CNAME).await;
            answers = records;
        }

        let mut authority = Vec::new();
        if answers.is_empty() {
            authority = self.authority_for(&name).await;
        }

        response.set_response_code(rcode);
        response.set_authoritative(!answers.is_empty() || !authority.is_empty());
        response.add_answers(answers);
        response.add_name_servers(authority);
        response
    }

    /// Loads and parses all records of `rtype` at `name`.
    ///
    /// Returns the records that parsed, in store order, alongside the first
    /// error encountered; malformed values are dropped from the list but do
    /// not abort the rest of the record set.
    pub async fn answers_for_type(
        &self,
        name: &Name,
        rtype: RecordType,
    ) -> (Vec<Record>, Option<ResolveError>) {
        let values = match self.stored_values(name, rtype).await {
            Ok(values) => values,
            Err(err) => return (Vec::new(), Some(err)),
        };

        let mut records = Vec::with_capacity(values.len());
        let mut first_error = None;

        for stored in values {
            let ttl = stored.ttl_or(self.default_ttl);
            match parse::record_from_value(name, rtype, &stored.key, &stored.value, ttl) {
                Ok(record) => records.push(record),
                Err(err) => {
                    warn!(key = %stored.key, rtype = %rtype, error = %err, "dropping malformed record");
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }

        (records, first_error)
    }

    /// Finds the SOA of the closest enclosing zone for `name`.
    ///
    /// Walks suffixes from most- to least-specific and returns the first SOA
    /// found, with the matching suffix as its header name. Empty when no
    /// ancestor carries an SOA.
    pub async fn authority_for(&self, name: &Name) -> Vec<Record> {
        let mut current = name.clone();

        while !current.is_root() {
            let (records, _) = self.answers_for_type(&current, RecordType::SOA).await;
            if let Some(soa) = records.into_iter().next() {
                debug!(name = %name, zone = %current, "found enclosing authority");
                return vec![soa];
            }
            current = current.base_name();
        }

        Vec::new()
    }

    /// Reads the stored values for `(name, rtype)`, trying the exact key
    /// first and falling back to wildcard expansion.
    async fn stored_values(&self, name: &Name, rtype: RecordType) -> Result<Vec<StoredValue>> {
        let key = keys::record_key(name, rtype);
        if let Some(values) = self.values_at(&key).await? {
            return Ok(values);
        }

        // Wildcard expansion: substitute `*` for one label at a time, deepest
        // first, so the longest exact prefix wins.
        for candidate in wildcard_keys(name, rtype) {
            if let Some(values) = self.values_at(&candidate).await? {
                debug!(name = %name, key = %candidate, "wildcard match");
                return Ok(values);
            }
        }

        Ok(Vec::new())
    }

    /// Reads the record values stored at `key`, with their TTL sidecars
    /// bound by exact path. `None` when the key does not exist at all.
    async fn values_at(&self, key: &str) -> Result<Option<Vec<StoredValue>>> {
        let node = match self.store.get(key).await {
            Ok(node) => node,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        if !node.dir {
            // Leaf record: its TTL lives at the `.ttl` sibling one level up.
            let ttl = self.ttl_sidecar(&format!("{key}.ttl")).await?;
            return Ok(Some(vec![StoredValue {
                key: node.key,
                value: node.value,
                ttl,
            }]));
        }

        // Directory record set: a child `<id>.ttl` binds to the record child
        // at exactly `<id>`; `.ttl` leaves with no record sibling are
        // dangling and synthesize nothing.
        let leaves = node.leaves();

        let mut ttls: HashMap<&str, &str> = HashMap::new();
        for leaf in &leaves {
            if let Some(base) = leaf.key.strip_suffix(".ttl") {
                ttls.insert(base, leaf.value.as_str());
            }
        }

        let mut values = Vec::new();
        for leaf in &leaves {
            if leaf.key.ends_with(".ttl") {
                continue;
            }
            values.push(StoredValue {
                key: leaf.key.clone(),
                value: leaf.value.clone(),
                ttl: ttls.get(leaf.key.as_str()).map(|s| s.to_string()),
            });
        }

        Ok(Some(values))
    }

    /// Fetches a `.ttl` sidecar leaf, treating a missing key as no TTL.
    async fn ttl_sidecar(&self, key: &str) -> Result<Option<String>> {
        match self.store.get(key).await {
            Ok(node) if !node.dir => Ok(Some(node.value)),
            Ok(_) => Ok(None),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}

/// Candidate wildcard keys for `(name, rtype)`: one `*` substitution per
/// label position, deepest label first. Wildcards are never combined across
/// positions.
fn wildcard_keys(name: &Name, rtype: RecordType) -> Vec<String> {
    let name = name.to_lowercase();
    let mut segments: Vec<String> = name
        .iter()
        .map(|label| String::from_utf8_lossy(label).into_owned())
        .collect();
    segments.reverse();

    let mut candidates = Vec::with_capacity(segments.len());
    for position in (0..segments.len()).rev() {
        let mut with_wildcard = segments.clone();
        with_wildcard[position] = "*".to_string();
        candidates.push(format!("/{}/.{}", with_wildcard.join("/"), rtype));
    }
    candidates
}
