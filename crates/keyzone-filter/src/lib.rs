//! # Keyzone Filter
//!
//! Query admission control. Before any store I/O the server checks each
//! question against accept and reject rule lists; a rejected query is
//! answered with REFUSED and never reaches the resolver.
//!
//! Rules are written as `<domain>:<type>[,<type>...]`:
//!
//! - `disco.net:A,AAAA` matches A and AAAA queries at or below `disco.net.`
//! - `:TXT` matches TXT queries for any name
//! - `disco.net:` matches any query at or below `disco.net.`
//!
//! A reject match always dominates; with a non-empty accept list, queries
//! matching no accept rule are refused. The filterer is immutable after
//! construction and shared read-only across request tasks.

use std::fmt;

use hickory_proto::op::Message;
use hickory_proto::rr::{Name, RecordType};
use tracing::{debug, warn};

// ============================================================================
// Filter Rules
// ============================================================================

/// A single admission rule: a domain scope plus an optional type set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryFilter {
    /// Names at or below this domain match. The root name matches anything.
    domain: Name,
    /// Record type mnemonics this rule covers. Empty covers every type.
    types: Vec<String>,
}

impl QueryFilter {
    /// Creates a rule covering `domain` and the given type mnemonics.
    pub fn new(domain: Name, types: Vec<String>) -> Self {
        Self { domain, types }
    }

    /// Returns true if this rule matches the question `(name, qtype)`.
    fn matches(&self, name: &Name, qtype: RecordType) -> bool {
        if !self.domain.zone_of(name) {
            return false;
        }

        self.types.is_empty() || self.types.iter().any(|t| t == &qtype.to_string())
    }
}

impl fmt::Display for QueryFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.domain, self.types.join(","))
    }
}

/// Parses filter strings of the form `<domain>:<type>[,<type>...]`.
///
/// Malformed entries (anything without exactly one `:`, or with an
/// unparseable domain) are logged and skipped rather than failing startup.
pub fn parse_filters<S: AsRef<str>>(filters: &[S]) -> Vec<QueryFilter> {
    let mut parsed = Vec::with_capacity(filters.len());

    for filter in filters {
        let filter = filter.as_ref();
        let mut components = filter.splitn(3, ':');
        let (domain, types) = match (components.next(), components.next(), components.next()) {
            (Some(domain), Some(types), None) => (domain, types),
            _ => {
                warn!(filter = %filter, "expected exactly one colon ([domain]:[type,type...]), skipping");
                continue;
            }
        };

        let domain = if domain.is_empty() {
            Name::root()
        } else {
            let fqdn = if domain.ends_with('.') {
                domain.to_string()
            } else {
                format!("{domain}.")
            };
            match fqdn.parse::<Name>() {
                Ok(name) => name,
                Err(err) => {
                    warn!(filter = %filter, error = %err, "invalid filter domain, skipping");
                    continue;
                }
            }
        };

        let types: Vec<String> = types
            .split(',')
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        debug!(domain = %domain, types = ?types, "adding query filter");
        parsed.push(QueryFilter::new(domain, types));
    }

    parsed
}

// ============================================================================
// Query Filterer
// ============================================================================

/// The admission predicate applied to every inbound query.
#[derive(Debug, Clone, Default)]
pub struct QueryFilterer {
    accept: Vec<QueryFilter>,
    reject: Vec<QueryFilter>,
}

impl QueryFilterer {
    /// Creates a filterer from parsed accept and reject rules.
    pub fn new(accept: Vec<QueryFilter>, reject: Vec<QueryFilter>) -> Self {
        Self { accept, reject }
    }

    /// Creates a filterer from raw filter strings.
    pub fn from_strings<S: AsRef<str>>(accept: &[S], reject: &[S]) -> Self {
        Self::new(parse_filters(accept), parse_filters(reject))
    }

    /// Returns true if the filterer admits every query.
    pub fn is_permissive(&self) -> bool {
        self.accept.is_empty() && self.reject.is_empty()
    }

    /// Decides whether the query should be answered.
    ///
    /// A matching reject rule always refuses. Otherwise, a non-empty accept
    /// list refuses anything it does not match. With both lists empty every
    /// query is admitted.
    pub fn should_accept_query(&self, msg: &Message) -> bool {
        let Some(question) = msg.queries().first() else {
            return true;
        };

        let name = question.name();
        let qtype = question.query_type();

        if self.reject.iter().any(|rule| rule.matches(name, qtype)) {
            debug!(name = %name, qtype = %qtype, "query matched reject filter");
            return false;
        }

        if !self.accept.is_empty() && !self.accept.iter().any(|rule| rule.matches(name, qtype)) {
            debug!(name = %name, qtype = %qtype, "query matched no accept filter");
            return false;
        }

        true
    }
}
