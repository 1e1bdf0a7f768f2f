//! # Keyzone Metrics
//!
//! Instrumentation for the query path. Instruments publish through the
//! `metrics` facade under a `keyzone_` prefix; [`exporter`] installs the
//! Prometheus scrape endpoint and [`logging`] bootstraps `tracing`.
//!
//! The instrument set is deliberately small: one counter pair for questions
//! in and responses out, a resolution-latency histogram, and counters for
//! the two ways a query dies early (refused by the admission filter, or
//! SERVFAIL because the store could not be read).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use once_cell::sync::OnceCell;

pub mod exporter;
pub mod logging;

static INSTRUMENTS: OnceCell<Instruments> = OnceCell::new();

/// Returns the process-wide instrument set.
pub fn instruments() -> &'static Instruments {
    INSTRUMENTS.get_or_init(Instruments::new)
}

/// Counters and histograms for the query path.
///
/// The facade carries the labelled series; a couple of plain atomics ride
/// along so in-process callers (the banner, tests) can read totals without
/// a scrape.
pub struct Instruments {
    started: Instant,
    queries: AtomicU64,
    refused: AtomicU64,
}

impl Instruments {
    fn new() -> Self {
        Self {
            started: Instant::now(),
            queries: AtomicU64::new(0),
            refused: AtomicU64::new(0),
        }
    }

    /// Time since the instrument set was created, which is process start
    /// for the global set.
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Total questions seen, admitted or not.
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    /// Total questions refused by the admission filter.
    pub fn refused(&self) -> u64 {
        self.refused.load(Ordering::Relaxed)
    }

    /// Counts a question entering the pipeline.
    pub fn query_received(&self, proto: &str, qtype: &str) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        counter!("keyzone_queries_total", "proto" => proto.to_string(), "qtype" => qtype.to_string())
            .increment(1);
    }

    /// Counts a finished response and the wall-clock cost of producing it.
    pub fn response_sent(&self, proto: &str, rcode: &str, elapsed: Duration) {
        counter!("keyzone_responses_total", "proto" => proto.to_string(), "rcode" => rcode.to_string())
            .increment(1);
        histogram!("keyzone_resolution_seconds", "proto" => proto.to_string())
            .record(elapsed.as_secs_f64());
    }

    /// Counts a question the admission filter turned away.
    pub fn query_refused(&self) {
        self.refused.fetch_add(1, Ordering::Relaxed);
        counter!("keyzone_refused_total").increment(1);
    }

    /// Counts a store read failure surfaced to the client as SERVFAIL.
    pub fn store_read_failed(&self) {
        counter!("keyzone_store_failures_total").increment(1);
    }
}

impl Default for Instruments {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_start_at_zero() {
        let instruments = Instruments::new();
        assert_eq!(instruments.queries(), 0);
        assert_eq!(instruments.refused(), 0);
        assert!(instruments.uptime() >= Duration::ZERO);
    }

    #[test]
    fn query_and_refusal_totals_track() {
        let instruments = Instruments::new();
        instruments.query_received("UDP", "A");
        instruments.query_received("TCP", "SRV");
        instruments.query_refused();

        assert_eq!(instruments.queries(), 2);
        assert_eq!(instruments.refused(), 1);
    }

    #[test]
    fn response_accounting_does_not_touch_query_totals() {
        let instruments = Instruments::new();
        instruments.response_sent("UDP", "NoError", Duration::from_millis(3));
        assert_eq!(instruments.queries(), 0);
    }
}
