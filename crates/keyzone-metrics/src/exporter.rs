//! Prometheus scrape endpoint.
//!
//! Everything in this crate publishes through the `metrics` facade, so
//! exporting is just a matter of installing the recorder. With the
//! `prometheus` feature off this compiles to a no-op and the instruments
//! fall through to the facade's default recorder, which discards them.

use std::net::SocketAddr;

/// Installs the Prometheus recorder with an HTTP scrape listener.
///
/// The exporter serves the rendered metrics on every path, so only a
/// listen address is needed. Fails if a recorder is already installed or
/// the address cannot be bound.
#[cfg(feature = "prometheus")]
pub fn install(listen: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(listen)
        .install()?;

    tracing::info!(addr = %listen, "prometheus exporter listening");
    Ok(())
}

#[cfg(not(feature = "prometheus"))]
pub fn install(_listen: SocketAddr) -> Result<(), Box<dyn std::error::Error>> {
    Ok(())
}
