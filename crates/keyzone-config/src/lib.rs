//! # Keyzone Configuration
//!
//! Typed configuration for the keyzone DNS server.
//!
//! Configuration loads from YAML, JSON, or TOML (dispatched on the file
//! extension), every section has sensible defaults, and a `validate()` pass
//! rejects values the server cannot run with. Command-line flags override
//! file values in the binary.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration error.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("file not found: {0}")]
    NotFound(PathBuf),
}

impl ConfigError {
    fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Main configuration for the keyzone DNS server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server identification and listeners.
    pub server: ServerConfig,

    /// Backing store connection.
    pub store: StoreConfig,

    /// Resolution behavior.
    pub resolver: ResolverConfig,

    /// Query admission filters.
    pub filter: FilterConfig,

    /// Metrics and observability.
    pub metrics: MetricsConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

impl Config {
    /// Loads configuration from a file, dispatching on the extension.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;

        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            Some("toml") => toml::from_str(&content)?,
            _ => serde_yaml::from_str(&content)?, // Default to YAML
        };

        Ok(config)
    }

    /// Loads configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        self.server.validate()?;
        self.store.validate()?;
        self.filter.validate()?;
        Ok(())
    }

    /// Returns the socket address the listeners bind to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.server.listen, self.server.port)
    }

    /// Serializes to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

/// Server identification and listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Server name, used in logs and the startup banner.
    pub name: String,

    /// Listen IP address.
    pub listen: IpAddr,

    /// Listen port for both UDP and TCP.
    pub port: u16,

    /// Per-request deadline in milliseconds, decode to send.
    pub request_timeout_ms: u64,

    /// TCP idle connection timeout in seconds.
    pub tcp_idle_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "keyzone".to_string(),
            listen: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 53,
            request_timeout_ms: 5_000,
            tcp_idle_timeout_secs: 10,
        }
    }
}

impl ServerConfig {
    fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(ConfigError::invalid("server.port", "must be non-zero"));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "server.request_timeout_ms",
                "must be non-zero",
            ));
        }
        Ok(())
    }
}

/// Backing store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// etcd endpoints, `host:port`.
    pub endpoints: Vec<String>,

    /// Key prefix prepended to every read, for multi-tenanting or test
    /// isolation. Empty addresses the keyspace root.
    pub prefix: String,

    /// Connect/request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            endpoints: vec!["127.0.0.1:2379".to_string()],
            prefix: String::new(),
            timeout_ms: 2_000,
        }
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(ConfigError::invalid(
                "store.endpoints",
                "at least one etcd endpoint is required",
            ));
        }
        Ok(())
    }
}

/// Resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// TTL attached to records without an explicit `.ttl` sidecar.
    pub default_ttl: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self { default_ttl: 300 }
    }
}

/// Query admission filter configuration.
///
/// Filter strings use the `<domain>:<type>[,<type>...]` grammar; see the
/// `keyzone-filter` crate docs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Accept rules. Non-empty means queries must match one of these.
    pub accept: Vec<String>,

    /// Reject rules. A match here always refuses the query.
    pub reject: Vec<String>,
}

impl FilterConfig {
    fn validate(&self) -> Result<()> {
        for (field, rules) in [("filter.accept", &self.accept), ("filter.reject", &self.reject)] {
            for rule in rules {
                if rule.matches(':').count() != 1 {
                    return Err(ConfigError::invalid(
                        field,
                        format!("{rule:?} must contain exactly one colon ([domain]:[type,type...])"),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Metrics and observability configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable metrics collection.
    pub enabled: bool,

    /// Prometheus endpoint.
    pub prometheus: Option<PrometheusConfig>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            prometheus: Some(PrometheusConfig::default()),
        }
    }
}

/// Prometheus exporter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrometheusConfig {
    /// Enable the Prometheus scrape endpoint.
    pub enabled: bool,

    /// Scrape listen address.
    pub listen: SocketAddr,
}

impl Default for PrometheusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 9153),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level.
    pub level: String,

    /// Log format (text, json).
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.listen_addr().port(), 53);
    }

    #[test]
    fn yaml_roundtrip() {
        let config = Config::default();
        let yaml = config.to_yaml().unwrap();
        let parsed = Config::from_yaml(&yaml).unwrap();
        assert_eq!(config.server.name, parsed.server.name);
        assert_eq!(config.store.endpoints, parsed.store.endpoints);
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let config = Config::from_yaml(
            r#"
server:
  port: 5353
store:
  endpoints: ["10.0.0.1:2379", "10.0.0.2:2379"]
  prefix: "/keyzone"
filter:
  accept: ["net:A,AAAA"]
"#,
        )
        .unwrap();

        assert_eq!(config.server.port, 5353);
        assert_eq!(config.server.name, "keyzone");
        assert_eq!(config.store.endpoints.len(), 2);
        assert_eq!(config.store.prefix, "/keyzone");
        assert_eq!(config.filter.accept, vec!["net:A,AAAA".to_string()]);
        assert_eq!(config.resolver.default_ttl, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_empty_endpoints() {
        let config = Config::from_yaml("store:\n  endpoints: []\n").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_malformed_filter_rule() {
        let config = Config::from_yaml("filter:\n  reject: [\"no-colon\"]\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn rejects_zero_port() {
        let config = Config::from_yaml("server:\n  port: 0\n").unwrap();
        assert!(config.validate().is_err());
    }
}
