//! Keyzone DNS Server
//!
//! An authoritative DNS server whose zone data lives in etcd. Questions are
//! translated into hierarchical key lookups, with wildcard expansion, CNAME
//! redirection, and SOA-based authority signaling.

use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use tokio::signal;
use tracing::{info, warn, Level};

use keyzone::KeyzoneHandler;
use keyzone_config::Config;
use keyzone_filter::QueryFilterer;
use keyzone_metrics::logging;
use keyzone_resolver::Resolver;
use keyzone_server::{DnsServer, ServerConfig};
use keyzone_store::EtcdStore;

/// Keyzone DNS Server - authoritative answers from an etcd keyspace
#[derive(Parser, Debug)]
#[command(name = "keyzone")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Listen IP address
    #[arg(short = 'l', long, env = "KEYZONE_LISTEN_ADDRESS")]
    listen: Option<IpAddr>,

    /// Port to listen on
    #[arg(short = 'p', long, env = "KEYZONE_LISTEN_PORT")]
    port: Option<u16>,

    /// host:port[,host:port] for etcd endpoints
    #[arg(short = 'e', long = "etcd", env = "KEYZONE_ETCD_HOSTS", value_delimiter = ',')]
    etcd: Vec<String>,

    /// Key prefix prepended to every store read
    #[arg(long, env = "KEYZONE_ETCD_PREFIX")]
    etcd_prefix: Option<String>,

    /// Default TTL to return on records without an explicit TTL
    #[arg(short = 't', long, env = "KEYZONE_DEFAULT_TTL")]
    default_ttl: Option<u32>,

    /// Limit DNS queries to a set of domain:[type,...] pairs
    #[arg(long, env = "KEYZONE_ACCEPT")]
    accept: Vec<String>,

    /// Refuse DNS queries matching a set of domain:[type,...] pairs
    #[arg(long, env = "KEYZONE_REJECT")]
    reject: Vec<String>,

    /// Enable debug logging
    #[arg(short = 'v', long, env = "KEYZONE_DEBUG")]
    debug: bool,

    /// Quiet mode (minimal output)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the DNS server (default)
    Run,

    /// Validate configuration file
    Validate,

    /// Show version information
    Version,
}

/// Find the configuration file in standard locations
fn find_config_file(explicit_path: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return Some(path);
    }

    let search_paths = [
        PathBuf::from("./keyzone.yaml"),
        PathBuf::from("./keyzone.yml"),
        PathBuf::from("/etc/keyzone/config.yaml"),
        PathBuf::from("/etc/keyzone/keyzone.yaml"),
    ];

    search_paths.into_iter().find(|path| path.exists())
}

/// Loads the configuration file (or defaults) and applies CLI overrides.
fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match find_config_file(cli.config.clone()) {
        Some(path) => Config::from_file(&path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };

    if let Some(listen) = cli.listen {
        config.server.listen = listen;
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if !cli.etcd.is_empty() {
        config.store.endpoints = cli.etcd.clone();
    }
    if let Some(prefix) = &cli.etcd_prefix {
        config.store.prefix = prefix.clone();
    }
    if let Some(ttl) = cli.default_ttl {
        config.resolver.default_ttl = ttl;
    }
    if !cli.accept.is_empty() {
        config.filter.accept = cli.accept.clone();
    }
    if !cli.reject.is_empty() {
        config.filter.reject = cli.reject.clone();
    }
    if cli.debug {
        config.logging.level = "debug".to_string();
    }

    config.validate().context("invalid configuration")?;
    Ok(config)
}

/// Initialize logging/tracing subsystem
fn init_logging(config: &Config, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        logging::level_from_str(&config.logging.level)
    };

    logging::init(level, config.logging.format == "json");
}

/// Print the startup banner
fn print_banner(config: &Config, quiet: bool) {
    if quiet {
        return;
    }

    let version = env!("CARGO_PKG_VERSION");

    println!();
    println!(
        "  {} {}",
        style("Keyzone DNS Server").cyan().bold(),
        style(format!("v{version}")).dim()
    );
    println!(
        "  {}",
        style("Authoritative answers from an etcd keyspace").dim()
    );
    println!();

    println!(
        "  {} {} (UDP/TCP)",
        style("Listen:").green(),
        config.listen_addr()
    );
    println!(
        "  {} {}",
        style("Store:").green(),
        config.store.endpoints.join(", ")
    );
    if !config.store.prefix.is_empty() {
        println!("  {} {}", style("Prefix:").green(), config.store.prefix);
    }

    let mut features = Vec::new();
    if !config.filter.accept.is_empty() || !config.filter.reject.is_empty() {
        features.push("Filtering");
    }
    if config.metrics.enabled {
        features.push("Metrics");
    }
    if !features.is_empty() {
        println!("  {} {}", style("Features:").green(), features.join(", "));
    }

    println!();
}

/// Run the DNS server
async fn run_server(config: Config, quiet: bool) -> Result<()> {
    print_banner(&config, quiet);

    // Initialize metrics export
    if config.metrics.enabled {
        if let Some(prom) = &config.metrics.prometheus {
            if prom.enabled {
                if let Err(e) = keyzone_metrics::exporter::install(prom.listen) {
                    warn!(error = %e, "failed to install prometheus exporter");
                }
            }
        }
    }

    // Connect the store. An unreachable cluster at launch is a warning, not
    // a failure; reads will retry against it per query.
    let store = EtcdStore::connect(
        &config.store.endpoints,
        config.store.prefix.clone(),
        Duration::from_millis(config.store.timeout_ms),
    )
    .await
    .context("failed to create etcd client")?;

    if let Err(e) = store.probe().await {
        warn!(error = %e, "failed to reach etcd cluster at launch time");
    }

    let filterer = Arc::new(QueryFilterer::from_strings(
        &config.filter.accept,
        &config.filter.reject,
    ));
    let resolver = Arc::new(Resolver::new(
        Arc::new(store),
        config.resolver.default_ttl,
    ));
    let handler = Arc::new(KeyzoneHandler::new(resolver, filterer));

    let server = DnsServer::new(
        ServerConfig {
            listen: config.listen_addr(),
            request_timeout: Duration::from_millis(config.server.request_timeout_ms),
            tcp_idle_timeout: Duration::from_secs(config.server.tcp_idle_timeout_secs),
        },
        handler,
    );

    info!(addr = %config.listen_addr(), "keyzone serving");

    tokio::select! {
        result = server.run() => {
            result.context("server terminated")?;
        }
        _ = signal::ctrl_c() => {
            info!("interrupt received, shutting down");
            server.shutdown();
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("keyzone {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Validate) => {
            let config = load_config(&cli)?;
            println!(
                "{} configuration is valid ({})",
                style("ok:").green().bold(),
                config.listen_addr()
            );
            Ok(())
        }
        Some(Commands::Run) | None => {
            let config = load_config(&cli)?;
            init_logging(&config, cli.quiet);
            run_server(config, cli.quiet).await
        }
    }
}
