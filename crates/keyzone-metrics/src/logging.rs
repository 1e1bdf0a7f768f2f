//! Structured logging bootstrap.
//!
//! keyzone logs through `tracing`; the configuration exposes exactly two
//! knobs, a level string and a text/json switch, and this module turns
//! them into an installed subscriber. `RUST_LOG` still overrides the
//! configured level, so per-module directives keep working in development.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Parses a level string, falling back to `info` on anything unrecognized
/// rather than failing startup.
pub fn level_from_str(level: &str) -> Level {
    match level.to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Installs the global subscriber at `level`, as JSON lines when `json`
/// is set and human-readable text otherwise.
pub fn init(level: Level, json: bool) {
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let layer = fmt::layer().with_target(true);

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer)
            .init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_strings_parse_case_insensitively() {
        assert_eq!(level_from_str("TRACE"), Level::TRACE);
        assert_eq!(level_from_str("Debug"), Level::DEBUG);
        assert_eq!(level_from_str("warning"), Level::WARN);
        assert_eq!(level_from_str("error"), Level::ERROR);
    }

    #[test]
    fn unknown_levels_fall_back_to_info() {
        assert_eq!(level_from_str("verbose"), Level::INFO);
        assert_eq!(level_from_str(""), Level::INFO);
    }
}
