//! Structured logging setup for shipbox
//!
//! Diagnostics go to stderr through the `tracing` ecosystem so that command
//! output on stdout (digests, JSON/YAML reports) stays machine-readable.
//!
//! - Console output by default, JSON with `SHIPBOX_LOG_JSON=true`
//! - `SHIPBOX_LOG_LEVEL` sets the level for shipbox's own targets
//! - `RUST_LOG` adds or overrides filter directives
//! - Initialization happens at most once per process
//!
//! # Example
//!
//! ```no_run
//! use shipbox::util::logging;
//! use tracing::{debug, info};
//!
//! logging::init_from_env();
//!
//! info!("Packaging build context");
//! debug!(service = "api", files = 42, "Archive built");
//! ```

use std::env;
use std::io;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

/// Noisy dependencies kept at `warn` unless `RUST_LOG` says otherwise
const QUIET_TARGETS: &[&str] = &["walkdir", "tokio_util"];

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum level for shipbox targets
    pub level: Level,

    /// Emit one JSON object per event
    pub use_json: bool,

    /// Include the module target (e.g., shipbox::context::archive)
    pub include_target: bool,

    /// Include file and line number information
    pub include_location: bool,

    /// Include thread ID and name; useful when services are fixed up concurrently
    pub include_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: false,
            include_location: false,
            include_thread_ids: false,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Reads `SHIPBOX_LOG_LEVEL` and `SHIPBOX_LOG_JSON`.
    ///
    /// JSON output also turns on targets and thread ids, since it is meant
    /// for log collectors rather than people.
    pub fn from_env() -> Self {
        let level = env::var("SHIPBOX_LOG_LEVEL")
            .map(|v| parse_level(&v))
            .unwrap_or(Level::INFO);

        let use_json = env::var("SHIPBOX_LOG_JSON")
            .ok()
            .and_then(|v| v.trim().to_lowercase().parse::<bool>().ok())
            .unwrap_or(false);

        Self {
            level,
            use_json,
            include_target: use_json,
            include_location: false,
            include_thread_ids: use_json,
        }
    }

    /// Filter applied when `RUST_LOG` does not override it
    fn filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::builder()
            .with_default_directive(Level::WARN.into())
            .from_env_lossy();

        if let Ok(directive) = format!("shipbox={}", self.level).parse::<Directive>() {
            filter = filter.add_directive(directive);
        }

        if env::var("RUST_LOG").is_err() {
            for target in QUIET_TARGETS {
                if let Ok(directive) = format!("{}=warn", target).parse::<Directive>() {
                    filter = filter.add_directive(directive);
                }
            }
        }
        filter
    }
}

/// Parses a log level, case-insensitively; anything unknown is `INFO`
pub fn parse_level(level_str: &str) -> Level {
    match level_str.trim().to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" | "warning" => Level::WARN,
        "error" => Level::ERROR,
        _ => {
            eprintln!(
                "Invalid log level '{}', defaulting to INFO. Valid levels: trace, debug, info, warn, error",
                level_str
            );
            Level::INFO
        }
    }
}

/// Installs the global subscriber; later calls are ignored.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let json = config.use_json.then(|| {
            fmt::layer()
                .json()
                .with_writer(io::stderr)
                .with_target(config.include_target)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.include_thread_ids)
                .with_thread_names(config.include_thread_ids)
        });
        let console = (!config.use_json).then(|| {
            fmt::layer()
                .with_writer(io::stderr)
                .with_target(config.include_target)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_thread_ids(config.include_thread_ids)
        });

        // Another subscriber may already be installed (e.g. by an embedding application)
        let _ = tracing_subscriber::registry()
            .with(config.filter())
            .with(json)
            .with(console)
            .try_init();
    });
}

pub fn init_default() {
    init_logging(LoggingConfig::default());
}

pub fn init_from_env() {
    init_logging(LoggingConfig::from_env());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("trace"), Level::TRACE);
        assert_eq!(parse_level("Debug"), Level::DEBUG);
        assert_eq!(parse_level(" INFO "), Level::INFO);
        assert_eq!(parse_level("warning"), Level::WARN);
        assert_eq!(parse_level("error"), Level::ERROR);
    }

    #[test]
    fn test_parse_level_invalid() {
        assert_eq!(parse_level("verbose"), Level::INFO);
        assert_eq!(parse_level(""), Level::INFO);
    }

    #[test]
    fn test_default_config() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.use_json);
        assert!(!config.include_thread_ids);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        env::set_var("SHIPBOX_LOG_LEVEL", "debug");
        env::set_var("SHIPBOX_LOG_JSON", "TRUE");
        let config = LoggingConfig::from_env();
        env::remove_var("SHIPBOX_LOG_LEVEL");
        env::remove_var("SHIPBOX_LOG_JSON");

        assert_eq!(config.level, Level::DEBUG);
        assert!(config.use_json);
        assert!(config.include_target);
        assert!(config.include_thread_ids);

        let config = LoggingConfig::from_env();
        assert_eq!(config.level, Level::INFO);
        assert!(!config.use_json);
    }
}
