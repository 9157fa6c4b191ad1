//! Structured logging setup for compose-role
//!
//! Logs always go to stderr so the output document can be written to stdout.
//!
//! # Example
//!
//! ```no_run
//! use compose_role::util::{init_logging, LoggingConfig};
//!
//! // Falls back to COMPOSE_ROLE_LOG_LEVEL / COMPOSE_ROLE_LOG_JSON
//! init_logging(LoggingConfig::from_flags(None, false, false));
//!
//! use tracing::{info, warn};
//!
//! info!("Descriptor transformed");
//! warn!(service = "web", "Service missing from canonical descriptor");
//! ```

use std::env;
use std::sync::Once;
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Ensures logging is only initialized once
static INIT: Once = Once::new();

/// Environment variable holding the default log level
pub const LOG_LEVEL_ENV: &str = "COMPOSE_ROLE_LOG_LEVEL";

/// Environment variable switching to JSON log lines
pub const LOG_JSON_ENV: &str = "COMPOSE_ROLE_LOG_JSON";

/// Configuration for logging initialization
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Minimum log level to display
    pub level: Level,

    /// Use JSON output format
    pub use_json: bool,

    /// Include the module target (e.g., compose_role::transform) in logs
    pub include_target: bool,

    /// Include file and line number information
    pub include_location: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            use_json: false,
            include_target: true,
            include_location: false,
        }
    }
}

impl LoggingConfig {
    /// Creates a logging configuration with the specified level
    ///
    /// ```
    /// use compose_role::util::LoggingConfig;
    /// use tracing::Level;
    ///
    /// let config = LoggingConfig::with_level(Level::DEBUG);
    /// assert!(!config.use_json);
    /// ```
    pub fn with_level(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Level from explicit flags, falling back to `COMPOSE_ROLE_LOG_LEVEL`
    ///
    /// An explicit `--log-level` wins over `-v`, which wins over `-q`.
    pub fn from_flags(log_level: Option<&str>, verbose: bool, quiet: bool) -> Self {
        let level = if let Some(level_str) = log_level {
            parse_level(level_str)
        } else if verbose {
            Level::DEBUG
        } else if quiet {
            Level::ERROR
        } else {
            let level_str = env::var(LOG_LEVEL_ENV).unwrap_or_else(|_| "info".to_string());
            parse_level(&level_str)
        };

        Self {
            use_json: json_from_env(),
            ..Self::with_level(level)
        }
    }
}

/// Parses a log level from a string
///
/// ```
/// use compose_role::util::logging::parse_level;
/// use tracing::Level;
///
/// assert_eq!(parse_level("debug"), Level::DEBUG);
/// assert_eq!(parse_level("invalid"), Level::INFO);
/// ```
pub fn parse_level(level_str: &str) -> Level {
    match level_str.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
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

fn json_from_env() -> bool {
    env::var(LOG_JSON_ENV)
        .ok()
        .and_then(|v| v.parse::<bool>().ok())
        .unwrap_or(false)
}

/// Installs the global subscriber. Only the first call has an effect.
///
/// `RUST_LOG` directives are honored on top of the configured level.
pub fn init_logging(config: LoggingConfig) {
    INIT.call_once(|| {
        let mut filter = EnvFilter::from_default_env();
        if let Ok(directive) = format!("compose_role={}", config.level).parse() {
            filter = filter.add_directive(directive);
        }

        let json = config.use_json.then(|| {
            fmt::layer()
                .json()
                .with_target(config.include_target)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_writer(std::io::stderr)
        });
        let text = (!config.use_json).then(|| {
            fmt::layer()
                .with_target(config.include_target)
                .with_file(config.include_location)
                .with_line_number(config.include_location)
                .with_writer(std::io::stderr)
        });

        tracing_subscriber::registry()
            .with(filter)
            .with(json)
            .with(text)
            .init();
    });
}
