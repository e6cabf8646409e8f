//! Logging initialisation
//!
//! Builds a `tracing_subscriber::Registry` with a reloadable level filter, an
//! optional `EnvFilter` taken from `RUST_LOG`, and an optional console layer.

use anyhow::{anyhow, Result};
use tracing::Level;
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter,
    Registry,
};
use ytsconfig::Config;

/// Logging initialisation options
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Minimum level (`ERROR`, `WARN`, `INFO`, `DEBUG`, `TRACE`)
    pub min_level: String,
    /// Enable console output
    pub enable_console: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            min_level: "INFO".to_string(),
            enable_console: true,
        }
    }
}

impl LoggingOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_level: config.get_log_min_level(),
            enable_console: config.get_log_enable_console(),
        }
    }
}

/// Changes the log level at runtime
#[derive(Clone)]
pub struct LogHandle {
    reload_handle: reload::Handle<LevelFilter, Registry>,
}

impl LogHandle {
    pub fn set_max_level(&self, level: &str) -> Result<()> {
        let level = string_to_level(level).ok_or_else(|| {
            anyhow!("invalid log level '{level}', expected ERROR, WARN, INFO, DEBUG or TRACE")
        })?;
        self.reload_handle
            .reload(LevelFilter::from_level(level))
            .map_err(|e| anyhow!("failed to reload log level: {e}"))?;
        tracing::info!(level = %level, "Log level changed");
        Ok(())
    }
}

/// Installs the global tracing subscriber
///
/// `RUST_LOG`, when set, further narrows what the level filter lets through.
/// A second call leaves the already installed subscriber in place.
pub fn init_logging(options: LoggingOptions) -> LogHandle {
    let level = string_to_level(&options.min_level).unwrap_or(Level::INFO);
    let (filter, reload_handle) = reload::Layer::new(LevelFilter::from_level(level));

    let env_filter = std::env::var("RUST_LOG")
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok());

    let console = options.enable_console.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(true)
    });

    let result = Registry::default()
        .with(filter)
        .with(env_filter)
        .with(console)
        .try_init();

    if let Err(e) = result {
        eprintln!("Logging already initialised: {e}");
    }

    LogHandle { reload_handle }
}

pub fn string_to_level(s: &str) -> Option<Level> {
    match s.trim().to_uppercase().as_str() {
        "ERROR" => Some(Level::ERROR),
        "WARN" | "WARNING" => Some(Level::WARN),
        "INFO" => Some(Level::INFO),
        "DEBUG" => Some(Level::DEBUG),
        "TRACE" => Some(Level::TRACE),
        _ => None,
    }
}
