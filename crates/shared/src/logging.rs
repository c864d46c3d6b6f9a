//! Logging infrastructure for the scraper.
//!
//! Structured logging to the console and to daily-rotated files, with
//! module-specific log levels.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::{Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log directory path
    pub log_dir: String,
    /// Component name (used for log file naming)
    pub component: String,
    /// Default log level
    pub default_level: Level,
    /// Enable console output
    pub console: bool,
    /// Enable file output
    pub file: bool,
    /// Enable JSON formatting for file logs
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_dir: "data/logs".to_string(),
            component: "immoscout-scraper".to_string(),
            default_level: Level::INFO,
            console: true,
            file: true,
            json_format: false,
        }
    }
}

/// Keeps the background file writer alive; drop it last so buffered lines
/// are flushed on exit.
#[must_use = "dropping the guard stops file logging"]
pub struct LogGuard {
    _file_writer: Option<WorkerGuard>,
}

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Initialize logging with the given configuration
///
/// Sets up tracing with:
/// - Daily file rotation through a non-blocking writer
/// - Module-specific log levels, overridable through RUST_LOG
/// - Optional JSON formatting for the file output
pub fn init(config: LogConfig) -> Result<LogGuard> {
    let log_dir = Path::new(&config.log_dir);
    if config.file {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory: {}", config.log_dir))?;
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config)));

    let mut layers = Vec::new();

    if config.console {
        layers.push(console_layer());
    }

    let mut file_writer = None;
    if config.file {
        let appender = tracing_appender::rolling::daily(log_dir, &config.component);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_writer = Some(guard);

        let layer = fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_ansi(false)
            .with_writer(writer);

        layers.push(if config.json_format {
            layer.json().with_current_span(true).with_span_list(false).boxed()
        } else {
            layer.with_span_events(FmtSpan::CLOSE).boxed()
        });
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    tracing::info!(
        component = %config.component,
        log_dir = %config.log_dir,
        "Logging initialized"
    );

    Ok(LogGuard {
        _file_writer: file_writer,
    })
}

fn console_layer<S>() -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_span_events(FmtSpan::NONE)
        .with_writer(std::io::stdout)
        .boxed()
}

/// Filter used when RUST_LOG is not set
fn default_directives(config: &LogConfig) -> String {
    let level = config.default_level;
    format!(
        "{}={level},shared={level},immoscout_scraper={level},hyper=warn,reqwest=warn,h2=warn",
        config.component.replace('-', "_"),
    )
}

/// Parse a log level name from the configuration file
///
/// Unknown names fall back to INFO.
pub fn parse_level(level: &str) -> Level {
    level.trim().parse().unwrap_or(Level::INFO)
}
