//! Logging infrastructure for corelink
//!
//! Provides unified logging setup using the tracing ecosystem.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::{paths, CorelinkError, Result};

/// Log output destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    /// Log to stderr (for interactive use)
    Stderr,
    /// Log to file (for long-running clients)
    File,
    /// Log to both stderr and file
    Both,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Output destination
    pub output: LogOutput,
    /// Log level filter (e.g., "info", "debug", "corelink=debug,tokio=warn")
    pub filter: String,
    /// Include span events (enter/exit)
    pub span_events: bool,
    /// Include file/line in logs
    pub file_line: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: "info".into(),
            span_events: false,
            file_line: false,
        }
    }
}

impl LogConfig {
    /// Create config for an interactive client (quiet stderr)
    pub fn client() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: std::env::var("CORELINK_LOG").unwrap_or_else(|_| "warn".into()),
            span_events: false,
            file_line: false,
        }
    }

    /// Create config for an unattended client (file logging)
    pub fn daemon() -> Self {
        Self {
            output: LogOutput::File,
            filter: std::env::var("CORELINK_LOG").unwrap_or_else(|_| "info".into()),
            span_events: false,
            file_line: true,
        }
    }

    /// Create config for development (verbose stderr)
    pub fn development() -> Self {
        Self {
            output: LogOutput::Stderr,
            filter: "debug".into(),
            span_events: true,
            file_line: true,
        }
    }
}

/// Initialize logging with default configuration
///
/// Uses CORELINK_LOG env var for filter, defaults to "info"
pub fn init_logging() -> Result<()> {
    let mut config = LogConfig::default();
    if let Ok(filter) = std::env::var("CORELINK_LOG") {
        config.filter = filter;
    }
    init_logging_with_config(config)
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: LogConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&config.filter)
        .map_err(|e| CorelinkError::config(format!("Invalid log filter: {}", e)))?;

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false);

    let fmt_layer = if config.span_events {
        fmt_layer.with_span_events(FmtSpan::ENTER | FmtSpan::EXIT)
    } else {
        fmt_layer
    };

    let fmt_layer = if config.file_line {
        fmt_layer.with_file(true).with_line_number(true)
    } else {
        fmt_layer.with_file(false).with_line_number(false)
    };

    match config.output {
        LogOutput::Stderr => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(std::io::stderr))
                .try_init()
                .map_err(|e| CorelinkError::internal(format!("Failed to init logging: {}", e)))?;
        }
        LogOutput::File => {
            let file = open_log_file()?;
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(file).with_ansi(false))
                .try_init()
                .map_err(|e| CorelinkError::internal(format!("Failed to init logging: {}", e)))?;
        }
        LogOutput::Both => {
            let file = open_log_file()?;
            let file_layer = fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer.with_writer(std::io::stderr))
                .with(file_layer)
                .try_init()
                .map_err(|e| CorelinkError::internal(format!("Failed to init logging: {}", e)))?;
        }
    }

    Ok(())
}

fn open_log_file() -> Result<std::fs::File> {
    let log_dir = paths::log_dir();
    std::fs::create_dir_all(&log_dir)?;

    let log_path = log_dir.join("corelink.log");
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;
    Ok(file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_defaults() {
        let config = LogConfig::default();
        assert_eq!(config.output, LogOutput::Stderr);
        assert_eq!(config.filter, "info");
    }

    #[test]
    fn test_log_config_client() {
        let config = LogConfig::client();
        assert_eq!(config.output, LogOutput::Stderr);
    }

    #[test]
    fn test_log_config_daemon() {
        let config = LogConfig::daemon();
        assert_eq!(config.output, LogOutput::File);
        assert!(config.file_line);
    }

    #[test]
    fn test_log_config_development() {
        let config = LogConfig::development();
        assert_eq!(config.filter, "debug");
        assert!(config.span_events);
    }
}
