//! Tracing subscriber setup.

use std::fs::OpenOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::config::LoggingConfig;
use crate::error::{Result, ServiceError};

/// Where log lines go when no log file is configured
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    /// Drop everything; the dashboard owns the terminal
    Discard,
}

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
pub fn init(config: &LoggingConfig, target: LogTarget) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let (writer, ansi) = match (&config.file, target) {
        (Some(path), _) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            (BoxMakeWriter::new(Arc::new(file)), false)
        }
        (None, LogTarget::Stderr) => (
            BoxMakeWriter::new(std::io::stderr),
            config.colored && atty::is(atty::Stream::Stderr),
        ),
        (None, LogTarget::Discard) => (BoxMakeWriter::new(std::io::sink), false),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(false);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.with_ansi(ansi).try_init()
    };

    installed.map_err(|e| ServiceError::InitializationError(format!("logging: {e}")).into())
}
