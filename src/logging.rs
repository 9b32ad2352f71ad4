//! `tracing` subscriber setup for the CLI.

use crate::config::{LogFormat, LoggingConfig};
use std::fs::File;
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Filter directive for the configured level, raised by `-v` flags.
pub fn filter_directive(level: &str, verbosity: u8) -> String {
    match verbosity {
        0 => level.to_string(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over config.
pub fn init(config: &LoggingConfig, verbosity: u8) -> std::io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::try_new(filter_directive(&config.level, verbosity))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    });

    let writer = match &config.file {
        Some(path) => BoxMakeWriter::new(Mutex::new(File::create(path)?)),
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(config.file.is_none());

    let installed = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
    };
    installed.map_err(std::io::Error::other)
}
