//! Tracing subscriber setup.
//!
//! Console output goes to stderr so command output on stdout stays clean.
//! When a log directory is configured, JSON lines are also written to a
//! daily-rotated `specpilot.log` there.

use anyhow::{Context, Result};
use std::io;
use std::path::Path;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use crate::config::{LogFormat, LoggingSection};

/// Install the global subscriber.
///
/// `RUST_LOG` overrides `level`. The returned guard must live until exit or
/// buffered file output is lost.
pub fn init_logging(
    section: &LoggingSection,
    log_dir: Option<&Path>,
    verbose: bool,
) -> Result<Option<WorkerGuard>> {
    let level = if verbose {
        Level::DEBUG
    } else {
        parse_log_level(&section.level)?
    };

    let env_filter = || {
        EnvFilter::builder()
            .with_default_directive(level.into())
            .from_env_lossy()
    };

    let console_layer = match section.format {
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_current_span(true)
            .with_target(true)
            .with_filter(env_filter())
            .boxed(),
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_writer(io::stderr)
            .with_target(false)
            .compact()
            .with_filter(env_filter())
            .boxed(),
    };

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "specpilot.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_current_span(true)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .with_filter(env_filter())
                .boxed();
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    tracing::debug!(
        level = %level,
        format = ?section.format,
        file_output = log_dir.is_some(),
        "logger initialized"
    );

    Ok(guard)
}

pub fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!("Invalid log level: {level}"),
    }
}
