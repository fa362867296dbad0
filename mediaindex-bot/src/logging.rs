//! Tracing setup: stderr plus a plain-text copy in `LOG_FILE` for `/log`.

use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub const DEFAULT_FILTER: &str = "mediaindex_bot=info,mediaindex_sdk=info";

/// Install the global subscriber. Keep the returned guard alive for the
/// life of the process so buffered file output is flushed.
pub fn init(log_file: &Path) -> Result<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let json = std::env::var("MEDIAINDEX_LOG_JSON").is_ok_and(|v| v == "1");

    let dir = match log_file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let name = log_file
        .file_name()
        .and_then(|n| n.to_str())
        .context("LOG_FILE has no file name")?;
    std::fs::create_dir_all(dir).with_context(|| format!("Cannot create {}", dir.display()))?;
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(name)
        .build(dir)
        .with_context(|| format!("Cannot open log file {}", log_file.display()))?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| fmt::layer().with_target(true).with_writer(std::io::stderr)))
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .try_init()
        .context("Tracing subscriber already installed")?;
    Ok(guard)
}
