use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_error::ErrorLayer;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Logs to stdout and to `log_file`. Keep the returned guard alive until
/// exit or buffered file lines are lost.
pub fn init_logger(log_level: String, log_file: String) -> Result<WorkerGuard> {
    let filter = EnvFilter::try_new(&log_level)
        .with_context(|| format!("invalid log level `{}`", log_level))?;

    let path = Path::new(&log_file);
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let file_name = path
        .file_name()
        .with_context(|| format!("log file `{}` has no file name", log_file))?;
    let appender = tracing_appender::rolling::never(dir, file_name);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let stdout_layer = fmt::layer()
        .with_timer(LocalTime::rfc_3339())
        .with_target(false);
    let file_layer = fmt::layer()
        .with_timer(LocalTime::rfc_3339())
        .with_ansi(false)
        .with_writer(file_writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .with(ErrorLayer::default())
        .try_init()
        .context("failed to install tracing subscriber")?;

    Ok(guard)
}
