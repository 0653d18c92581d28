//! Global `tracing` subscriber setup.
//!
//! The configured level becomes the default directive; `RUST_LOG`, when set,
//! may refine it per target.

use tracing::level_filters::LevelFilter;
use tracing_subscriber::{fmt, EnvFilter};

use redline_core::error::{RedlineError, Result};

use crate::config::{LogFormat, LogLevel, LogSettings};

fn level_filter(level: LogLevel) -> LevelFilter {
    match level {
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Error => LevelFilter::ERROR,
    }
}

pub fn init(settings: &LogSettings) -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(level_filter(settings.level).into())
        .from_env_lossy();

    let installed = match settings.format {
        LogFormat::Json => fmt().with_env_filter(filter).json().with_current_span(true).try_init(),
        LogFormat::Pretty => fmt().with_env_filter(filter).try_init(),
    };
    installed.map_err(|e| RedlineError::Internal(format!("logger init failed: {e}")))?;

    tracing::info!(level = %settings.level, "logger initialized");
    Ok(())
}
