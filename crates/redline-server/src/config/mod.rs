//! Server config: flags/env (clap), optional strict YAML file, validation.

pub mod cli;
pub mod schema;
pub mod settings;

use std::fs;
use std::path::Path;

use redline_core::error::{RedlineError, Result};

pub use cli::Cli;
pub use schema::{FileConfig, ListenerSection, LogSection};
pub use settings::{LogFormat, LogLevel, LogSettings, ServerOptions, Settings};

pub fn load_from_file(path: &Path) -> Result<FileConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| RedlineError::Config(format!("read config {} failed: {e}", path.display())))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<FileConfig> {
    let cfg: FileConfig = serde_yaml::from_str(s)
        .map_err(|e| RedlineError::Config(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}
