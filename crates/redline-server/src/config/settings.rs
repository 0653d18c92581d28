//! Resolved, validated runtime settings.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use redline_core::error::{RedlineError, Result};

use super::cli::Cli;
use super::schema::{FileConfig, ListenerSection, LogSection};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_HTTP_PORT: u32 = 8080;
pub const DEFAULT_METRICS_PORT: u32 = 9090;
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Immutable listener configuration. A zero timeout disables that timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerOptions {
    host: String,
    port: u16,
    read_header_timeout: Duration,
    read_timeout: Duration,
    handler_timeout: Duration,
    idle_timeout: Duration,
}

fn non_zero(d: Duration) -> Option<Duration> {
    (!d.is_zero()).then_some(d)
}

impl ServerOptions {
    /// Validate host/port; every timeout starts at the 1s default.
    pub fn new(host: impl Into<String>, port: u32) -> Result<Self> {
        let host = host.into().trim().to_string();
        if host.is_empty() {
            return Err(RedlineError::Config("host must not be empty".into()));
        }
        let port = match u16::try_from(port) {
            Ok(p) if p != 0 => p,
            _ => {
                return Err(RedlineError::Config(format!(
                    "invalid port {port}: must be between 1 and 65535"
                )))
            }
        };
        let default = Duration::from_millis(DEFAULT_TIMEOUT_MS);
        Ok(Self {
            host,
            port,
            read_header_timeout: default,
            read_timeout: default,
            handler_timeout: default,
            idle_timeout: default,
        })
    }

    pub fn with_read_header_timeout(mut self, d: Duration) -> Self {
        self.read_header_timeout = d;
        self
    }

    pub fn with_read_timeout(mut self, d: Duration) -> Self {
        self.read_timeout = d;
        self
    }

    pub fn with_handler_timeout(mut self, d: Duration) -> Self {
        self.handler_timeout = d;
        self
    }

    pub fn with_idle_timeout(mut self, d: Duration) -> Self {
        self.idle_timeout = d;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, bracketing IPv6 literals.
    pub fn addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn read_header_timeout(&self) -> Option<Duration> {
        non_zero(self.read_header_timeout)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        non_zero(self.read_timeout)
    }

    pub fn handler_timeout(&self) -> Option<Duration> {
        non_zero(self.handler_timeout)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        non_zero(self.idle_timeout)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = RedlineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(RedlineError::Config(format!("invalid log level: {other}"))),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

impl FromStr for LogFormat {
    type Err = RedlineError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "json" => Ok(LogFormat::Json),
            "pretty" => Ok(LogFormat::Pretty),
            other => Err(RedlineError::Config(format!("invalid log format: {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LogLevel,
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub http: ServerOptions,
    pub metrics: ServerOptions,
    pub log: LogSettings,
}

fn parse_port(s: &str) -> Result<u32> {
    s.trim()
        .parse::<u32>()
        .map_err(|_| RedlineError::Config(format!("invalid port {s:?}")))
}

/// Flag/env value first, then the file section, then the default.
fn build_listener(
    name: &str,
    cli: ListenerSection,
    file: ListenerSection,
    default_port: u32,
) -> Result<ServerOptions> {
    let ms = |a: Option<u64>, b: Option<u64>| Duration::from_millis(a.or(b).unwrap_or(DEFAULT_TIMEOUT_MS));
    let host = cli.host.or(file.host).unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = cli.port.or(file.port).unwrap_or(default_port);

    let opts = ServerOptions::new(host, port).map_err(|e| match e {
        RedlineError::Config(m) => RedlineError::Config(format!("{name} server: {m}")),
        other => other,
    })?;
    Ok(opts
        .with_read_header_timeout(ms(cli.read_header_timeout_ms, file.read_header_timeout_ms))
        .with_read_timeout(ms(cli.read_timeout_ms, file.read_timeout_ms))
        .with_handler_timeout(ms(cli.handler_timeout_ms, file.handler_timeout_ms))
        .with_idle_timeout(ms(cli.idle_timeout_ms, file.idle_timeout_ms)))
}

impl Settings {
    /// Merge flags/env with the optional config file and validate the result.
    pub fn resolve(cli: Cli) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => Some(super::load_from_file(path)?),
            None => None,
        };
        Self::merge(cli, file)
    }

    pub fn merge(cli: Cli, file: Option<FileConfig>) -> Result<Self> {
        let (file_log, file_http, file_metrics) = match file {
            Some(f) => (f.log, f.http, f.metrics),
            None => Default::default(),
        };

        let http_cli = ListenerSection {
            host: cli.http_host,
            port: cli.http_port.as_deref().map(parse_port).transpose()?,
            read_header_timeout_ms: cli.http_read_header_timeout,
            read_timeout_ms: cli.http_read_timeout,
            handler_timeout_ms: cli.http_timeout_handler,
            idle_timeout_ms: cli.http_idle_timeout,
        };
        let metrics_cli = ListenerSection {
            host: cli.metrics_host,
            port: cli.metrics_port.as_deref().map(parse_port).transpose()?,
            read_header_timeout_ms: cli.metrics_read_header_timeout,
            read_timeout_ms: cli.metrics_read_timeout,
            handler_timeout_ms: cli.metrics_timeout_handler,
            idle_timeout_ms: cli.metrics_idle_timeout,
        };

        let LogSection { level, format } = file_log;
        let log = LogSettings {
            level: cli.log_level.or(level).as_deref().unwrap_or("info").parse()?,
            format: cli.log_format.or(format).as_deref().unwrap_or("json").parse()?,
        };

        Ok(Self {
            http: build_listener("http", http_cli, file_http, DEFAULT_HTTP_PORT)?,
            metrics: build_listener("metrics", metrics_cli, file_metrics, DEFAULT_METRICS_PORT)?,
            log,
        })
    }
}
