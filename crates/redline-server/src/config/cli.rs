//! Command-line flags. Every flag falls back to an environment variable; values
//! left unset fall through to the config file and then to built-in defaults.

use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Default, Parser)]
#[command(name = "redline-server", version, about = "Demo HTTP service with RED metrics")]
pub struct Cli {
    /// Optional YAML config file.
    #[arg(long, env = "REDLINE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Host for the application server.
    #[arg(long = "http-host", env = "HTTP_HOST")]
    pub http_host: Option<String>,
    /// Port for the application server.
    #[arg(long = "http-port", env = "HTTP_PORT")]
    pub http_port: Option<String>,
    /// Max time (ms) to read the request headers.
    #[arg(long = "http-read-header-timeout", env = "HTTP_READ_HEADER_TIMEOUT")]
    pub http_read_header_timeout: Option<u64>,
    /// Max time (ms) to read the entire request.
    #[arg(long = "http-read-timeout", env = "HTTP_READ_TIMEOUT")]
    pub http_read_timeout: Option<u64>,
    /// Max time (ms) for a handler to complete.
    #[arg(long = "http-timeout-handler", env = "HTTP_TIMEOUT_HANDLER")]
    pub http_timeout_handler: Option<u64>,
    /// Max time (ms) to wait for the next request on a keep-alive connection.
    #[arg(long = "http-idle-timeout", env = "HTTP_IDLE_TIMEOUT")]
    pub http_idle_timeout: Option<u64>,

    /// Host for the metrics server.
    #[arg(long = "metrics-host", env = "METRICS_HOST")]
    pub metrics_host: Option<String>,
    /// Port for the metrics server.
    #[arg(long = "metrics-port", env = "METRICS_PORT")]
    pub metrics_port: Option<String>,
    #[arg(long = "metrics-read-header-timeout", env = "METRICS_READ_HEADER_TIMEOUT")]
    pub metrics_read_header_timeout: Option<u64>,
    #[arg(long = "metrics-read-timeout", env = "METRICS_READ_TIMEOUT")]
    pub metrics_read_timeout: Option<u64>,
    #[arg(long = "metrics-timeout-handler", env = "METRICS_TIMEOUT_HANDLER")]
    pub metrics_timeout_handler: Option<u64>,
    #[arg(long = "metrics-idle-timeout", env = "METRICS_IDLE_TIMEOUT")]
    pub metrics_idle_timeout: Option<u64>,

    /// Logging level (debug, info, warn, error).
    #[arg(long = "log-level", env = "LOG_LEVEL")]
    pub log_level: Option<String>,
    /// Log output format (json, pretty).
    #[arg(long = "log-format", env = "LOG_FORMAT")]
    pub log_format: Option<String>,
}
