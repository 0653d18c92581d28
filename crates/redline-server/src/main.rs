//! redline server
//!
//! - App listener: GET /hello, POST /api/message
//! - Metrics listener: GET /metrics (Prometheus / OpenMetrics)
//! - Layered config: flags > env > YAML file > defaults
//! - Graceful drain of both listeners on SIGINT/SIGTERM

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use redline_server::app_state::AppState;
use redline_server::config::{Cli, Settings};
use redline_server::obs::{logging, Registry};
use redline_server::transport::{shutdown_signal, Servers, SHUTDOWN_DEADLINE};

#[tokio::main]
async fn main() -> ExitCode {
    let settings = match Settings::resolve(Cli::parse()) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("redline: {e}");
            return ExitCode::from(2);
        }
    };

    if let Err(e) = logging::init(&settings.log) {
        eprintln!("redline: {e}");
        return ExitCode::FAILURE;
    }

    let state = AppState::new(Arc::new(Registry::new()));
    let servers = match Servers::start(&settings, state).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(code = e.client_code().as_str(), error = %e, "startup failed");
            return ExitCode::FAILURE;
        }
    };

    let signal = async {
        if let Err(e) = shutdown_signal().await {
            tracing::error!(error = %e, "signal handler unavailable; shutting down");
        }
    };

    let errors = servers.run_until(signal, SHUTDOWN_DEADLINE).await;
    if errors.is_empty() {
        tracing::info!("servers stopped cleanly");
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
