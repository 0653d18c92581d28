//! Two-listener coordinator: app server + metrics server.
//!
//! Both listeners share one registry but nothing else. On a termination signal
//! (or if either listener fails) both are drained concurrently under the same
//! deadline, and every error is collected rather than aborting on the first.

use std::future::Future;
use std::time::Duration;

use redline_core::error::RedlineError;

use crate::app_state::AppState;
use crate::config::Settings;
use crate::router::{build_app_router, build_metrics_router};
use crate::transport::server::{serve, ServerHandle};

/// Overall drain deadline applied to both listeners.
pub const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(5);

pub struct Servers {
    pub app: ServerHandle,
    pub metrics: ServerHandle,
}

impl Servers {
    /// Bind and start both listeners. If the metrics listener cannot bind, the
    /// already-running app listener is drained before the error is returned.
    pub async fn start(settings: &Settings, state: AppState) -> Result<Self, RedlineError> {
        let app = serve("app", &settings.http, build_app_router(state.clone(), &settings.http)).await?;
        let metrics = match serve(
            "metrics",
            &settings.metrics,
            build_metrics_router(state, &settings.metrics),
        )
        .await
        {
            Ok(m) => m,
            Err(e) => {
                if let Err(drain) = app.shutdown(SHUTDOWN_DEADLINE).await {
                    tracing::error!(error = %drain, "app server shutdown after metrics bind failure");
                }
                return Err(e);
            }
        };
        Ok(Self { app, metrics })
    }

    /// Serve until `signal` resolves or a listener fails, then drain both.
    /// Returns every shutdown error; empty means a clean stop.
    pub async fn run_until<F>(self, signal: F, deadline: Duration) -> Vec<RedlineError>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            _ = signal => tracing::info!("shutting down gracefully"),
            e = self.app.failed() => tracing::error!(error = %e, "app server failed; shutting down"),
            e = self.metrics.failed() => tracing::error!(error = %e, "metrics server failed; shutting down"),
        }

        let (app, metrics) = tokio::join!(self.app.shutdown(deadline), self.metrics.shutdown(deadline));
        let errors: Vec<RedlineError> = [app.err(), metrics.err()].into_iter().flatten().collect();
        for e in &errors {
            tracing::error!(code = e.client_code().as_str(), error = %e, "shutdown error");
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;
    use crate::config::ServerOptions;
    use crate::transport::server::serve_listener;

    async fn handle(name: &str) -> ServerHandle {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let opts = ServerOptions::new("127.0.0.1", 8080).unwrap();
        serve_listener(name, listener, &opts, axum::Router::new()).unwrap()
    }

    #[tokio::test]
    async fn listener_failure_stops_both() {
        let servers = Servers { app: handle("app").await, metrics: handle("metrics").await };
        let metrics_addr = servers.metrics.local_addr();
        servers.app.mark_failed("accept: socket closed");

        let errors = tokio::time::timeout(
            Duration::from_secs(5),
            servers.run_until(std::future::pending(), Duration::from_secs(1)),
        )
        .await
        .expect("a failed listener must end the run");

        assert_eq!(errors.len(), 1, "{errors:?}");
        assert_eq!(errors[0].client_code().as_str(), "SERVE");
        assert!(errors[0].to_string().contains("app server failed"), "{}", errors[0]);
        assert!(tokio::net::TcpStream::connect(metrics_addr).await.is_err());
    }
}
