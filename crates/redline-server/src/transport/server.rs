//! Listener lifecycle: bind, serve, drain.
//!
//! Each listener runs its accept loop on its own task and owns its connection
//! tasks in a `JoinSet`. Connections are served by hyper's HTTP/1 engine with
//! a header-read timeout and a keep-alive idle timeout; on shutdown every
//! connection is asked to close gracefully, in-flight requests finish, and the
//! accept task exits. If the drain outlives the deadline the accept task is
//! aborted, which drops (and thereby aborts) whatever connections remain.
//!
//! State per listener:
//! `Created → Listening → Draining → Stopped | TimedOut`, or `Listening → Failed`.

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{body::Body, extract::ConnectInfo, Router};
use hyper::{body::Incoming, server::conn::http1, service::service_fn, Request};
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tower::ServiceExt;

use redline_core::error::{RedlineError, Result};

use crate::config::ServerOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleState {
    Created,
    Listening,
    Draining,
    Stopped,
    TimedOut,
    Failed(String),
}

/// Transport-level knobs applied per connection.
#[derive(Debug, Clone, Copy)]
struct ConnOptions {
    header_read_timeout: Option<Duration>,
    idle_timeout: Option<Duration>,
}

/// Handle to one running listener. `shutdown` consumes it, so a listener can
/// only be drained once.
pub struct ServerHandle {
    name: String,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    state_tx: Arc<watch::Sender<LifecycleState>>,
    state_rx: watch::Receiver<LifecycleState>,
    task: JoinHandle<()>,
}

/// Bind `opts.addr()` and start serving `router` on it.
pub async fn serve(name: &str, opts: &ServerOptions, router: Router) -> Result<ServerHandle> {
    let addr = opts.addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| RedlineError::Bind { addr: addr.clone(), source })?;
    serve_listener(name, listener, opts, router)
}

/// Start serving on an already-bound listener. Must be called inside a Tokio runtime.
pub fn serve_listener(
    name: &str,
    listener: TcpListener,
    opts: &ServerOptions,
    router: Router,
) -> Result<ServerHandle> {
    let local_addr = listener
        .local_addr()
        .map_err(|e| RedlineError::Serve(format!("{name}: local_addr failed: {e}")))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (state_tx, state_rx) = watch::channel(LifecycleState::Created);
    let state_tx = Arc::new(state_tx);
    let conn = ConnOptions {
        header_read_timeout: opts.read_header_timeout(),
        idle_timeout: opts.idle_timeout(),
    };

    let task = tokio::spawn(accept_loop(
        name.to_string(),
        listener,
        router,
        conn,
        shutdown_rx,
        Arc::clone(&state_tx),
    ));

    Ok(ServerHandle {
        name: name.to_string(),
        local_addr,
        shutdown_tx,
        state_tx,
        state_rx,
        task,
    })
}

impl ServerHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn state(&self) -> LifecycleState {
        self.state_rx.borrow().clone()
    }

    /// State watcher that outlives the handle, e.g. to observe the end state of `shutdown`.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state_rx.clone()
    }

    #[cfg(test)]
    pub(crate) fn mark_failed(&self, reason: &str) {
        self.state_tx.send_replace(LifecycleState::Failed(reason.to_string()));
    }

    /// Resolves once the listener has failed; pending forever otherwise.
    pub async fn failed(&self) -> RedlineError {
        let mut rx = self.state_rx.clone();
        loop {
            let reason = match &*rx.borrow_and_update() {
                LifecycleState::Failed(reason) => Some(reason.clone()),
                _ => None,
            };
            if let Some(reason) = reason {
                return RedlineError::Serve(format!("{} server failed: {reason}", self.name));
            }
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }

    /// Stop accepting, let in-flight requests finish, and wait up to `deadline`.
    pub async fn shutdown(self, deadline: Duration) -> Result<()> {
        let ServerHandle { name, shutdown_tx, state_tx, mut task, .. } = self;

        let failed = match &*state_tx.borrow() {
            LifecycleState::Failed(reason) => Some(reason.clone()),
            _ => None,
        };
        if let Some(reason) = failed {
            task.abort();
            return Err(RedlineError::Serve(format!("{name} server failed: {reason}")));
        }

        state_tx.send_replace(LifecycleState::Draining);
        let _ = shutdown_tx.send(true);

        match tokio::time::timeout(deadline, &mut task).await {
            Ok(Ok(())) => {
                state_tx.send_replace(LifecycleState::Stopped);
                tracing::info!(server = %name, "server stopped");
                Ok(())
            }
            Ok(Err(join_err)) => {
                let reason = join_err.to_string();
                state_tx.send_replace(LifecycleState::Failed(reason.clone()));
                Err(RedlineError::Serve(format!("{name} server task ended abnormally: {reason}")))
            }
            Err(_) => {
                task.abort();
                state_tx.send_replace(LifecycleState::TimedOut);
                tracing::warn!(server = %name, ?deadline, "drain deadline exceeded; abandoning connections");
                Err(RedlineError::ShutdownTimedOut { server: name, deadline })
            }
        }
    }
}

/// Per-connection request activity, used for the keep-alive idle timeout.
struct Activity {
    origin: Instant,
    last_ms: AtomicU64,
    inflight: AtomicUsize,
}

struct ActivityGuard(Arc<Activity>);

impl Activity {
    fn new() -> Self {
        Self { origin: Instant::now(), last_ms: AtomicU64::new(0), inflight: AtomicUsize::new(0) }
    }

    fn touch(&self) {
        self.last_ms.store(self.origin.elapsed().as_millis() as u64, Ordering::Relaxed);
    }

    fn begin(self: &Arc<Self>) -> ActivityGuard {
        self.inflight.fetch_add(1, Ordering::SeqCst);
        self.touch();
        ActivityGuard(Arc::clone(self))
    }

    fn since_last(&self) -> Duration {
        let last = Duration::from_millis(self.last_ms.load(Ordering::Relaxed));
        self.origin.elapsed().saturating_sub(last)
    }

    /// Resolves once no request is in flight and none arrived for `idle`.
    async fn idle_for(&self, idle: Duration) {
        loop {
            let since = self.since_last();
            if self.inflight.load(Ordering::SeqCst) == 0 && since >= idle {
                return;
            }
            let wait = idle.checked_sub(since).filter(|d| !d.is_zero()).unwrap_or(idle);
            tokio::time::sleep(wait).await;
        }
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.0.touch();
        self.0.inflight.fetch_sub(1, Ordering::SeqCst);
    }
}

const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(10);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(1);

/// Accept errors tied to a single peer; the listener itself is still healthy.
fn is_connection_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
    )
}

/// Errors that mean the listening socket itself is unusable. Anything else
/// (fd exhaustion, ENOBUFS, ENOMEM) clears up on its own and is retried.
fn is_fatal_accept_error(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::InvalidInput | io::ErrorKind::NotFound | io::ErrorKind::Unsupported
    )
}

async fn accept_loop(
    name: String,
    listener: TcpListener,
    router: Router,
    conn: ConnOptions,
    mut shutdown: watch::Receiver<bool>,
    state: Arc<watch::Sender<LifecycleState>>,
) {
    // a shutdown that raced ahead of this task keeps its Draining state
    state.send_if_modified(|s| {
        if *s == LifecycleState::Created {
            *s = LifecycleState::Listening;
            true
        } else {
            false
        }
    });
    if let Ok(addr) = listener.local_addr() {
        tracing::info!(server = %name, %addr, "server listening");
    }

    let mut connections = JoinSet::new();
    let mut backoff = ACCEPT_BACKOFF_MIN;
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, remote)) => {
                    backoff = ACCEPT_BACKOFF_MIN;
                    connections.spawn(serve_connection(stream, remote, router.clone(), conn, shutdown.clone()));
                }
                Err(e) if is_connection_error(&e) => {
                    tracing::debug!(server = %name, error = %e, "accept: peer error");
                }
                Err(e) if is_fatal_accept_error(&e) => {
                    tracing::error!(server = %name, error = %e, "accept failed; listener is down");
                    state.send_replace(LifecycleState::Failed(e.to_string()));
                    return;
                }
                Err(e) => {
                    tracing::warn!(server = %name, error = %e, ?backoff, "accept failed; backing off");
                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = shutdown.changed() => break,
                    }
                    backoff = (backoff * 2).min(ACCEPT_BACKOFF_MAX);
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = shutdown.changed() => break,
        }
    }

    drop(listener);
    tracing::info!(server = %name, active = connections.len(), "draining connections");
    while connections.join_next().await.is_some() {}
}

async fn serve_connection(
    stream: TcpStream,
    remote: SocketAddr,
    router: Router,
    opts: ConnOptions,
    mut shutdown: watch::Receiver<bool>,
) {
    let activity = Arc::new(Activity::new());
    let svc_activity = Arc::clone(&activity);
    let service = service_fn(move |mut req: Request<Incoming>| {
        req.extensions_mut().insert(ConnectInfo(remote));
        let router = router.clone();
        let guard = svc_activity.begin();
        async move {
            let response = router.oneshot(req.map(Body::new)).await;
            drop(guard);
            response
        }
    });

    let mut builder = http1::Builder::new();
    // `None` must be passed through, otherwise hyper falls back to its 30s default
    builder.timer(TokioTimer::new()).header_read_timeout(opts.header_read_timeout);
    let conn = builder.serve_connection(TokioIo::new(stream), service);
    tokio::pin!(conn);

    let mut closing = false;
    loop {
        tokio::select! {
            res = conn.as_mut() => {
                if let Err(e) = res {
                    tracing::debug!(%remote, error = %e, "connection closed with error");
                }
                break;
            }
            _ = shutdown.changed(), if !closing => {
                closing = true;
                conn.as_mut().graceful_shutdown();
            }
            _ = activity.idle_for(opts.idle_timeout.unwrap_or_default()), if !closing && opts.idle_timeout.is_some() => {
                tracing::debug!(%remote, "idle timeout; closing keep-alive connection");
                closing = true;
                conn.as_mut().graceful_shutdown();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn resource_exhaustion_is_retried() {
        // EMFILE, ENFILE, ENOBUFS, ENOMEM
        for errno in [24, 23, 105, 12] {
            let e = io::Error::from_raw_os_error(errno);
            assert!(!is_fatal_accept_error(&e), "{e}");
            assert!(!is_connection_error(&e), "{e}");
        }
    }

    #[test]
    fn peer_errors_are_skipped() {
        let e = io::Error::from(io::ErrorKind::ConnectionAborted);
        assert!(is_connection_error(&e));
        assert!(!is_fatal_accept_error(&e));
    }

    #[test]
    fn unusable_socket_is_fatal() {
        assert!(is_fatal_accept_error(&io::Error::from(io::ErrorKind::InvalidInput)));
    }

    #[tokio::test]
    async fn backoff_does_not_block_shutdown() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let opts = ServerOptions::new("127.0.0.1", 8080).unwrap();
        let handle = serve_listener("app", listener, &opts, Router::new()).unwrap();
        handle.shutdown(Duration::from_secs(1)).await.unwrap();
    }
}
