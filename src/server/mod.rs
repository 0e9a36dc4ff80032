//! HTTP server for sidecar requests
//!
//! - `handler` - axum routes
//! - `orchestrator` - the resolve-then-execute sequence behind `/iptables`
//! - `locks` - optional per-pod serialization
//!
//! # Accept loop
//!
//! ```text
//! TcpListener::accept ─┬─► Ok ──────────────► spawn connection task (hyper auto: h1/h2)
//!                      ├─► transient error ─► back off 5ms..1s, accept again
//!                      └─► fatal error ─────► stop serving, SIGTERM to self
//! shutdown future ─────► stop accepting, let open connections finish
//! ```
//!
//! A listener that dies outside shutdown leaves a pod that can no longer
//! serve requests, so the agent signals itself and lets the DaemonSet
//! controller restart it.

pub mod handler;
pub mod locks;
pub mod orchestrator;

pub use handler::{create_router, AppState};
pub use locks::PodLocks;
pub use orchestrator::Orchestrator;

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use hyper_util::service::TowerToHyperService;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::AgentConfig;

const MIN_ACCEPT_BACKOFF: Duration = Duration::from_millis(5);
const MAX_ACCEPT_BACKOFF: Duration = Duration::from_secs(1);

/// Serve until `shutdown` resolves
///
/// # Arguments
/// * `config` - Supplies the listen address
/// * `orchestrator` - Handles each `/iptables` request
/// * `shutdown` - Resolves when the agent should stop accepting requests
pub async fn run(
    config: &AgentConfig,
    orchestrator: Arc<Orchestrator>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> io::Result<()> {
    let addr = config.socket_addr();
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        error!(addr = %addr, error = %e, "Error listening on port");
        e
    })?;
    info!(addr = %addr, "Starting node agent");

    let app = create_router(AppState { orchestrator });

    match serve(listener, app, shutdown).await {
        Ok(()) => {
            info!("Node agent has successfully terminated");
            Ok(())
        }
        Err(e) => {
            // serve only errors while still accepting, never during shutdown
            error!(error = %e, "Listener failed");
            notify_exit();
            Err(e)
        }
    }
}

/// Accept connections on `listener` and route them through `app`
///
/// Returns `Ok` once `shutdown` resolves and every open connection has
/// finished, or `Err` with the first accept error that is not transient.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()>,
) -> io::Result<()> {
    // Dropping signal_tx asks connections to wind down; close_tx.closed()
    // resolves once every connection task has dropped its close_rx.
    let (signal_tx, signal_rx) = watch::channel(());
    let (close_tx, close_rx) = watch::channel(());
    tokio::pin!(shutdown);

    let mut backoff: Option<Duration> = None;

    let result = loop {
        let accepted = tokio::select! {
            _ = &mut shutdown => break Ok(()),
            accepted = listener.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(conn) => {
                backoff = None;
                conn
            }
            Err(e) if is_transient(&e) => {
                let delay = next_backoff(backoff);
                backoff = Some(delay);
                warn!(error = %e, retry_in_ms = delay.as_millis() as u64, "Accept error; retrying");
                tokio::select! {
                    _ = &mut shutdown => break Ok(()),
                    _ = tokio::time::sleep(delay) => continue,
                }
            }
            Err(e) => break Err(e),
        };

        spawn_connection(stream, peer, app.clone(), signal_rx.clone(), close_rx.clone());
    };

    drop(signal_tx);
    drop(signal_rx);
    drop(close_rx);
    drop(listener);

    if result.is_ok() {
        debug!(open = close_tx.receiver_count(), "Waiting for open connections");
        close_tx.closed().await;
    }
    result
}

fn spawn_connection(
    stream: TcpStream,
    peer: SocketAddr,
    app: Router,
    mut signal_rx: watch::Receiver<()>,
    close_rx: watch::Receiver<()>,
) {
    tokio::spawn(async move {
        let builder = auto::Builder::new(TokioExecutor::new());
        let conn = builder.serve_connection_with_upgrades(
            TokioIo::new(stream),
            TowerToHyperService::new(app),
        );
        tokio::pin!(conn);

        let mut draining = false;
        loop {
            tokio::select! {
                result = conn.as_mut() => {
                    if let Err(e) = result {
                        debug!(peer = %peer, error = %e, "Connection closed with error");
                    }
                    break;
                }
                _ = signal_rx.changed(), if !draining => {
                    draining = true;
                    conn.as_mut().graceful_shutdown();
                }
            }
        }

        drop(close_rx);
    });
}

/// Errors after which the listener is still usable
fn is_transient(e: &io::Error) -> bool {
    use io::ErrorKind::*;

    if matches!(
        e.kind(),
        ConnectionAborted | ConnectionReset | ConnectionRefused | Interrupted | WouldBlock | TimedOut
    ) {
        return true;
    }

    // Descriptor or memory exhaustion clears once connections close
    matches!(
        e.raw_os_error().map(Errno::from_i32),
        Some(Errno::EMFILE | Errno::ENFILE | Errno::ENOBUFS | Errno::ENOMEM)
    )
}

fn next_backoff(current: Option<Duration>) -> Duration {
    match current {
        None => MIN_ACCEPT_BACKOFF,
        Some(d) => (d * 2).min(MAX_ACCEPT_BACKOFF),
    }
}

/// Send SIGTERM to ourselves so the supervisor restarts the agent
pub fn notify_exit() {
    if let Err(e) = kill(Pid::this(), Signal::SIGTERM) {
        error!(error = %e, "failed to send SIGTERM to self");
    }
}
