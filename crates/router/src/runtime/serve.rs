//! Serve: accept record connections and run the monitor API until shutdown.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore};
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::conf::RouterConfig;
use crate::monitor::serve_monitor;
use crate::runtime::conn::handle_connection;
use crate::runtime::stop::shutdown_signal;
use crate::state::SharedState;

/// Pause after a failed accept (e.g. EMFILE) before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Bind the listeners and serve until Ctrl+C / SIGTERM.
pub async fn serve(state: SharedState, config: RouterConfig) -> anyhow::Result<()> {
    let addr: SocketAddr = config
        .bind_address
        .parse()
        .with_context(|| format!("Invalid bind address '{}'", config.bind_address))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind record listener on {}", addr))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let monitor = if config.monitor.enabled {
        let monitor_addr: SocketAddr = config
            .monitor
            .bind_address
            .parse()
            .with_context(|| format!("Invalid monitor address '{}'", config.monitor.bind_address))?;
        let monitor_listener = TcpListener::bind(monitor_addr)
            .await
            .with_context(|| format!("Failed to bind monitor API on {}", monitor_addr))?;
        info!("✓ Monitor API on http://{}", monitor_addr);
        Some(tokio::spawn(serve_monitor(
            monitor_listener,
            Arc::clone(&state),
            shutdown_rx.clone(),
        )))
    } else {
        info!("Monitor API disabled");
        None
    };

    info!("");
    info!("========================================");
    info!("Log Router is ready!");
    info!("Listening on: {} (newline-delimited JSON)", addr);
    info!("Forwarding to: {} ({})", state.sink.destination(), state.sink.name());
    info!("Max connections: {}", config.max_connections);
    info!("Press Ctrl+C to shutdown gracefully");
    info!("========================================");
    info!("");

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    run_listener(listener, Arc::clone(&state), shutdown_rx).await;

    if let Some(handle) = monitor {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Monitor API error: {}", e),
            Err(e) => error!("Monitor API task failed: {}", e),
        }
    }

    let snap = state.metrics.snapshot();
    info!(
        received = snap.records.received,
        delivered = snap.delivery.delivered,
        failed = snap.delivery.failed,
        "Router shutdown complete"
    );
    Ok(())
}

/// Accept connections until `shutdown` flips to `true`, then wait up to
/// `shutdown_grace_secs` for open connections to finish.
///
/// Connections past `max_connections` are closed as soon as they are
/// accepted.
pub async fn run_listener(
    listener: TcpListener,
    state: SharedState,
    shutdown: watch::Receiver<bool>,
) {
    let slots = Arc::new(Semaphore::new(state.config.max_connections));
    let tracker = TaskTracker::new();
    let mut stop = shutdown.clone();

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let permit = match Arc::clone(&slots).try_acquire_owned() {
                        Ok(permit) => permit,
                        Err(_) => {
                            state.metrics.connection_rejected();
                            warn!(
                                %peer,
                                max = state.config.max_connections,
                                "Connection limit reached, closing connection"
                            );
                            drop(stream);
                            continue;
                        }
                    };
                    let state = Arc::clone(&state);
                    let shutdown = shutdown.clone();
                    tracker.spawn(async move {
                        handle_connection(stream, peer, state, shutdown).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!("TCP accept error: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            },
            // The watch guard must not outlive this arm.
            _ = async { let _ = stop.wait_for(|stop| *stop).await; } => break,
        }
    }

    drop(listener);
    tracker.close();
    debug!(open = tracker.len(), "Listener closed, draining connections");

    let grace = Duration::from_secs(state.config.shutdown_grace_secs);
    if tokio::time::timeout(grace, tracker.wait()).await.is_err() {
        warn!(
            open = tracker.len(),
            "Shutdown grace period elapsed with connections still open"
        );
    }
}
