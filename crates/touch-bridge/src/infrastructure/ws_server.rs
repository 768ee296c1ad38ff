//! Push server: accept loop and per-connection task management.
//!
//! Each accepted socket is handed to [`serve_connection`] on its own task so
//! that one slow client never delays another.  Connection tasks are tracked
//! with a [`TaskTracker`]; on shutdown the accept loop stops and waits for
//! every connection to finish closing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

use crate::application::bus::TouchBus;
use crate::application::runtime::TouchBridge;
use crate::domain::config::BridgeConfig;
use crate::infrastructure::connection::{serve_connection, ConnectionOutcome};

/// Pause after a failed `accept` (e.g. out of file descriptors).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Binds the listener.
///
/// # Errors
///
/// Returns an error if the address is in use or the process lacks permission.
pub async fn bind(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind push server on {addr}"))?;
    info!("touch bridge listening on {}", listener.local_addr().unwrap_or(addr));
    Ok(listener)
}

/// Accepts connections until `shutdown` is cancelled, then waits for every
/// connection task to finish.
pub async fn serve(
    listener: TcpListener,
    bus: Arc<TouchBus>,
    config: Arc<BridgeConfig>,
    shutdown: CancellationToken,
) {
    let tracker = TaskTracker::new();

    loop {
        let accepted = tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };

        match accepted {
            Ok((stream, peer)) => {
                debug!("accepted connection from {peer}");
                tracker.spawn(handle_connection(
                    stream,
                    peer,
                    Arc::clone(&bus),
                    Arc::clone(&config),
                    shutdown.clone(),
                ));
            }
            Err(e) => {
                error!("accept error: {e}");
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }

    info!(open = tracker.len(), "accept loop stopped; closing connections");
    tracker.close();
    tracker.wait().await;
}

/// Binds `config.bind_addr` and serves until the bridge shuts down.
///
/// # Errors
///
/// Returns an error only if the listener cannot be bound.
pub async fn run_server(config: BridgeConfig, bridge: &TouchBridge) -> anyhow::Result<()> {
    let listener = bind(config.bind_addr).await?;
    serve(
        listener,
        bridge.bus(),
        Arc::new(config),
        bridge.shutdown_token(),
    )
    .await;
    Ok(())
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    bus: Arc<TouchBus>,
    config: Arc<BridgeConfig>,
    shutdown: CancellationToken,
) {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("connection {peer}: could not disable Nagle: {e}");
    }
    match serve_connection(stream, peer, bus, config, shutdown).await {
        ConnectionOutcome::Rejected(reason) => debug!("connection {peer} rejected: {reason}"),
        ConnectionOutcome::Closed(reason) => debug!("connection {peer} closed: {reason}"),
    }
}
