//! Per-client connection handling.
//!
//! Every accepted socket runs through the same lifecycle:
//!
//! ```text
//! Connecting ──handshake ok──▶ Open ──close/EOF/error──▶ Closing ──▶ Closed
//!      │                                                    ▲
//!      └────────timeout / malformed / EOF / I/O─────────────┘ (Rejected)
//! ```
//!
//! While Open, two halves run concurrently inside the connection's task:
//!
//! - **writer**: drains the subscriber queue into text frames, answers pings,
//!   and sends keepalive pings;
//! - **reader**: decodes inbound frames.  Ping → pong, Close/EOF/error →
//!   Closing, everything else is ignored.
//!
//! Whichever half finishes first decides the [`CloseReason`]; the other half
//! is dropped at once.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, timeout, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use touch_core::protocol::frame::{
    decode_control_limited, encode_close, encode_ping, encode_pong, encode_text, ControlFrame,
};
use touch_core::protocol::handshake::{
    find_request_end, parse_upgrade_request, HandshakeError, UpgradeRequest, MAX_REQUEST_LEN,
    UPGRADE_RESPONSE,
};
use touch_core::WireMessage;

use crate::application::bus::{ConnectionId, Subscription, TouchBus};
use crate::domain::config::BridgeConfig;

/// Upper bound on the best-effort close frame and socket shutdown.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Pongs owed to the client that have not been written yet.
const PONG_BACKLOG: usize = 4;

const READ_CHUNK: usize = 4096;

/// Lifecycle phase of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Why a connection never reached Open.
#[derive(Debug, Error)]
pub enum RejectReason {
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    #[error("peer closed the connection during the handshake")]
    EarlyEof,

    #[error("invalid upgrade request: {0}")]
    Invalid(#[from] HandshakeError),

    #[error("I/O error during handshake: {0}")]
    Io(#[from] std::io::Error),

    #[error("bridge is shutting down")]
    Shutdown,
}

/// Why an Open connection ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent a Close frame.
    ClientClose,
    /// The client closed its end of the socket.
    PeerEof,
    ReadError,
    WriteError,
    /// The client sent a frame that cannot be decoded.
    ProtocolError,
    /// The subscriber queue overflowed and the bus dropped the subscriber.
    Backpressure,
    Shutdown,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CloseReason::ClientClose => "client close",
            CloseReason::PeerEof => "peer EOF",
            CloseReason::ReadError => "read error",
            CloseReason::WriteError => "write error",
            CloseReason::ProtocolError => "protocol error",
            CloseReason::Backpressure => "backpressure drop",
            CloseReason::Shutdown => "shutdown",
        };
        f.write_str(s)
    }
}

/// Final result of [`serve_connection`].
#[derive(Debug)]
pub enum ConnectionOutcome {
    Rejected(RejectReason),
    Closed(CloseReason),
}

/// Tracks and logs state transitions for one connection.
struct Lifecycle {
    peer: SocketAddr,
    conn_id: Option<ConnectionId>,
    state: ConnectionState,
}

impl Lifecycle {
    fn new(peer: SocketAddr) -> Self {
        Self {
            peer,
            conn_id: None,
            state: ConnectionState::Connecting,
        }
    }

    fn enter(&mut self, next: ConnectionState) {
        debug!(
            peer = %self.peer,
            conn_id = ?self.conn_id,
            from = %self.state,
            to = %next,
            "connection state"
        );
        self.state = next;
    }
}

/// Runs one client connection from handshake to close.
///
/// Never returns an error: every failure is local to this connection and is
/// reported through the [`ConnectionOutcome`].
pub async fn serve_connection<S>(
    mut stream: S,
    peer: SocketAddr,
    bus: Arc<TouchBus>,
    config: Arc<BridgeConfig>,
    shutdown: CancellationToken,
) -> ConnectionOutcome
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut life = Lifecycle::new(peer);

    // ── Connecting ────────────────────────────────────────────────────────────
    let mut pending = Vec::new();
    let handshake = async {
        let request = read_upgrade_request(&mut stream, &mut pending).await?;
        stream.write_all(UPGRADE_RESPONSE).await?;
        Ok::<UpgradeRequest, RejectReason>(request)
    };
    let handshake_result = tokio::select! {
        biased;
        _ = shutdown.cancelled() => Err(RejectReason::Shutdown),
        res = timeout(config.handshake_timeout, handshake) => {
            res.unwrap_or(Err(RejectReason::Timeout(config.handshake_timeout)))
        }
    };

    let request = match handshake_result {
        Ok(request) => request,
        Err(reason) => {
            warn!(%peer, error = %reason, "connection rejected");
            let _ = timeout(CLOSE_GRACE, stream.shutdown()).await;
            life.enter(ConnectionState::Closed);
            return ConnectionOutcome::Rejected(reason);
        }
    };

    // ── Open ──────────────────────────────────────────────────────────────────
    let mut subscription = bus.subscribe();
    life.conn_id = Some(subscription.id());
    life.enter(ConnectionState::Open);
    info!(conn_id = %subscription.id(), %peer, path = %request.path, "client connected");

    let (mut reader, mut writer) = tokio::io::split(stream);

    let reason = match greet(&mut writer).await {
        Err(e) => {
            debug!(conn_id = %subscription.id(), error = %e, "failed to send greeting");
            CloseReason::WriteError
        }
        Ok(()) => {
            let evicted = subscription.eviction_token();
            let (pong_tx, pong_rx) = mpsc::channel(PONG_BACKLOG);
            let conn_id = subscription.id();
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => CloseReason::Shutdown,
                _ = evicted.cancelled() => CloseReason::Backpressure,
                reason = write_loop(&mut writer, &mut subscription, pong_rx, config.keepalive()) => reason,
                reason = read_loop(&mut reader, pending, pong_tx, config.max_frame_payload, conn_id) => reason,
            }
        }
    };

    // ── Closing ───────────────────────────────────────────────────────────────
    life.enter(ConnectionState::Closing);
    let conn_id = subscription.id();
    bus.unsubscribe(conn_id);
    drop(subscription);

    if reason != CloseReason::WriteError {
        let _ = timeout(CLOSE_GRACE, writer.write_all(&encode_close())).await;
    }
    let _ = timeout(CLOSE_GRACE, writer.shutdown()).await;

    life.enter(ConnectionState::Closed);
    match reason {
        CloseReason::Backpressure => {
            warn!(%conn_id, %peer, "client disconnected: {reason}");
        }
        _ => info!(%conn_id, %peer, "client disconnected: {reason}"),
    }
    ConnectionOutcome::Closed(reason)
}

// ── Handshake ─────────────────────────────────────────────────────────────────

/// Reads until a full request head has arrived and validates it.  Bytes that
/// follow the head are left in `buf` for the frame decoder.
async fn read_upgrade_request<R>(
    stream: &mut R,
    buf: &mut Vec<u8>,
) -> Result<UpgradeRequest, RejectReason>
where
    R: AsyncRead + Unpin,
{
    let mut chunk = [0u8; 1024];
    loop {
        if let Some(end) = find_request_end(buf) {
            let request = parse_upgrade_request(&buf[..end])?;
            buf.drain(..end);
            return Ok(request);
        }
        if buf.len() >= MAX_REQUEST_LEN {
            return Err(HandshakeError::TooLarge.into());
        }
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(RejectReason::EarlyEof);
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

async fn greet<W>(writer: &mut W) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let json = WireMessage::Connected
        .to_json()
        .map_err(std::io::Error::other)?;
    writer.write_all(&encode_text(json.as_bytes())).await
}

// ── Open: writer half ─────────────────────────────────────────────────────────

async fn write_loop<W>(
    writer: &mut W,
    subscription: &mut Subscription,
    mut pong_rx: mpsc::Receiver<()>,
    keepalive: Option<Duration>,
) -> CloseReason
where
    W: AsyncWrite + Unpin,
{
    let mut keepalive = keepalive.map(|period| {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    });

    loop {
        let frame = tokio::select! {
            biased;
            Some(()) = pong_rx.recv() => encode_pong(),
            _ = next_tick(&mut keepalive) => encode_ping(),
            payload = subscription.recv() => match payload {
                Some(payload) => encode_text(payload.as_bytes()),
                // Only the bus drops the sender, and only on eviction.
                None => return CloseReason::Backpressure,
            },
        };

        if let Err(e) = writer.write_all(&frame).await {
            debug!(conn_id = %subscription.id(), error = %e, "write failed");
            return CloseReason::WriteError;
        }
    }
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

// ── Open: reader half ─────────────────────────────────────────────────────────

async fn read_loop<R>(
    reader: &mut R,
    mut pending: Vec<u8>,
    pong_tx: mpsc::Sender<()>,
    max_payload: usize,
    conn_id: ConnectionId,
) -> CloseReason
where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        loop {
            let (frame, consumed) = match decode_control_limited(&pending, max_payload) {
                Ok(decoded) => decoded,
                Err(e) => {
                    warn!(%conn_id, error = %e, "undecodable frame from client");
                    return CloseReason::ProtocolError;
                }
            };
            match frame {
                ControlFrame::Incomplete => break,
                ControlFrame::Close => return CloseReason::ClientClose,
                ControlFrame::Ping => {
                    // A full backlog already owes the client a pong.
                    let _ = pong_tx.try_send(());
                }
                ControlFrame::Pong => {}
                ControlFrame::Data(payload) => {
                    debug!(%conn_id, len = payload.len(), "ignoring client data frame");
                }
            }
            pending.drain(..consumed);
        }

        match reader.read(&mut chunk).await {
            Ok(0) => return CloseReason::PeerEof,
            Ok(n) => pending.extend_from_slice(&chunk[..n]),
            Err(e) => {
                debug!(%conn_id, error = %e, "read failed");
                return CloseReason::ReadError;
            }
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, DuplexStream};
    use tokio::task::JoinHandle;
    use touch_core::protocol::frame::decode_control;
    use touch_core::TouchEvent;

    const REQUEST: &[u8] = b"GET / HTTP/1.1\r\nUpgrade: websocket\r\nConnection: Upgrade\r\n\r\n";

    fn peer() -> SocketAddr {
        "127.0.0.1:50000".parse().unwrap()
    }

    fn test_config() -> BridgeConfig {
        BridgeConfig {
            handshake_timeout: Duration::from_millis(200),
            ping_interval: Duration::ZERO,
            ..BridgeConfig::default()
        }
    }

    fn spawn_server(
        bus: &Arc<TouchBus>,
        config: BridgeConfig,
        shutdown: &CancellationToken,
        buffer: usize,
    ) -> (DuplexStream, JoinHandle<ConnectionOutcome>) {
        let (client, server) = duplex(buffer);
        let task = tokio::spawn(serve_connection(
            server,
            peer(),
            Arc::clone(bus),
            Arc::new(config),
            shutdown.clone(),
        ));
        (client, task)
    }

    /// Reads from `client` until one full frame is decoded.
    async fn read_frame(client: &mut DuplexStream, buf: &mut Vec<u8>) -> ControlFrame {
        let mut chunk = [0u8; 512];
        loop {
            let (frame, consumed) = decode_control(buf).expect("server frames decode");
            if frame != ControlFrame::Incomplete {
                buf.drain(..consumed);
                return frame;
            }
            let n = client.read(&mut chunk).await.expect("read");
            assert!(n > 0, "server closed before a full frame arrived");
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    /// Performs the handshake and returns bytes read past the response.
    async fn open(client: &mut DuplexStream) -> Vec<u8> {
        client.write_all(REQUEST).await.unwrap();
        let mut buf = Vec::new();
        let mut chunk = [0u8; 512];
        while buf.len() < UPGRADE_RESPONSE.len() {
            let n = client.read(&mut chunk).await.unwrap();
            assert!(n > 0);
            buf.extend_from_slice(&chunk[..n]);
        }
        assert_eq!(&buf[..UPGRADE_RESPONSE.len()], UPGRADE_RESPONSE);
        buf.split_off(UPGRADE_RESPONSE.len())
    }

    fn text(frame: ControlFrame) -> String {
        match frame {
            ControlFrame::Data(p) => String::from_utf8(p).unwrap(),
            other => panic!("expected text frame, got {other:?}"),
        }
    }

    async fn wait_for_subscribers(bus: &TouchBus, n: usize) {
        while bus.subscriber_count() != n {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_open_connection_receives_greeting_then_touches() {
        // Arrange
        let bus = Arc::new(TouchBus::default());
        let shutdown = CancellationToken::new();
        let (mut client, task) = spawn_server(&bus, test_config(), &shutdown, 4096);

        // Act
        let mut buf = open(&mut client).await;
        let greeting = text(read_frame(&mut client, &mut buf).await);
        wait_for_subscribers(&bus, 1).await;
        bus.publish(&[TouchEvent::start(5, 0, 0, 0)]);
        let touch = text(read_frame(&mut client, &mut buf).await);
        client.write_all(&[0x88, 0x80, 1, 2, 3, 4]).await.unwrap();
        let outcome = task.await.unwrap();

        // Assert
        assert_eq!(greeting, r#"{"type":"connected"}"#);
        assert_eq!(touch, r#"{"type":"touch_start","id":5,"x":0,"y":0,"seq":0}"#);
        assert!(matches!(outcome, ConnectionOutcome::Closed(CloseReason::ClientClose)));
        assert_eq!(read_frame(&mut client, &mut buf).await, ControlFrame::Close);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_ping_is_answered_with_pong() {
        let bus = Arc::new(TouchBus::default());
        let shutdown = CancellationToken::new();
        let (mut client, task) = spawn_server(&bus, test_config(), &shutdown, 4096);
        let mut buf = open(&mut client).await;
        read_frame(&mut client, &mut buf).await;

        client.write_all(&[0x89, 0x80, 9, 9, 9, 9]).await.unwrap();

        assert_eq!(read_frame(&mut client, &mut buf).await, ControlFrame::Pong);
        shutdown.cancel();
        assert!(matches!(
            task.await.unwrap(),
            ConnectionOutcome::Closed(CloseReason::Shutdown)
        ));
    }

    #[tokio::test]
    async fn test_ping_sent_with_request_is_answered() {
        // The first frame arrives in the same segment as the request head.
        let bus = Arc::new(TouchBus::default());
        let shutdown = CancellationToken::new();
        let (mut client, task) = spawn_server(&bus, test_config(), &shutdown, 4096);
        let mut eager = REQUEST.to_vec();
        eager.extend_from_slice(&[0x89, 0x00]);
        client.write_all(&eager).await.unwrap();

        let mut buf = Vec::new();
        let mut frames = Vec::new();
        let mut chunk = [0u8; 512];
        while buf.len() < UPGRADE_RESPONSE.len() {
            let n = client.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
        }
        let mut buf = buf.split_off(UPGRADE_RESPONSE.len());
        frames.push(read_frame(&mut client, &mut buf).await);
        frames.push(read_frame(&mut client, &mut buf).await);

        assert!(matches!(frames[0], ControlFrame::Data(_)));
        assert_eq!(frames[1], ControlFrame::Pong);
        drop(client);
        assert!(matches!(
            task.await.unwrap(),
            ConnectionOutcome::Closed(CloseReason::PeerEof)
        ));
    }

    #[tokio::test]
    async fn test_keepalive_ping_is_sent() {
        let bus = Arc::new(TouchBus::default());
        let shutdown = CancellationToken::new();
        let config = BridgeConfig {
            ping_interval: Duration::from_millis(20),
            ..test_config()
        };
        let (mut client, task) = spawn_server(&bus, config, &shutdown, 4096);
        let mut buf = open(&mut client).await;
        read_frame(&mut client, &mut buf).await;

        assert_eq!(read_frame(&mut client, &mut buf).await, ControlFrame::Ping);
        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_client_eof_closes_and_unsubscribes() {
        let bus = Arc::new(TouchBus::default());
        let shutdown = CancellationToken::new();
        let (mut client, task) = spawn_server(&bus, test_config(), &shutdown, 4096);
        let _ = open(&mut client).await;
        wait_for_subscribers(&bus, 1).await;

        drop(client);

        assert!(matches!(
            task.await.unwrap(),
            ConnectionOutcome::Closed(CloseReason::PeerEof)
        ));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_reserved_opcode_is_protocol_error() {
        let bus = Arc::new(TouchBus::default());
        let shutdown = CancellationToken::new();
        let (mut client, task) = spawn_server(&bus, test_config(), &shutdown, 4096);
        let _ = open(&mut client).await;

        client.write_all(&[0x83, 0x00]).await.unwrap();

        assert!(matches!(
            task.await.unwrap(),
            ConnectionOutcome::Closed(CloseReason::ProtocolError)
        ));
    }

    #[tokio::test]
    async fn test_slow_client_is_dropped_for_backpressure() {
        // Arrange: a tiny socket buffer and queue; the client stops reading.
        let bus = Arc::new(TouchBus::new(2));
        let shutdown = CancellationToken::new();
        let (mut client, task) = spawn_server(&bus, test_config(), &shutdown, 64);
        let _ = open(&mut client).await;
        wait_for_subscribers(&bus, 1).await;

        // Act
        let mut evicted = false;
        for seq in 0..1_000u64 {
            let report = bus.publish(&[TouchEvent::moved(1, seq as i32, 0, seq)]);
            if !report.evicted.is_empty() {
                evicted = true;
                break;
            }
            tokio::task::yield_now().await;
        }

        // Assert
        assert!(evicted);
        assert!(matches!(
            task.await.unwrap(),
            ConnectionOutcome::Closed(CloseReason::Backpressure)
        ));
    }

    #[tokio::test]
    async fn test_handshake_timeout_rejects() {
        let bus = Arc::new(TouchBus::default());
        let shutdown = CancellationToken::new();
        let (_client, task) = spawn_server(&bus, test_config(), &shutdown, 4096);

        let outcome = task.await.unwrap();

        assert!(matches!(
            outcome,
            ConnectionOutcome::Rejected(RejectReason::Timeout(_))
        ));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_during_handshake_rejects() {
        let bus = Arc::new(TouchBus::default());
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let (_client, task) = spawn_server(&bus, test_config(), &shutdown, 4096);

        assert!(matches!(
            task.await.unwrap(),
            ConnectionOutcome::Rejected(RejectReason::Shutdown)
        ));
    }

    #[tokio::test]
    async fn test_malformed_request_is_rejected_without_response() {
        // Arrange: the mock fails the test if the server writes anything.
        let stream = tokio_test::io::Builder::new()
            .read(b"POST / HTTP/1.1\r\nUpgrade: websocket\r\n\r\n")
            .build();
        let bus = Arc::new(TouchBus::default());

        // Act
        let outcome = serve_connection(
            stream,
            peer(),
            Arc::clone(&bus),
            Arc::new(test_config()),
            CancellationToken::new(),
        )
        .await;

        // Assert
        assert!(matches!(
            outcome,
            ConnectionOutcome::Rejected(RejectReason::Invalid(HandshakeError::NotGet(_)))
        ));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_eof_mid_request_is_early_eof() {
        let stream = tokio_test::io::Builder::new()
            .read(b"GET / HTTP/1.1\r\n")
            .build();

        let outcome = serve_connection(
            stream,
            peer(),
            Arc::new(TouchBus::default()),
            Arc::new(test_config()),
            CancellationToken::new(),
        )
        .await;

        assert!(matches!(
            outcome,
            ConnectionOutcome::Rejected(RejectReason::EarlyEof)
        ));
    }

    #[test]
    fn test_close_reason_display_distinguishes_backpressure() {
        assert_eq!(CloseReason::Backpressure.to_string(), "backpressure drop");
        assert_eq!(CloseReason::WriteError.to_string(), "write error");
        assert_eq!(ConnectionState::Closing.to_string(), "closing");
    }
}
