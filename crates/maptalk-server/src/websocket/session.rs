//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{Sink, SinkExt, StreamExt};
use maptalk_core::Inbound;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::ClientConnection;
use super::handler::{Incoming, classify, decode_frame};
use super::registry::{ConnectionRegistry, ConnectionSlot};
use crate::coordinator::InboundMessage;

/// Shared handles every session needs.
#[derive(Clone, Debug)]
pub struct SessionContext {
    /// Live connections; the session unregisters itself on exit.
    pub registry: Arc<ConnectionRegistry>,
    /// Channel into the coordinator.
    pub inbound: mpsc::Sender<InboundMessage>,
    /// Interval between server pings.
    pub ping_interval: Duration,
    /// Close after this long without client activity.
    pub pong_timeout: Duration,
    /// Fires when the relay starts shutting down.
    pub shutdown: CancellationToken,
}

/// Run a WebSocket session for a registered connection.
///
/// 1. Announces the connection to the coordinator
/// 2. Forwards decoded inbound frames to the coordinator in arrival order
/// 3. Drains the outbound queue to the socket and sends periodic pings
/// 4. On close, timeout or shutdown: unregisters, then announces the
///    disconnect as the last message for this connection
#[instrument(skip_all, fields(conn_id = %connection.id))]
pub async fn run_ws_session(
    ws: WebSocket,
    connection: Arc<ClientConnection>,
    send_rx: mpsc::Receiver<Arc<String>>,
    ctx: SessionContext,
) {
    let id = connection.id.clone();
    info!("client connected");

    if ctx.inbound.send((id.clone(), Inbound::Connected)).await.is_err() {
        warn!("coordinator unavailable, closing");
        let _ = ctx.registry.unregister(&id);
        return;
    }

    let (ws_tx, mut ws_rx) = ws.split();
    let cancel = ctx.shutdown.child_token();

    let writer = tokio::spawn(write_loop(
        ws_tx,
        send_rx,
        Arc::clone(&connection),
        ctx.ping_interval,
        ctx.pong_timeout,
        cancel.clone(),
    ));

    loop {
        let frame = tokio::select! {
            () = cancel.cancelled() => break,
            frame = ws_rx.next() => frame,
        };
        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "websocket read error");
                break;
            }
            None => break,
        };

        connection.mark_alive();
        match classify(msg) {
            Incoming::Text(text) => {
                let Some(event) = decode_frame(&id, &text) else {
                    continue;
                };
                if ctx
                    .inbound
                    .send((id.clone(), Inbound::Event(event)))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Incoming::Heartbeat => {}
            Incoming::Close => {
                debug!("client sent close frame");
                break;
            }
            Incoming::Ignored => debug!("ignoring non-UTF-8 binary frame"),
        }
    }

    cancel.cancel();
    let _ = writer.await;
    let _ = ctx.registry.unregister(&id);
    let _ = ctx.inbound.send((id, Inbound::Disconnected)).await;
    info!(
        duration_secs = connection.age().as_secs(),
        dropped = connection.drop_count(),
        "client disconnected"
    );
}

async fn write_loop<S>(
    mut ws_tx: S,
    mut send_rx: mpsc::Receiver<Arc<String>>,
    connection: Arc<ClientConnection>,
    ping_interval: Duration,
    pong_timeout: Duration,
    cancel: CancellationToken,
) where
    S: Sink<Message> + Unpin,
{
    let mut ping = tokio::time::interval(ping_interval);
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
            frame = send_rx.recv() => {
                let Some(frame) = frame else { break };
                if ws_tx.send(Message::Text(frame.as_str().into())).await.is_err() {
                    break;
                }
            }
            _ = ping.tick() => {
                if !connection.check_alive() && connection.last_pong_elapsed() > pong_timeout {
                    warn!(timeout = ?pong_timeout, "client unresponsive, disconnecting");
                    break;
                }
                if ws_tx.send(Message::Ping(Vec::new().into())).await.is_err() {
                    break;
                }
            }
        }
    }

    // Stops the reader too when the writer exits first.
    cancel.cancel();
}

/// Register a freshly upgraded socket and run its session.
///
/// `slot` is held until the session has fully finished.
pub(crate) async fn serve_socket(socket: WebSocket, ctx: SessionContext, slot: ConnectionSlot) {
    let (connection, send_rx) = ctx.registry.register();
    run_ws_session(socket, connection, send_rx, ctx).await;
    drop(slot);
}
