//! `WebSocket` session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use courier_core::{ConnectionEvents, SessionHandler, SessionRegistry, TransportError};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::connection::ChannelSession;
use crate::config::ServerConfig;

/// How long the writer gets to send its Close frame once the session ends.
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Drive one connection.
///
/// 1. Registers the user and queues the `connection.established` frame
/// 2. Spawns a writer that drains the send queue and pings on an interval
/// 3. Feeds inbound text (and UTF-8 binary) frames to the handler
/// 4. Ends on Close, stream end, a read error, a dead writer or shutdown
/// 5. Runs the handler's close path exactly once
#[instrument(skip_all, fields(user_id = %user_id))]
pub async fn run_ws_session(
    ws: WebSocket,
    user_id: String,
    registry: Arc<SessionRegistry>,
    config: Arc<ServerConfig>,
    shutdown: CancellationToken,
) {
    let (mut ws_tx, mut ws_rx) = ws.split();

    let (send_tx, mut send_rx) = mpsc::channel::<String>(config.send_buffer.max(1));
    let channel = Arc::new(ChannelSession::new(send_tx));
    let mut handler = SessionHandler::new(user_id, channel.clone(), registry);
    handler.on_open();

    let writer_stop = CancellationToken::new();
    let stop = writer_stop.clone();
    let outbound_channel = channel.clone();
    let interval = config.heartbeat_interval;
    let timeout = config.heartbeat_timeout;
    let mut outbound = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(interval);
        // First tick fires immediately
        let _ = ping_interval.tick().await;

        loop {
            tokio::select! {
                () = stop.cancelled() => break,
                msg = send_rx.recv() => {
                    let Some(text) = msg else { break };
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = ping_interval.tick() => {
                    if !outbound_channel.check_alive()
                        && outbound_channel.last_pong_elapsed() > timeout
                    {
                        warn!(?timeout, "client unresponsive, disconnecting");
                        break;
                    }
                    if ws_tx.send(Message::Ping(Bytes::new())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = ws_tx.close().await;
    });

    let mut writer_done = false;
    loop {
        tokio::select! {
            () = shutdown.cancelled() => {
                debug!("server shutting down, closing connection");
                break;
            }
            _ = &mut outbound => {
                debug!("writer stopped");
                writer_done = true;
                break;
            }
            frame = ws_rx.next() => {
                let msg = match frame {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        handler.on_error(&TransportError::Other(e.to_string()));
                        break;
                    }
                    None => break,
                };
                channel.mark_alive();
                match msg {
                    Message::Text(text) => handler.on_message(text.as_str()),
                    Message::Binary(data) => match std::str::from_utf8(&data) {
                        Ok(text) => handler.on_message(text),
                        Err(_) => debug!(len = data.len(), "ignoring non-UTF-8 binary frame"),
                    },
                    Message::Ping(_) | Message::Pong(_) => {}
                    Message::Close(_) => {
                        debug!("client sent close frame");
                        break;
                    }
                }
            }
        }
    }

    if !writer_done {
        writer_stop.cancel();
        if tokio::time::timeout(CLOSE_GRACE, &mut outbound).await.is_err() {
            debug!("writer did not finish closing, aborting");
            outbound.abort();
        }
    }
    if channel.drop_count() > 0 {
        debug!(dropped = channel.drop_count(), "frames refused by full or closed queue");
    }
    handler.on_close();
}
