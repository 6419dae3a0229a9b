//! WebSocket session lifecycle: one connected client from upgrade through
//! disconnect.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket};
use boardcast_hub::{ChannelTransport, ConnectionId, OutboundFrame, OutboundMessage, Transport};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use metrics::histogram;
use tokio::sync::mpsc;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::handler::ConnectParams;
use crate::metrics::WS_CONNECTION_DURATION_SECONDS;
use crate::server::AppState;

/// Run a WebSocket session for a connected client.
///
/// 1. Registers a [`ChannelTransport`] with the hub and sends `connected`
/// 2. Spawns a writer that drains the transport's queue into the socket
/// 3. Routes inbound text and UTF-8 binary frames to the hub
/// 4. Unregisters on close, socket error, eviction, or server shutdown
///
/// Eviction reaches the session through the transport's close signal, so a
/// client whose buffer is full is still disconnected.
#[instrument(skip_all, fields(connection_id))]
pub async fn run_ws_session(ws: WebSocket, params: ConnectParams, state: AppState) {
    let (ws_tx, mut ws_rx) = ws.split();
    let session_start = Instant::now();

    let (transport, outbound_rx) =
        ChannelTransport::new(state.config.channel_capacity, state.config.send_timeout);
    let closed = transport.close_signal();
    let transport: Arc<dyn Transport> = Arc::new(transport);
    let binding = Arc::downgrade(&transport);
    let id = state
        .hub
        .register(transport, params.client_id.map(ConnectionId::from), params.user);
    let _ = tracing::Span::current().record("connection_id", id.as_str());

    let mut writer = tokio::spawn(write_frames(ws_tx, outbound_rx, closed));
    let _ = state
        .hub
        .send_personal(&id, OutboundMessage::connected(&id))
        .await;

    let cancel = state.shutdown.token();
    loop {
        let next = tokio::select! {
            () = cancel.cancelled() => {
                debug!("server shutting down");
                break;
            }
            _ = &mut writer => {
                debug!("writer finished");
                break;
            }
            next = ws_rx.next() => next,
        };
        let Some(Ok(msg)) = next else { break };

        let result = match msg {
            Message::Text(text) => state.hub.handle_client_message(&id, text.as_str()).await,
            Message::Binary(data) => state.hub.handle_client_frame(&id, &data).await,
            Message::Close(_) => {
                info!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                let _ = state.hub.touch(&id);
                Ok(())
            }
        };
        if let Err(e) = result {
            debug!(error = %e, "client message rejected");
        }
    }

    let _ = state.hub.unregister_transport(&id, &binding);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(session_start.elapsed().as_secs_f64());
    info!("client disconnected");
    writer.abort();
}

/// How long a closed transport may keep flushing before its socket is
/// dropped.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Forward queued frames to the socket until the queue closes, a close
/// frame is requested, or the socket fails.
///
/// Once `closed` fires the writer gets [`CLOSE_FLUSH_TIMEOUT`] to deliver
/// what is queued, then the socket half is dropped. A stalled peer cannot
/// hold the session open past eviction.
async fn write_frames(
    ws_tx: SplitSink<WebSocket, Message>,
    outbound_rx: mpsc::Receiver<OutboundFrame>,
    closed: CancellationToken,
) {
    let forward = forward_frames(ws_tx, outbound_rx);
    tokio::pin!(forward);
    tokio::select! {
        () = &mut forward => {}
        () = closed.cancelled() => {
            if time::timeout(CLOSE_FLUSH_TIMEOUT, forward).await.is_err() {
                debug!("peer stalled after close, dropping socket");
            }
        }
    }
}

async fn forward_frames(
    mut ws_tx: SplitSink<WebSocket, Message>,
    mut outbound_rx: mpsc::Receiver<OutboundFrame>,
) {
    while let Some(frame) = outbound_rx.recv().await {
        match frame {
            OutboundFrame::Text(text) => {
                if ws_tx.send(Message::Text(text.to_string().into())).await.is_err() {
                    break;
                }
            }
            OutboundFrame::Close => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }
    let _ = ws_tx.close().await;
}
