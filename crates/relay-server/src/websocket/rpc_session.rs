//! `/ws` session lifecycle: one RPC client from upgrade through disconnect.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::StreamExt;
use relay_core::CloseReason;
use relay_core::rpc::{CONNECTION_ESTABLISHED, RpcEvent};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::rpc::context::RpcContext;
use crate::rpc::registry::MethodRegistry;
use crate::websocket::connection::Connection;
use crate::websocket::handler::handle_message;
use crate::websocket::{Endpoint, SocketConfig};

/// `connection.established` event for a new client.
pub fn established_event(client_id: &str) -> String {
    let event = RpcEvent::new(
        CONNECTION_ESTABLISHED,
        Some(serde_json::json!({ "clientId": client_id })),
    );
    serde_json::to_string(&event).unwrap_or_default()
}

/// Run an RPC session for a connected client.
///
/// 1. Sends a `connection.established` event with the client ID
/// 2. Dispatches incoming text (or UTF-8 binary) frames as RPC requests,
///    in arrival order
/// 3. Queues each response on the client's sink
/// 4. Ends on client close, transport error, heartbeat timeout or shutdown
#[instrument(skip_all, fields(conn_id))]
pub async fn run_rpc_session(
    ws: WebSocket,
    registry: Arc<MethodRegistry>,
    ctx: Arc<RpcContext>,
    config: SocketConfig,
    shutdown: CancellationToken,
) {
    let (ws_tx, mut ws_rx) = ws.split();
    let conn = Connection::open(ws_tx, Endpoint::Rpc, &config);
    let sink = conn.sink().clone();
    let _ = tracing::Span::current().record("conn_id", sink.id().as_str());

    let _ = sink.send_text(established_event(sink.id()));

    loop {
        let frame = tokio::select! {
            () = sink.closed() => break,
            () = shutdown.cancelled() => {
                let _ = sink.close(CloseReason::ServerShutdown);
                break;
            }
            frame = ws_rx.next() => frame,
        };
        let Some(Ok(msg)) = frame else { break };
        sink.mark_alive();

        let text = match msg {
            Message::Text(ref t) => t.as_str().to_owned(),
            Message::Binary(ref data) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    s.to_owned()
                } else {
                    info!(len = data.len(), "received non-UTF8 binary frame");
                    continue;
                }
            }
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        let result = handle_message(&text, &registry, &ctx).await;
        if !sink.send_text(result.response_json) {
            info!(method = %result.method, "failed to enqueue response (queue full or closed)");
        }
    }

    conn.finish().await;
}
