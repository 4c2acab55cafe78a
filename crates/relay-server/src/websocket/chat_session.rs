//! `/chat` session lifecycle: one chat stream from upgrade through close.
//!
//! Each inbound frame is a `ClientMessage`; each outbound frame a
//! `RelayedMessage`. The stream ends with a close frame whose code names the
//! [`CloseReason`].

use std::ops::ControlFlow;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::StreamExt;
use metrics::counter;
use relay_core::{ClientMessage, CloseReason, MessageError};
use relay_runtime::{ChannelError, ChatChannel, SessionService};
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::metrics::{CHAT_AUTH_FAILURES_TOTAL, CHAT_BROADCAST_DROPS_TOTAL, CHAT_MESSAGES_TOTAL};
use crate::websocket::connection::Connection;
use crate::websocket::{Endpoint, SocketConfig};

/// Apply one decoded inbound frame to `channel`.
///
/// Breaks with the reason the stream was closed for.
pub fn process_frame(
    channel: &mut ChatChannel,
    decoded: Result<ClientMessage, MessageError>,
    max_body_len: usize,
) -> ControlFlow<CloseReason> {
    let message = match decoded {
        Ok(message) => message,
        Err(e) => {
            warn!(conn_id = %channel.sink().id(), error = %e, "malformed chat frame");
            let _ = channel.close(CloseReason::MalformedMessage);
            return ControlFlow::Break(CloseReason::MalformedMessage);
        }
    };

    if message.body.len() > max_body_len {
        warn!(
            conn_id = %channel.sink().id(),
            len = message.body.len(),
            max_body_len,
            "chat body too large"
        );
        let _ = channel.close(CloseReason::MessageTooLarge);
        return ControlFlow::Break(CloseReason::MessageTooLarge);
    }

    match channel.on_message(message) {
        Ok(report) => {
            counter!(CHAT_MESSAGES_TOTAL).increment(1);
            if report.dropped > 0 {
                counter!(CHAT_BROADCAST_DROPS_TOTAL)
                    .increment(u64::try_from(report.dropped).unwrap_or(u64::MAX));
            }
            ControlFlow::Continue(())
        }
        Err(ChannelError::Unauthenticated { .. }) => {
            counter!(CHAT_AUTH_FAILURES_TOTAL).increment(1);
            ControlFlow::Break(CloseReason::Unauthenticated)
        }
        Err(ChannelError::Closed) => {
            ControlFlow::Break(channel.sink().close_reason().unwrap_or(CloseReason::Normal))
        }
    }
}

/// Run a chat stream for a connected client.
#[instrument(skip_all, fields(conn_id))]
pub async fn run_chat_session(
    ws: WebSocket,
    service: Arc<SessionService>,
    config: SocketConfig,
    shutdown: CancellationToken,
) {
    let (ws_tx, mut ws_rx) = ws.split();
    let conn = Connection::open(ws_tx, Endpoint::Chat, &config);
    let sink = conn.sink().clone();
    let _ = tracing::Span::current().record("conn_id", sink.id().as_str());
    let mut channel = service.open_channel(sink.clone());

    loop {
        let frame = tokio::select! {
            () = sink.closed() => break,
            () = shutdown.cancelled() => {
                let _ = channel.close(CloseReason::ServerShutdown);
                break;
            }
            frame = ws_rx.next() => frame,
        };
        let Some(Ok(msg)) = frame else { break };
        sink.mark_alive();

        let decoded = match msg {
            Message::Text(ref text) => ClientMessage::from_json(text.as_str()),
            Message::Binary(ref data) => ClientMessage::from_bytes(data),
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        if let ControlFlow::Break(reason) = process_frame(&mut channel, decoded, config.max_body_len) {
            debug!(%reason, "chat stream ending");
            break;
        }
    }

    let _ = channel.close(CloseReason::Normal);
    conn.finish().await;
}
