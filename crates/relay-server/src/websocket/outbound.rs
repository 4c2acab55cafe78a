//! Outbound forwarder: drains a sink's queue onto the socket.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes};
use futures::{Sink, SinkExt};
use relay_core::CloseReason;
use relay_runtime::ClientSink;
use tokio::sync::mpsc;
use tracing::debug;

/// Close frame carrying `reason`'s code.
pub fn close_frame(reason: CloseReason) -> Message {
    Message::Close(Some(CloseFrame {
        code: reason.code(),
        reason: Utf8Bytes::from_static(reason.description()),
    }))
}

/// Forward queued frames to `ws_tx`, pinging every `ping_interval`.
///
/// When the sink is closed, frames already queued are flushed, then a close
/// frame with the sink's close reason is sent. Returns when the socket
/// write fails or after the close frame.
pub async fn run_outbound<S>(
    mut ws_tx: S,
    mut rx: mpsc::Receiver<Arc<String>>,
    sink: Arc<ClientSink>,
    ping_interval: Duration,
) where
    S: Sink<Message> + Unpin,
{
    let mut ping = tokio::time::interval(ping_interval);
    // Skip the immediate first tick
    let _ = ping.tick().await;

    loop {
        tokio::select! {
            biased;
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                if ws_tx.send(Message::Text(frame.as_str().into())).await.is_err() {
                    debug!(conn_id = %sink.id(), "socket write failed");
                    let _ = sink.close(CloseReason::Normal);
                    return;
                }
            }
            () = sink.closed() => {
                while let Ok(frame) = rx.try_recv() {
                    if ws_tx.send(Message::Text(frame.as_str().into())).await.is_err() {
                        return;
                    }
                }
                let reason = sink.close_reason().unwrap_or(CloseReason::Normal);
                let _ = ws_tx.send(close_frame(reason)).await;
                break;
            }
            _ = ping.tick() => {
                if ws_tx.send(Message::Ping(vec![].into())).await.is_err() {
                    let _ = sink.close(CloseReason::Normal);
                    return;
                }
            }
        }
    }
    let _ = ws_tx.close().await;
}
