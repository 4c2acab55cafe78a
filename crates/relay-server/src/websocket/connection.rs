//! Per-socket plumbing shared by `/ws` and `/chat`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use futures::Sink;
use metrics::{counter, gauge, histogram};
use relay_core::CloseReason;
use relay_runtime::ClientSink;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use crate::websocket::heartbeat;
use crate::websocket::outbound::run_outbound;
use crate::websocket::{Endpoint, SocketConfig};

/// Time allowed for queued frames and the close frame to reach the socket.
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// The write half of one socket: its sink plus the outbound and heartbeat
/// tasks that serve it.
pub struct Connection {
    sink: Arc<ClientSink>,
    endpoint: Endpoint,
    outbound: JoinHandle<()>,
    heartbeat: CancellationToken,
}

impl Connection {
    /// Create the sink and spawn its outbound forwarder and heartbeat.
    pub fn open<S>(ws_tx: S, endpoint: Endpoint, config: &SocketConfig) -> Self
    where
        S: Sink<Message> + Unpin + Send + 'static,
    {
        let (sink, rx) = ClientSink::channel(config.outbound_queue_size);
        let outbound = tokio::spawn(run_outbound(
            ws_tx,
            rx,
            sink.clone(),
            config.heartbeat_interval,
        ));
        let heartbeat = CancellationToken::new();
        let _ = tokio::spawn(heartbeat::supervise(
            sink.clone(),
            config.heartbeat_interval,
            config.heartbeat_timeout,
            heartbeat.clone(),
        ));

        info!(conn_id = %sink.id(), endpoint = endpoint.as_str(), "client connected");
        counter!(WS_CONNECTIONS_TOTAL, "endpoint" => endpoint.as_str()).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE, "endpoint" => endpoint.as_str()).increment(1.0);

        Self {
            sink,
            endpoint,
            outbound,
            heartbeat,
        }
    }

    /// Outbound sink for this socket.
    pub fn sink(&self) -> &Arc<ClientSink> {
        &self.sink
    }

    /// Close the sink (if nothing closed it yet), flush, and record the disconnect.
    pub async fn finish(self) {
        let Self {
            sink,
            endpoint,
            mut outbound,
            heartbeat,
        } = self;
        heartbeat.cancel();
        let _ = sink.close(CloseReason::Normal);
        let reason = sink.close_reason().unwrap_or(CloseReason::Normal);

        if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, &mut outbound)
            .await
            .is_err()
        {
            warn!(conn_id = %sink.id(), "outbound flush timed out");
            outbound.abort();
        }

        info!(
            conn_id = %sink.id(),
            endpoint = endpoint.as_str(),
            reason = reason.as_str(),
            dropped = sink.drop_count(),
            "client disconnected"
        );
        counter!(
            WS_DISCONNECTIONS_TOTAL,
            "endpoint" => endpoint.as_str(),
            "reason" => reason.as_str()
        )
        .increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE, "endpoint" => endpoint.as_str()).decrement(1.0);
        histogram!(WS_CONNECTION_DURATION_SECONDS, "endpoint" => endpoint.as_str())
            .record(sink.age().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use futures::channel::mpsc;

    fn config() -> SocketConfig {
        SocketConfig {
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(90),
            outbound_queue_size: 8,
            max_body_len: 64,
        }
    }

    #[tokio::test]
    async fn finish_flushes_and_sends_close() {
        let (ws_tx, ws_rx) = mpsc::unbounded::<Message>();
        let conn = Connection::open(ws_tx, Endpoint::Chat, &config());
        assert!(conn.sink().send_text("hello"));
        conn.finish().await;

        let sent: Vec<Message> = ws_rx.collect().await;
        assert_eq!(sent[0], Message::Text("hello".into()));
        assert!(matches!(sent.last(), Some(Message::Close(Some(f))) if f.code == 1000));
    }

    #[tokio::test]
    async fn finish_keeps_earlier_reason() {
        let (ws_tx, ws_rx) = mpsc::unbounded::<Message>();
        let conn = Connection::open(ws_tx, Endpoint::Rpc, &config());
        let sink = conn.sink().clone();
        let _ = sink.close(CloseReason::ServerShutdown);
        conn.finish().await;

        assert_eq!(sink.close_reason(), Some(CloseReason::ServerShutdown));
        let sent: Vec<Message> = ws_rx.collect().await;
        assert!(matches!(sent.last(), Some(Message::Close(Some(f))) if f.code == 1001));
    }
}
