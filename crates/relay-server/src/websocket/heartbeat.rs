//! Heartbeat ping/pong liveness monitoring.
//!
//! Pings are written by the outbound forwarder; this loop only watches the
//! sink's alive flag, which the inbound loop sets on every pong.

use std::sync::Arc;
use std::time::Duration;

use relay_core::CloseReason;
use relay_runtime::ClientSink;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client stopped responding within the timeout window.
    TimedOut,
    /// The heartbeat was cancelled or the sink closed.
    Cancelled,
}

/// Consecutive missed checks tolerated: `timeout / interval`, at least 1.
fn max_missed(interval: Duration, timeout: Duration) -> u128 {
    (timeout.as_millis() / interval.as_millis().max(1)).max(1)
}

/// Watch `sink` for pongs.
///
/// At each `interval` tick the alive flag is checked and reset. After
/// `timeout / interval` consecutive ticks without a pong the client is
/// considered dead.
pub async fn run_heartbeat(
    sink: Arc<ClientSink>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let mut check_interval = time::interval(interval);
    let max_missed = max_missed(interval, timeout);
    let mut missed: u128 = 0;

    loop {
        tokio::select! {
            _ = check_interval.tick() => {
                if sink.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
            }
            () = cancel.cancelled() => return HeartbeatResult::Cancelled,
            () = sink.closed() => return HeartbeatResult::Cancelled,
        }
    }
}

/// Run the heartbeat and close `sink` with `HeartbeatTimeout` if it expires.
pub async fn supervise(
    sink: Arc<ClientSink>,
    interval: Duration,
    timeout: Duration,
    cancel: CancellationToken,
) {
    if run_heartbeat(sink.clone(), interval, timeout, cancel).await == HeartbeatResult::TimedOut {
        warn!(
            conn_id = %sink.id(),
            silent_secs = sink.last_pong_elapsed().as_secs(),
            "client unresponsive, disconnecting"
        );
        let _ = sink.close(CloseReason::HeartbeatTimeout);
    }
}
