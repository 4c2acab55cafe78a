//! Stream registry: who is reachable for broadcast right now.
//!
//! Maps session token → the sink of the chat stream bound to it.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use relay_core::{CloseReason, ConnectionId, SessionToken};
use tracing::{debug, warn};

use crate::sink::ClientSink;

/// Lifetime drop count at which a recipient is disconnected.
pub const MAX_TOTAL_DROPS: u64 = 100;

/// What happened during one [`StreamRegistry::broadcast_except`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Sinks the frame was offered to.
    pub recipients: usize,
    /// Sinks that accepted the frame.
    pub delivered: usize,
    /// Sinks whose queue was full, gone or closed.
    pub dropped: usize,
    /// Sinks closed as slow consumers during this broadcast.
    pub evicted: usize,
}

/// Process-wide table of open chat streams.
#[derive(Debug, Default)]
pub struct StreamRegistry {
    entries: DashMap<SessionToken, Arc<ClientSink>>,
}

impl StreamRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `token → sink` unless `token` already has an entry.
    ///
    /// Returns whether the insertion happened.
    pub fn register_if_absent(&self, token: SessionToken, sink: Arc<ClientSink>) -> bool {
        match self.entries.entry(token) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                debug!(conn_id = %sink.id(), "stream registered");
                let _ = slot.insert(sink);
                true
            }
        }
    }

    /// Delete the entry for `token`, whoever owns it.
    pub fn remove(&self, token: &str) -> Option<Arc<ClientSink>> {
        self.entries.remove(token).map(|(_, sink)| sink)
    }

    /// Delete the entry for `token` only if it belongs to `connection_id`.
    pub fn release(&self, token: &str, connection_id: &ConnectionId) -> bool {
        let released = self
            .entries
            .remove_if(token, |_, sink| sink.id() == connection_id)
            .is_some();
        if released {
            debug!(conn_id = %connection_id, "stream released");
        }
        released
    }

    /// Offer `frame` to every registered sink except `exclude`.
    ///
    /// Never fails: a sink that cannot take the frame is counted and skipped.
    /// Sinks are snapshotted first so no map lock is held while sending.
    pub fn broadcast_except(&self, exclude: &ConnectionId, frame: &Arc<String>) -> BroadcastReport {
        let targets: Vec<(SessionToken, Arc<ClientSink>)> = self
            .entries
            .iter()
            .filter(|e| e.value().id() != exclude)
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        let mut report = BroadcastReport {
            recipients: targets.len(),
            ..BroadcastReport::default()
        };

        for (token, sink) in targets {
            if sink.send(frame.clone()) {
                report.delivered += 1;
                continue;
            }
            report.dropped += 1;
            let drops = sink.drop_count();
            warn!(conn_id = %sink.id(), drops, "failed to deliver chat message");
            if drops >= MAX_TOTAL_DROPS {
                let _ = sink.close(CloseReason::SlowConsumer);
                if self.release(&token, sink.id()) {
                    report.evicted += 1;
                    warn!(conn_id = %sink.id(), drops, "evicted slow consumer");
                }
            }
        }

        debug!(
            recipients = report.recipients,
            delivered = report.delivered,
            dropped = report.dropped,
            "broadcast chat message"
        );
        report
    }

    /// Sink registered for `token`.
    pub fn get(&self, token: &str) -> Option<Arc<ClientSink>> {
        self.entries.get(token).map(|e| e.value().clone())
    }

    /// Whether `token` has an open stream.
    pub fn contains(&self, token: &str) -> bool {
        self.entries.contains_key(token)
    }

    /// Number of open streams.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no stream is open.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn make_sink(capacity: usize) -> (Arc<ClientSink>, mpsc::Receiver<Arc<String>>) {
        ClientSink::channel(capacity)
    }

    fn frame(text: &str) -> Arc<String> {
        Arc::new(text.to_owned())
    }

    #[tokio::test]
    async fn register_if_absent_is_idempotent() {
        let reg = StreamRegistry::new();
        let (sink, _rx) = make_sink(8);
        let token = SessionToken::from("t1");
        assert!(reg.register_if_absent(token.clone(), sink.clone()));
        assert!(!reg.register_if_absent(token.clone(), sink.clone()));
        assert_eq!(reg.len(), 1);
        assert!(reg.contains("t1"));
    }

    #[tokio::test]
    async fn register_does_not_replace_other_owner() {
        let reg = StreamRegistry::new();
        let (first, _r1) = make_sink(8);
        let (second, _r2) = make_sink(8);
        assert!(reg.register_if_absent("t1".into(), first.clone()));
        assert!(!reg.register_if_absent("t1".into(), second));
        assert_eq!(reg.get("t1").unwrap().id(), first.id());
    }

    #[tokio::test]
    async fn remove_absent_is_safe() {
        let reg = StreamRegistry::new();
        assert!(reg.remove("nope").is_none());
        assert!(reg.is_empty());
    }

    #[tokio::test]
    async fn remove_returns_sink() {
        let reg = StreamRegistry::new();
        let (sink, _rx) = make_sink(8);
        let _ = reg.register_if_absent("t1".into(), sink.clone());
        let removed = reg.remove("t1").unwrap();
        assert!(Arc::ptr_eq(&removed, &sink));
        assert!(!reg.contains("t1"));
    }

    #[tokio::test]
    async fn release_checks_owner() {
        let reg = StreamRegistry::new();
        let (owner, _r1) = make_sink(8);
        let (other, _r2) = make_sink(8);
        let _ = reg.register_if_absent("t1".into(), owner.clone());

        assert!(!reg.release("t1", other.id()));
        assert!(reg.contains("t1"));
        assert!(reg.release("t1", owner.id()));
        assert!(!reg.contains("t1"));
        assert!(!reg.release("t1", owner.id()));
    }

    #[tokio::test]
    async fn broadcast_excludes_sender() {
        let reg = StreamRegistry::new();
        let (a, mut ra) = make_sink(8);
        let (b, mut rb) = make_sink(8);
        let (c, mut rc) = make_sink(8);
        let _ = reg.register_if_absent("ta".into(), a.clone());
        let _ = reg.register_if_absent("tb".into(), b);
        let _ = reg.register_if_absent("tc".into(), c);

        let report = reg.broadcast_except(a.id(), &frame("hi"));
        assert_eq!(report.recipients, 2);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.dropped, 0);

        assert!(ra.try_recv().is_err());
        assert_eq!(&*rb.try_recv().unwrap(), "hi");
        assert_eq!(&*rc.try_recv().unwrap(), "hi");
    }

    #[tokio::test]
    async fn broadcast_from_unregistered_sender_reaches_all() {
        let reg = StreamRegistry::new();
        let (a, mut ra) = make_sink(8);
        let (outsider, _ro) = make_sink(8);
        let _ = reg.register_if_absent("ta".into(), a);
        let report = reg.broadcast_except(outsider.id(), &frame("x"));
        assert_eq!(report.delivered, 1);
        assert!(ra.try_recv().is_ok());
    }

    #[tokio::test]
    async fn broadcast_to_empty_registry() {
        let reg = StreamRegistry::new();
        let report = reg.broadcast_except(&ConnectionId::new(), &frame("x"));
        assert_eq!(report, BroadcastReport::default());
    }

    #[tokio::test]
    async fn closed_stream_receives_nothing() {
        let reg = StreamRegistry::new();
        let (a, mut ra) = make_sink(8);
        let (b, _rb) = make_sink(8);
        let _ = reg.register_if_absent("ta".into(), a.clone());
        let _ = reg.register_if_absent("tb".into(), b.clone());

        assert!(reg.release("ta", a.id()));
        let report = reg.broadcast_except(b.id(), &frame("after close"));
        assert_eq!(report.recipients, 0);
        assert!(ra.try_recv().is_err());
    }

    #[tokio::test]
    async fn failed_delivery_does_not_stop_others() {
        let reg = StreamRegistry::new();
        let (dead, dead_rx) = make_sink(8);
        let (live, mut live_rx) = make_sink(8);
        let (sender, _rs) = make_sink(8);
        drop(dead_rx);
        let _ = reg.register_if_absent("dead".into(), dead);
        let _ = reg.register_if_absent("live".into(), live);

        let report = reg.broadcast_except(sender.id(), &frame("m"));
        assert_eq!(report.recipients, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.dropped, 1);
        assert_eq!(&*live_rx.try_recv().unwrap(), "m");
    }

    #[tokio::test]
    async fn slow_consumer_evicted_after_max_drops() {
        let reg = StreamRegistry::new();
        let (slow, _slow_rx) = make_sink(1);
        let (sender, _rs) = make_sink(1);
        let _ = reg.register_if_absent("slow".into(), slow.clone());

        // First frame fills the queue; every later one is a drop.
        let mut evicted = 0;
        for i in 0..=MAX_TOTAL_DROPS {
            let report = reg.broadcast_except(sender.id(), &frame(&format!("m{i}")));
            evicted += report.evicted;
        }

        assert_eq!(evicted, 1);
        assert_eq!(slow.drop_count(), MAX_TOTAL_DROPS);
        assert_eq!(slow.close_reason(), Some(CloseReason::SlowConsumer));
        assert!(!reg.contains("slow"));
    }

    #[tokio::test]
    async fn broadcast_shares_one_allocation() {
        let reg = StreamRegistry::new();
        let (a, mut ra) = make_sink(8);
        let (b, mut rb) = make_sink(8);
        let (sender, _rs) = make_sink(8);
        let _ = reg.register_if_absent("a".into(), a);
        let _ = reg.register_if_absent("b".into(), b);

        let f = frame("shared");
        let _ = reg.broadcast_except(sender.id(), &f);
        let got_a = ra.try_recv().unwrap();
        let got_b = rb.try_recv().unwrap();
        assert!(Arc::ptr_eq(&got_a, &got_b));
        assert!(Arc::ptr_eq(&got_a, &f));
    }

    #[tokio::test]
    async fn concurrent_register_and_broadcast() {
        let reg = Arc::new(StreamRegistry::new());
        let (sender, _rs) = make_sink(8);
        let mut receivers = Vec::new();
        let mut handles = Vec::new();

        for i in 0..20 {
            let (sink, rx) = make_sink(256);
            receivers.push(rx);
            let reg = reg.clone();
            handles.push(tokio::spawn(async move {
                let token = SessionToken::from(format!("t{i}"));
                let _ = reg.register_if_absent(token.clone(), sink.clone());
                tokio::task::yield_now().await;
                let _ = reg.release(&token, sink.id());
            }));
        }
        for _ in 0..50 {
            let _ = reg.broadcast_except(sender.id(), &frame("x"));
            tokio::task::yield_now().await;
        }
        for h in handles {
            h.await.unwrap();
        }
        assert!(reg.is_empty());
    }
}
