//! Request tracker (§5 of the design): matches outbound QoS>0 packets and
//! SUBSCRIBE/UNSUBSCRIBE/PINGREQ against their eventual acknowledgement,
//! retries them on a timeout, and queues anything sent while offline for
//! replay once the connection comes back up. Owned exclusively by the
//! connection actor (see `connection.rs`) — nothing outside that task ever
//! touches it, so unlike the two-mutex design this mirrors, no locking is
//! needed: the actor's serialized `tokio::select!` loop already gives
//! exclusive access.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use mqtt_core::codec::{PublishPacket, SubscribePacket, UnsubscribePacket};
use mqtt_core::id::IdGenerator;
use mqtt_core::qos::QosLevel;

use crate::error::ClientError;

/// The packet an outstanding request is waiting to see acknowledged, plus
/// enough to re-encode it if a retry is due.
pub enum OutboundKind {
    Publish(PublishPacket),
    Subscribe(SubscribePacket),
    Unsubscribe(UnsubscribePacket),
}

/// Where a QoS 2 PUBLISH sits in its PUBREC/PUBREL/PUBCOMP handshake, so a
/// retry re-sends the right packet type: the original PUBLISH (with `dup`
/// set) before a PUBREC has been seen, PUBREL afterward. `None` on every
/// other `OutboundKind`, and on QoS 0/1 publishes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QosTwoStage {
    AwaitingPubRec,
    AwaitingPubComp,
}

pub struct OutstandingRequest {
    pub id: u16,
    pub kind: OutboundKind,
    pub on_complete: Option<Box<dyn FnOnce(Result<(), ClientError>) + Send>>,
    pub next_retry: Instant,
    pub attempts: u32,
    pub qos2_stage: Option<QosTwoStage>,
}

fn initial_qos2_stage(kind: &OutboundKind) -> Option<QosTwoStage> {
    match kind {
        OutboundKind::Publish(p) if p.qos == QosLevel::ExactlyOnce => Some(QosTwoStage::AwaitingPubRec),
        _ => None,
    }
}

/// Tracks in-flight requests by packet id and keeps a FIFO of work submitted
/// while disconnected so it can be replayed, in order, on reconnect.
pub struct RequestTracker {
    id_gen: IdGenerator,
    table: HashMap<u16, OutstandingRequest>,
    offline_queue: VecDeque<OutstandingRequest>,
    request_timeout: Duration,
}

impl RequestTracker {
    pub fn new(request_timeout: Duration) -> Self {
        Self {
            id_gen: IdGenerator::new(),
            table: HashMap::new(),
            offline_queue: VecDeque::new(),
            request_timeout,
        }
    }

    /// Allocates a fresh packet id, not currently in use by any outstanding
    /// request, and registers the request under it. Returns `None` only when
    /// every id is exhausted (65535 concurrent in-flight requests).
    pub fn track(
        &mut self,
        kind: OutboundKind,
        on_complete: Option<Box<dyn FnOnce(Result<(), ClientError>) + Send>>,
    ) -> Option<u16> {
        let table = &self.table;
        let id = self.id_gen.next_id(|candidate| table.contains_key(&candidate))?;
        let qos2_stage = initial_qos2_stage(&kind);
        self.table.insert(
            id,
            OutstandingRequest {
                id,
                kind,
                on_complete,
                next_retry: Instant::now() + self.request_timeout,
                attempts: 0,
                qos2_stage,
            },
        );
        Some(id)
    }

    /// Advances a QoS 2 request's stage once its PUBREC has been seen, so a
    /// later retry resends PUBREL instead of the original PUBLISH. A no-op
    /// for unknown ids (the ack-replay-safety rule in §4.3 applies here too).
    pub fn mark_pubrec_received(&mut self, id: u16) {
        if let Some(req) = self.table.get_mut(&id) {
            req.qos2_stage = Some(QosTwoStage::AwaitingPubComp);
        }
    }

    /// Parks a request that couldn't be sent because the connection is down.
    /// No packet id is allocated yet; that happens when it's dequeued for
    /// sending in `connection.rs`.
    pub fn queue_offline(
        &mut self,
        kind: OutboundKind,
        on_complete: Option<Box<dyn FnOnce(Result<(), ClientError>) + Send>>,
    ) {
        self.offline_queue.push_back(OutstandingRequest {
            id: 0,
            qos2_stage: initial_qos2_stage(&kind),
            kind,
            on_complete,
            next_retry: Instant::now(),
            attempts: 0,
        });
    }

    pub fn drain_offline_queue(&mut self) -> VecDeque<OutstandingRequest> {
        std::mem::take(&mut self.offline_queue)
    }

    pub fn complete(&mut self, id: u16) -> Option<OutstandingRequest> {
        self.table.remove(&id)
    }

    pub fn get(&self, id: u16) -> Option<&OutstandingRequest> {
        self.table.get(&id)
    }

    /// Requests past their retry deadline. Retransmission is unbounded while
    /// connected: callers bump `next_retry` and leave the entry in the table
    /// rather than evicting it after some fixed number of attempts.
    pub fn due_for_retry(&mut self) -> Vec<u16> {
        let now = Instant::now();
        let mut due: Vec<u16> = self
            .table
            .iter()
            .filter(|(_, req)| req.next_retry <= now)
            .map(|(id, _)| *id)
            .collect();
        due.sort_unstable();
        for id in &due {
            if let Some(req) = self.table.get_mut(id) {
                req.attempts += 1;
                req.next_retry = now + self.request_timeout;
            }
        }
        due
    }

    /// Fails every outstanding and queued request. Called when the
    /// connection is torn down for good (explicit disconnect, or a session
    /// that isn't being resumed).
    pub fn fail_all(&mut self, error: impl Fn() -> ClientError) {
        for (_, req) in self.table.drain() {
            if let Some(cb) = req.on_complete {
                cb(Err(error()));
            }
        }
        for req in self.offline_queue.drain(..) {
            if let Some(cb) = req.on_complete {
                cb(Err(error()));
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty() && self.offline_queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mqtt_core::qos::QosLevel;
    use mqtt_core::topic::TopicName;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn publish_kind() -> OutboundKind {
        OutboundKind::Publish(PublishPacket::new(
            TopicName::from_str("a/b").unwrap(),
            QosLevel::AtLeastOnce,
            bytes::Bytes::from_static(b"hi"),
        ))
    }

    #[test]
    fn track_allocates_distinct_ids() {
        let mut tracker = RequestTracker::new(Duration::from_secs(1));
        let a = tracker.track(publish_kind(), None).unwrap();
        let b = tracker.track(publish_kind(), None).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn complete_removes_and_returns_entry() {
        let mut tracker = RequestTracker::new(Duration::from_secs(1));
        let id = tracker.track(publish_kind(), None).unwrap();
        assert!(tracker.complete(id).is_some());
        assert!(tracker.get(id).is_none());
    }

    #[test]
    fn fail_all_invokes_every_callback() {
        let mut tracker = RequestTracker::new(Duration::from_secs(1));
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        tracker.track(
            publish_kind(),
            Some(Box::new(move |result| {
                assert!(result.is_err());
                flag.store(true, Ordering::SeqCst);
            })),
        );
        tracker.fail_all(|| ClientError::new(crate::error::ErrorKind::Cancelled, String::from("down")));
        assert!(called.load(Ordering::SeqCst));
        assert!(tracker.is_empty());
    }

    #[test]
    fn due_for_retry_respects_timeout() {
        let mut tracker = RequestTracker::new(Duration::from_millis(0));
        let id = tracker.track(publish_kind(), None).unwrap();
        let due = tracker.due_for_retry();
        assert_eq!(due, vec![id]);
    }

    #[test]
    fn qos2_publish_starts_awaiting_pubrec_and_advances_on_receipt() {
        let mut tracker = RequestTracker::new(Duration::from_secs(1));
        let kind = OutboundKind::Publish(PublishPacket::new(
            TopicName::from_str("a/b").unwrap(),
            QosLevel::ExactlyOnce,
            bytes::Bytes::from_static(b"hi"),
        ));
        let id = tracker.track(kind, None).unwrap();
        assert_eq!(tracker.get(id).unwrap().qos2_stage, Some(QosTwoStage::AwaitingPubRec));

        tracker.mark_pubrec_received(id);
        assert_eq!(tracker.get(id).unwrap().qos2_stage, Some(QosTwoStage::AwaitingPubComp));
    }

    #[test]
    fn qos1_publish_has_no_qos2_stage() {
        let mut tracker = RequestTracker::new(Duration::from_secs(1));
        let id = tracker.track(publish_kind(), None).unwrap();
        assert_eq!(tracker.get(id).unwrap().qos2_stage, None);
    }
}
