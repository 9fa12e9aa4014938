//! In-process event bus.
//!
//! Single topic multiplexer for `job.*`, `queue.*` and `performance.*`
//! events. Publishing never blocks; each subscriber owns a bounded cursor
//! into a shared ring buffer, so a slow subscriber loses its oldest events
//! and is handed a loss marker instead of stalling publishers or peers.
//! Events published by one task are observed by each subscriber in publish
//! order.

use serde_json::json;
use tokio::sync::broadcast;

use crate::models::{Job, PerformanceControlPatch, PerformanceState, QueueEntry};

/// Default ring capacity per bus. Subscribers that fall further behind than
/// this receive a [`BusMessage::Lost`] marker.
pub const DEFAULT_CAPACITY: usize = 256;

/// Everything the bus carries.
#[derive(Debug, Clone)]
pub enum Event {
    JobCreated(Job),
    JobUpdated(Job),
    JobCompleted(Job),
    JobFailed(Job),
    JobCancelled(Job),
    QueueChanged(Vec<QueueEntry>),
    QueueAdvanced {
        now_playing: Option<QueueEntry>,
    },
    PerformanceChanged {
        patch: PerformanceControlPatch,
        state: PerformanceState,
    },
    PlaybackPlay,
    PlaybackPause,
    PlaybackSeek {
        position_ms: i64,
    },
}

impl Event {
    pub fn topic(&self) -> &'static str {
        match self {
            Event::JobCreated(_) => "job.created",
            Event::JobUpdated(_) => "job.updated",
            Event::JobCompleted(_) => "job.completed",
            Event::JobFailed(_) => "job.failed",
            Event::JobCancelled(_) => "job.cancelled",
            Event::QueueChanged(_) => "queue.changed",
            Event::QueueAdvanced { .. } => "queue.advanced",
            Event::PerformanceChanged { .. } => "performance.changed",
            Event::PlaybackPlay => "performance.play",
            Event::PlaybackPause => "performance.pause",
            Event::PlaybackSeek { .. } => "performance.seek",
        }
    }

    /// Push-frame type name for this event, where one exists.
    pub fn frame_type(&self) -> &'static str {
        match self {
            Event::JobCreated(_) => "job_created",
            Event::JobUpdated(_) => "job_updated",
            Event::JobCompleted(_) => "job_completed",
            Event::JobFailed(_) => "job_failed",
            Event::JobCancelled(_) => "job_cancelled",
            Event::QueueChanged(_) => "queue_changed",
            Event::QueueAdvanced { .. } => "queue_advanced",
            Event::PerformanceChanged { .. } => "changed",
            Event::PlaybackPlay => "playback_play",
            Event::PlaybackPause => "playback_pause",
            Event::PlaybackSeek { .. } => "playback_seek",
        }
    }

    /// Payload of the push frame for this event.
    pub fn frame_payload(&self) -> serde_json::Value {
        match self {
            Event::JobCreated(job)
            | Event::JobUpdated(job)
            | Event::JobCompleted(job)
            | Event::JobFailed(job)
            | Event::JobCancelled(job) => json!(job),
            Event::QueueChanged(entries) => json!(entries),
            Event::QueueAdvanced { now_playing } => json!({ "nowPlaying": now_playing }),
            Event::PerformanceChanged { patch, .. } => json!(patch),
            Event::PlaybackPlay | Event::PlaybackPause => json!({}),
            Event::PlaybackSeek { position_ms } => json!({ "positionMs": position_ms }),
        }
    }
}

/// Message handed to a subscriber.
#[derive(Debug, Clone)]
pub enum BusMessage {
    Event(Event),
    /// The subscriber's buffer overflowed and `skipped` events were dropped;
    /// the client behind it should request a fresh snapshot.
    Lost(u64),
}

/// Topic multiplexer handle. Cheap to clone; all clones publish into the same
/// ring.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(64));
        Self { tx }
    }

    /// Publish an event. Non-blocking; an event with no live subscribers is
    /// simply dropped.
    pub fn publish(&self, event: Event) {
        tracing::debug!(topic = event.topic(), "publish");
        let _ = self.tx.send(event);
    }

    /// Subscribe to a topic pattern: `"job.*"`, `"performance.*"`, an exact
    /// topic, or `"*"` for everything. Delivery starts with events published
    /// after this call.
    pub fn subscribe(&self, pattern: &str) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            pattern: pattern.to_string(),
        }
    }
}

/// One subscriber's view of the bus.
pub struct Subscription {
    rx: broadcast::Receiver<Event>,
    pattern: String,
}

impl Subscription {
    /// Receive the next matching event, or a loss marker after falling
    /// behind. Returns `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            match self.rx.recv().await {
                Ok(event) => {
                    if topic_matches(&self.pattern, event.topic()) {
                        return Some(BusMessage::Event(event));
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(pattern = %self.pattern, skipped, "subscriber lagged");
                    return Some(BusMessage::Lost(skipped));
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

fn topic_matches(pattern: &str, topic: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_suffix(".*") {
        Some(prefix) => topic
            .strip_prefix(prefix)
            .map(|rest| rest.starts_with('.'))
            .unwrap_or(false),
        None => pattern == topic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_matching() {
        assert!(topic_matches("*", "job.created"));
        assert!(topic_matches("job.*", "job.created"));
        assert!(topic_matches("job.created", "job.created"));
        assert!(!topic_matches("job.*", "queue.changed"));
        assert!(!topic_matches("job.*", "jobx.created"));
        assert!(!topic_matches("queue.changed", "queue.advanced"));
    }

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe("performance.*");

        bus.publish(Event::PlaybackPlay);
        bus.publish(Event::PlaybackSeek { position_ms: 1500 });
        bus.publish(Event::PlaybackPause);

        match sub.recv().await {
            Some(BusMessage::Event(Event::PlaybackPlay)) => {}
            other => panic!("unexpected {:?}", other.map(|m| format!("{:?}", m))),
        }
        match sub.recv().await {
            Some(BusMessage::Event(Event::PlaybackSeek { position_ms })) => {
                assert_eq!(position_ms, 1500)
            }
            _ => panic!("expected seek"),
        }
        match sub.recv().await {
            Some(BusMessage::Event(Event::PlaybackPause)) => {}
            _ => panic!("expected pause"),
        }
    }

    #[tokio::test]
    async fn filters_topics() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe("queue.*");

        bus.publish(Event::PlaybackPlay);
        bus.publish(Event::QueueAdvanced { now_playing: None });

        match sub.recv().await {
            Some(BusMessage::Event(Event::QueueAdvanced { .. })) => {}
            _ => panic!("expected queue.advanced only"),
        }
    }

    #[tokio::test]
    async fn overflow_yields_loss_marker() {
        let bus = EventBus::new(64);
        let mut sub = bus.subscribe("performance.*");

        for i in 0..200 {
            bus.publish(Event::PlaybackSeek { position_ms: i });
        }

        match sub.recv().await {
            Some(BusMessage::Lost(skipped)) => assert!(skipped > 0),
            other => panic!(
                "expected loss marker, got {:?}",
                other.map(|m| format!("{:?}", m))
            ),
        }
    }
}
