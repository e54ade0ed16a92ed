use crate::models::ProgressEvent;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

struct Topic {
    latest: Option<ProgressEvent>,
    subscribers: Vec<mpsc::UnboundedSender<ProgressEvent>>,
    touched: Instant,
    terminal: bool,
}

impl Topic {
    fn new() -> Self {
        Self {
            latest: None,
            subscribers: Vec::new(),
            touched: Instant::now(),
            terminal: false,
        }
    }
}

/// Named-topic publish/subscribe for upload progress.
///
/// Each topic retains its most recent event, and a new subscriber receives
/// that event before anything published afterwards, so subscribing late never
/// misses the final state. Once a terminal event (complete or error) has been
/// published the topic accepts nothing further and subscriber streams end.
/// Topics idle for longer than the TTL are dropped by [`purge_expired`].
///
/// [`purge_expired`]: ProgressChannel::purge_expired
pub struct ProgressChannel {
    topics: DashMap<String, Topic>,
    ttl: Duration,
}

/// Receiving end of a topic subscription.
pub struct Subscription {
    rx: mpsc::UnboundedReceiver<ProgressEvent>,
}

impl Subscription {
    /// Next event in publish order; `None` once the topic finished or expired.
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }
}

impl ProgressChannel {
    pub fn new(ttl: Duration) -> Self {
        Self {
            topics: DashMap::new(),
            ttl,
        }
    }

    /// Registers a topic ahead of its first event.
    pub fn open(&self, topic: &str) {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(Topic::new)
            .touched = Instant::now();
    }

    pub fn publish(&self, topic: &str, event: ProgressEvent) {
        let mut entry = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(Topic::new);
        let state = entry.value_mut();

        if state.terminal {
            tracing::warn!("Dropping event for finished topic {}: {:?}", topic, event);
            return;
        }

        if let (
            ProgressEvent::Progress { bytes_uploaded, .. },
            Some(ProgressEvent::Progress {
                bytes_uploaded: previous,
                ..
            }),
        ) = (&event, &state.latest)
        {
            if bytes_uploaded < previous {
                tracing::debug!(
                    "Ignoring regressing progress on {}: {} < {}",
                    topic,
                    bytes_uploaded,
                    previous
                );
                return;
            }
        }

        state
            .subscribers
            .retain(|tx| tx.send(event.clone()).is_ok());
        state.terminal = event.is_terminal();
        if state.terminal {
            // Dropping the senders ends every subscriber stream after this event.
            state.subscribers.clear();
        }
        state.latest = Some(event);
        state.touched = Instant::now();
    }

    pub fn subscribe(&self, topic: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut entry = self
            .topics
            .entry(topic.to_string())
            .or_insert_with(Topic::new);
        let state = entry.value_mut();

        if let Some(latest) = &state.latest {
            let _ = tx.send(latest.clone());
        }
        if !state.terminal {
            state.subscribers.push(tx);
        }
        state.touched = Instant::now();

        Subscription { rx }
    }

    /// Like [`subscribe`](Self::subscribe) but never creates the topic.
    /// Returns `None` when the topic is unknown or already expired.
    pub fn subscribe_existing(&self, topic: &str) -> Option<Subscription> {
        let mut state = self.topics.get_mut(topic)?;
        let (tx, rx) = mpsc::unbounded_channel();

        if let Some(latest) = &state.latest {
            let _ = tx.send(latest.clone());
        }
        if !state.terminal {
            state.subscribers.push(tx);
        }
        state.touched = Instant::now();

        Some(Subscription { rx })
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    pub fn latest(&self, topic: &str) -> Option<ProgressEvent> {
        self.topics.get(topic).and_then(|t| t.latest.clone())
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Drops topics untouched for longer than the TTL. Returns how many went.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.topics.len();
        self.topics
            .retain(|_, state| now.duration_since(state.touched) < self.ttl);
        let purged = before.saturating_sub(self.topics.len());
        if purged > 0 {
            tracing::debug!("Purged {} expired progress topics", purged);
        }
        purged
    }
}
