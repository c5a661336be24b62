use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex, RwLock};

use crate::types::{EventType, OrbitEvent};

const SUBSCRIBER_CAPACITY: usize = 10;

struct Subscribers {
    list: Vec<mpsc::Sender<OrbitEvent>>,
    closed: bool,
}

/// Process-local, bounded-buffer broadcast bus. A publisher never blocks on
/// a slow subscriber: `send` enqueues onto a primary buffer drained by a
/// background fan-out task, and per-subscriber delivery drops the event
/// silently if that subscriber's channel is full.
pub struct Notifier {
    primary_tx: Mutex<Option<mpsc::Sender<OrbitEvent>>>,
    subscribers: Arc<RwLock<Subscribers>>,
}

impl Notifier {
    pub fn new(buffer_size: usize) -> Arc<Self> {
        Self::build(buffer_size, true)
    }

    /// Like `new`, but never spawns the draining fan-out task, so the
    /// primary buffer's capacity is a hard, deterministic limit. Test-only:
    /// exercises `send`'s full-buffer return value without a race against
    /// the background drainer.
    #[cfg(test)]
    fn new_without_drain(buffer_size: usize) -> Arc<Self> {
        Self::build(buffer_size, false)
    }

    fn build(buffer_size: usize, drain: bool) -> Arc<Self> {
        let (primary_tx, primary_rx) = mpsc::channel(buffer_size.max(1));
        let subscribers = Arc::new(RwLock::new(Subscribers { list: Vec::new(), closed: false }));

        if drain {
            let fan_out_subscribers = subscribers.clone();
            let mut primary_rx = primary_rx;
            tokio::spawn(async move {
                while let Some(event) = primary_rx.recv().await {
                    fan_out(&fan_out_subscribers, event).await;
                }
            });
        } else {
            // Keep the receiver alive (so the channel isn't seen as closed)
            // without ever polling it, so sends fill the buffer and stay put.
            std::mem::forget(primary_rx);
        }

        Arc::new(Self { primary_tx: Mutex::new(Some(primary_tx)), subscribers })
    }

    /// Non-blocking publish. Returns false if the bus is closed or the
    /// primary buffer is full; fan-out to subscribers happens asynchronously.
    pub async fn send(&self, event: OrbitEvent) -> bool {
        let guard = self.primary_tx.lock().await;
        match guard.as_ref() {
            Some(tx) => tx.try_send(event).is_ok(),
            None => false,
        }
    }

    /// Synchronous fan-out, bypassing the primary buffer. Used for ad-hoc
    /// emission where the caller wants delivery attempted immediately.
    pub async fn broadcast(&self, event: OrbitEvent) {
        fan_out(&self.subscribers, event).await;
    }

    /// Allocates a bounded per-subscriber channel. If the bus is already
    /// closed, returns a receiver whose sender has already been dropped.
    pub async fn subscribe(&self) -> mpsc::Receiver<OrbitEvent> {
        let mut subs = self.subscribers.write().await;
        let (tx, rx) = mpsc::channel(SUBSCRIBER_CAPACITY);
        if subs.closed {
            drop(tx);
        } else {
            subs.list.push(tx);
        }
        rx
    }

    /// Marks the bus closed, drops the primary buffer (ending the fan-out
    /// task), and drops every subscriber's sender (closing their channels).
    pub async fn close(&self) {
        *self.primary_tx.lock().await = None;
        let mut subs = self.subscribers.write().await;
        subs.closed = true;
        subs.list.clear();
    }
}

async fn fan_out(subscribers: &Arc<RwLock<Subscribers>>, event: OrbitEvent) {
    let subs = subscribers.read().await;
    for tx in &subs.list {
        let _ = tx.try_send(event.clone());
    }
}

/// Diffs an issue's previously-observed label set against its current one
/// and produces the events a watcher should emit. When both sets carry exactly one
/// `status:*` label and they differ, collapses add+remove into a single
/// `label_changed` event rather than two separate ones.
pub fn diff_events(
    owner: &str,
    repo: &str,
    issue_id: u64,
    issue_title: Option<&str>,
    old_labels: &[String],
    new_labels: &[String],
) -> Vec<OrbitEvent> {
    let old_status: Vec<&String> = old_labels.iter().filter(|l| l.starts_with("status:")).collect();
    let new_status: Vec<&String> = new_labels.iter().filter(|l| l.starts_with("status:")).collect();

    let timestamp = Utc::now();
    let base = |kind: EventType, from: Option<String>, to: Option<String>| OrbitEvent {
        kind,
        issue_id,
        issue_title: issue_title.map(|s| s.to_string()),
        owner: owner.to_string(),
        repo: repo.to_string(),
        from_label: from,
        to_label: to,
        timestamp,
    };

    if old_status.len() == 1 && new_status.len() == 1 && old_status[0] != new_status[0] {
        return vec![base(
            EventType::LabelChanged,
            Some(old_status[0].clone()),
            Some(new_status[0].clone()),
        )];
    }

    let mut events = Vec::new();
    for label in new_labels {
        if !old_labels.contains(label) {
            events.push(base(EventType::LabelAdded, None, Some(label.clone())));
        }
    }
    for label in old_labels {
        if !new_labels.contains(label) {
            events.push(base(EventType::LabelRemoved, Some(label.clone()), None));
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn buffer_size_two_drops_third_send() {
        let notifier = Notifier::new_without_drain(2);
        let event = |n| OrbitEvent {
            kind: EventType::IssueDetected,
            issue_id: n,
            issue_title: None,
            owner: "acme".into(),
            repo: "widgets".into(),
            from_label: None,
            to_label: None,
            timestamp: Utc::now(),
        };
        let first = notifier.send(event(1)).await;
        let second = notifier.send(event(2)).await;
        let third = notifier.send(event(3)).await;
        assert!(first);
        assert!(second);
        assert!(!third);
    }

    #[tokio::test]
    async fn subscribe_then_close_observes_channel_closed() {
        let notifier = Notifier::new(8);
        let mut rx = notifier.subscribe().await;
        notifier.close().await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_after_close_returns_false() {
        let notifier = Notifier::new(8);
        notifier.close().await;
        let event = OrbitEvent {
            kind: EventType::IssueDetected,
            issue_id: 1,
            issue_title: None,
            owner: "acme".into(),
            repo: "widgets".into(),
            from_label: None,
            to_label: None,
            timestamp: Utc::now(),
        };
        assert!(!notifier.send(event).await);
    }

    #[test]
    fn diff_collapses_single_status_swap_into_label_changed() {
        let old = vec!["status:needs-plan".to_string()];
        let new = vec!["status:planning".to_string()];
        let events = diff_events("acme", "widgets", 1, None, &old, &new);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventType::LabelChanged);
        assert_eq!(events[0].from_label.as_deref(), Some("status:needs-plan"));
        assert_eq!(events[0].to_label.as_deref(), Some("status:planning"));
    }

    #[test]
    fn diff_emits_separate_add_remove_for_non_status_labels() {
        let old = vec!["documentation".to_string()];
        let new = vec!["documentation".to_string(), "bug".to_string()];
        let events = diff_events("acme", "widgets", 1, None, &old, &new);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].kind, EventType::LabelAdded);
        assert_eq!(events[0].to_label.as_deref(), Some("bug"));
    }
}
