//! Fan-out of history events to subscribers.

use crate::error::{HistoryError, Result};
use crate::types::Snapshot;
use crossbeam_channel::{bounded, Sender};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::types::{
    DropReason, HistoryEvent, SnapshotSummary, SubscriptionConfig, SubscriptionFilter,
    SubscriptionHandle, SubscriptionId,
};

struct Listener {
    filter: SubscriptionFilter,
    sender: Sender<HistoryEvent>,
    /// False while a catch-up replay is pending.
    live: bool,
}

impl Listener {
    fn wants(&self, event: &HistoryEvent) -> bool {
        self.live && self.filter.accepts(event)
    }

    /// Best-effort final event before the channel is dropped.
    fn farewell(self, reason: DropReason) {
        let _ = self.sender.try_send(HistoryEvent::Dropped { reason });
    }
}

/// Owns every subscriber channel and publishes events to them.
///
/// A subscriber whose buffer is full when an event arrives is removed.
pub struct SubscriptionManager {
    listeners: RwLock<HashMap<SubscriptionId, Listener>>,
    next_id: AtomicU64,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a subscriber.
    ///
    /// With `catch_up` set nothing live is delivered until
    /// [`replay`](Self::replay) has run for the returned id.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let (sender, receiver) = bounded(config.buffer_size.max(1));

        self.listeners.write().insert(
            id,
            Listener {
                filter: config.filter,
                sender,
                live: !config.catch_up,
            },
        );

        SubscriptionHandle { id, receiver }
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        let removed = self.listeners.write().remove(&id);
        if let Some(listener) = removed {
            listener.farewell(DropReason::Unsubscribed);
        }
    }

    /// Remove every subscriber (store shutdown).
    pub fn close_all(&self) {
        let drained: Vec<Listener> = self.listeners.write().drain().map(|(_, l)| l).collect();
        for listener in drained {
            listener.farewell(DropReason::StoreClosed);
        }
    }

    pub fn subscription_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// Deliver catch-up events to one subscriber, then `CaughtUp`, then
    /// switch it to live delivery.
    ///
    /// Events the subscriber's filter rejects are skipped. Fails with
    /// `SubscriptionDropped` if the buffer fills up during the replay.
    pub fn replay<I>(&self, id: SubscriptionId, events: I) -> Result<()>
    where
        I: IntoIterator<Item = HistoryEvent>,
    {
        let mut listeners = self.listeners.write();
        let Some(listener) = listeners.get_mut(&id) else {
            return Err(HistoryError::SubscriptionDropped);
        };

        let delivered = events
            .into_iter()
            .chain(std::iter::once(HistoryEvent::CaughtUp))
            .filter(|event| listener.filter.accepts(event))
            .all(|event| listener.sender.try_send(event).is_ok());

        if !delivered {
            if let Some(listener) = listeners.remove(&id) {
                listener.farewell(DropReason::BufferOverflow);
            }
            return Err(HistoryError::SubscriptionDropped);
        }

        listener.live = true;
        Ok(())
    }

    // --- Publishing ---

    pub fn snapshot_captured(&self, snapshot: &Snapshot, bucket_len: usize) {
        self.publish(HistoryEvent::SnapshotCaptured {
            snapshot: SnapshotSummary::from_snapshot(snapshot, bucket_len),
        });
    }

    pub fn pruned(&self, removed: usize, cleared_files: Vec<String>) {
        self.publish(HistoryEvent::Pruned {
            removed,
            cleared_files,
        });
    }

    pub fn file_cleared(&self, file_path: &str) {
        self.publish(HistoryEvent::FileCleared {
            file_path: file_path.to_string(),
        });
    }

    pub fn active_changed(&self, active: bool) {
        self.publish(HistoryEvent::ActiveChanged { active });
    }

    fn publish(&self, event: HistoryEvent) {
        let overflowed: Vec<SubscriptionId> = self
            .listeners
            .read()
            .iter()
            .filter(|(_, listener)| listener.wants(&event))
            .filter(|(_, listener)| listener.sender.try_send(event.clone()).is_err())
            .map(|(id, _)| *id)
            .collect();

        if overflowed.is_empty() {
            return;
        }

        let mut listeners = self.listeners.write();
        for id in overflowed {
            if let Some(listener) = listeners.remove(&id) {
                tracing::debug!(subscription = id.0, "dropping slow history subscriber");
                listener.farewell(DropReason::BufferOverflow);
            }
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Document, SnapshotKind};
    use chrono::Utc;
    use std::time::Duration;

    fn captured(path: &str) -> Snapshot {
        Snapshot::capture(
            &Document::new(path, "text"),
            SnapshotKind::Saved,
            format!("file://{path}"),
            Utc::now(),
        )
    }

    fn watching(paths: &[&str]) -> SubscriptionConfig {
        SubscriptionConfig {
            filter: SubscriptionFilter::files(paths.iter().map(|p| p.to_string()).collect()),
            ..Default::default()
        }
    }

    #[test]
    fn test_unsubscribe_sends_farewell() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(SubscriptionConfig::default());
        assert_eq!(manager.subscription_count(), 1);

        manager.unsubscribe(handle.id);
        assert_eq!(manager.subscription_count(), 0);
        assert!(matches!(
            handle.recv_timeout(Duration::from_millis(100)).unwrap(),
            HistoryEvent::Dropped {
                reason: DropReason::Unsubscribed
            }
        ));
    }

    #[test]
    fn test_file_filter() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(watching(&["/w/a.txt"]));

        manager.snapshot_captured(&captured("/w/b.txt"), 1);
        manager.file_cleared("/w/b.txt");
        manager.snapshot_captured(&captured("/w/a.txt"), 3);

        let events = handle.drain();
        assert_eq!(events.len(), 1);
        match &events[0] {
            HistoryEvent::SnapshotCaptured { snapshot } => {
                assert_eq!(snapshot.file_path, "/w/a.txt");
                assert_eq!(snapshot.bucket_len, 3);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn test_status_needs_status_filter() {
        let manager = SubscriptionManager::new();
        let snapshots_only = manager.subscribe(SubscriptionConfig {
            filter: SubscriptionFilter::snapshots(),
            ..Default::default()
        });
        let everything = manager.subscribe(SubscriptionConfig::default());

        manager.active_changed(false);

        assert!(snapshots_only.try_recv().is_err());
        assert!(matches!(
            everything.try_recv().unwrap(),
            HistoryEvent::ActiveChanged { active: false }
        ));
    }

    #[test]
    fn test_overflow_drops_subscriber() {
        let manager = SubscriptionManager::new();
        let _handle = manager.subscribe(SubscriptionConfig {
            buffer_size: 2,
            filter: SubscriptionFilter::snapshots(),
            ..Default::default()
        });

        for _ in 0..5 {
            manager.snapshot_captured(&captured("/w/a.txt"), 1);
        }

        assert_eq!(manager.subscription_count(), 0);
    }

    #[test]
    fn test_replay_gates_live_events() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(SubscriptionConfig {
            catch_up: true,
            ..Default::default()
        });

        manager.pruned(3, vec![]);
        assert!(handle.try_recv().is_err());

        let tracked = HistoryEvent::FileTracked {
            file_path: "/w/a.txt".to_string(),
            snapshot_count: 2,
            latest: None,
        };
        manager.replay(handle.id, vec![tracked]).unwrap();

        manager.pruned(3, vec![]);
        let events = handle.drain();
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], HistoryEvent::FileTracked { snapshot_count: 2, .. }));
        assert!(matches!(events[1], HistoryEvent::CaughtUp));
        assert!(matches!(events[2], HistoryEvent::Pruned { removed: 3, .. }));
    }

    #[test]
    fn test_replay_overflow() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(SubscriptionConfig {
            buffer_size: 1,
            catch_up: true,
            ..Default::default()
        });

        let events = (0..4).map(|i| HistoryEvent::FileTracked {
            file_path: format!("/w/{i}.txt"),
            snapshot_count: 1,
            latest: None,
        });

        assert!(matches!(
            manager.replay(handle.id, events),
            Err(HistoryError::SubscriptionDropped)
        ));
        assert_eq!(manager.subscription_count(), 0);
    }

    #[test]
    fn test_close_all() {
        let manager = SubscriptionManager::new();
        let handle = manager.subscribe(SubscriptionConfig::default());

        manager.close_all();

        assert_eq!(manager.subscription_count(), 0);
        assert!(matches!(
            handle.try_recv().unwrap(),
            HistoryEvent::Dropped {
                reason: DropReason::StoreClosed
            }
        ));
    }
}
