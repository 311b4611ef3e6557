//! Subscription types for history change notifications.

use crate::types::{Snapshot, SnapshotId, SnapshotKind};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Configuration for a subscription.
#[derive(Clone, Debug)]
pub struct SubscriptionConfig {
    /// Max buffered events before dropping subscriber.
    /// Default: 256
    pub buffer_size: usize,

    /// Replay one `FileTracked` event per existing bucket, then `CaughtUp`.
    /// Without catch-up the subscription is live immediately.
    pub catch_up: bool,

    /// Filter criteria.
    pub filter: SubscriptionFilter,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            buffer_size: 256,
            catch_up: false,
            filter: SubscriptionFilter::all(),
        }
    }
}

/// Filter criteria for subscriptions.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionFilter {
    /// Only these file paths (None = all files).
    pub file_paths: Option<Vec<String>>,

    /// Include snapshot capture events.
    pub include_snapshots: bool,

    /// Include prune and clear events.
    pub include_maintenance: bool,

    /// Include active/inactive toggles.
    pub include_status: bool,
}

impl SubscriptionFilter {
    /// Captures on every file.
    pub fn snapshots() -> Self {
        Self {
            include_snapshots: true,
            ..Default::default()
        }
    }

    /// Captures and clears for specific files.
    pub fn files(paths: Vec<String>) -> Self {
        Self {
            file_paths: Some(paths),
            include_snapshots: true,
            include_maintenance: true,
            ..Default::default()
        }
    }

    /// Prune and clear events.
    pub fn maintenance() -> Self {
        Self {
            include_maintenance: true,
            ..Default::default()
        }
    }

    /// Everything.
    pub fn all() -> Self {
        Self {
            file_paths: None,
            include_snapshots: true,
            include_maintenance: true,
            include_status: true,
        }
    }

    pub(crate) fn matches_file(&self, file_path: &str) -> bool {
        match &self.file_paths {
            Some(paths) => paths.iter().any(|p| p == file_path),
            None => true,
        }
    }

    /// Whether a live event passes this filter.
    ///
    /// A prune pass is store-wide, so it ignores `file_paths`.
    pub(crate) fn accepts(&self, event: &HistoryEvent) -> bool {
        match event {
            HistoryEvent::SnapshotCaptured { snapshot } => {
                self.include_snapshots && self.matches_file(&snapshot.file_path)
            }
            HistoryEvent::FileCleared { file_path } => {
                self.include_maintenance && self.matches_file(file_path)
            }
            HistoryEvent::Pruned { .. } => self.include_maintenance,
            HistoryEvent::ActiveChanged { .. } => self.include_status,
            HistoryEvent::FileTracked { file_path, .. } => self.matches_file(file_path),
            HistoryEvent::CaughtUp | HistoryEvent::Dropped { .. } => true,
        }
    }
}

/// Events emitted by subscriptions.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryEvent {
    // --- Catch-up ---
    /// A file already present when the subscription started.
    FileTracked {
        file_path: String,
        snapshot_count: usize,
        latest: Option<SnapshotSummary>,
    },

    /// Finished catch-up, now streaming live.
    CaughtUp,

    // --- Snapshot Events ---
    /// A snapshot was captured.
    SnapshotCaptured { snapshot: SnapshotSummary },

    // --- Maintenance Events ---
    /// Age-based pruning ran.
    Pruned {
        removed: usize,
        /// Files whose buckets were emptied and dropped.
        cleared_files: Vec<String>,
    },

    /// A whole bucket was dropped.
    FileCleared { file_path: String },

    // --- Status Events ---
    /// Capture was switched on or off.
    ActiveChanged { active: bool },

    /// Subscription was dropped.
    Dropped { reason: DropReason },
}

/// Why a subscription was dropped.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropReason {
    /// Send buffer overflowed (slow consumer).
    BufferOverflow,
    /// Explicitly unsubscribed.
    Unsubscribed,
    /// The store was shut down.
    StoreClosed,
}

/// Snapshot metadata for events (content is left out).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub id: SnapshotId,
    pub file_path: String,
    pub file_name: String,
    pub kind: SnapshotKind,
    pub timestamp: DateTime<Utc>,
    pub size: u64,
    pub line_count: u64,
    /// Bucket length after the capture.
    pub bucket_len: usize,
}

impl SnapshotSummary {
    pub fn from_snapshot(snapshot: &Snapshot, bucket_len: usize) -> Self {
        Self {
            id: snapshot.id.clone(),
            file_path: snapshot.file_path.clone(),
            file_name: snapshot.file_name.clone(),
            kind: snapshot.kind,
            timestamp: snapshot.timestamp,
            size: snapshot.size,
            line_count: snapshot.line_count,
            bucket_len,
        }
    }
}

/// Unique identifier for a subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// Handle to manage a subscription.
pub struct SubscriptionHandle {
    pub id: SubscriptionId,
    /// Channel to receive events.
    pub receiver: crossbeam_channel::Receiver<HistoryEvent>,
}

impl SubscriptionHandle {
    /// Receive the next event (blocking).
    pub fn recv(&self) -> Result<HistoryEvent, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive an event (non-blocking).
    pub fn try_recv(&self) -> Result<HistoryEvent, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: std::time::Duration,
    ) -> Result<HistoryEvent, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Drain everything currently buffered.
    pub fn drain(&self) -> Vec<HistoryEvent> {
        self.receiver.try_iter().collect()
    }
}
