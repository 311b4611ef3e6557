//! The snapshot store tying filtering, buckets and persistence together.

use crate::config::HistoryConfig;
use crate::error::{HistoryError, Result};
use crate::filter::PathFilter;
use crate::persistence::{document_name, BucketStorage};
use crate::subscriptions::{
    HistoryEvent, SnapshotSummary, SubscriptionConfig, SubscriptionHandle, SubscriptionId,
    SubscriptionManager,
};
use crate::types::{Document, HistoryStats, Snapshot, SnapshotId, SnapshotKind};
use crate::workspace::{WorkspaceRoot, WorkspaceRoots};
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::RwLock;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Store configuration.
#[derive(Clone, Debug, Default)]
pub struct StoreConfig {
    /// Directory holding bucket documents. `None` keeps history in memory only.
    pub path: Option<PathBuf>,

    /// Monitored workspace roots.
    pub roots: Vec<WorkspaceRoot>,

    /// User-facing options.
    pub history: HistoryConfig,
}

/// One file's history plus the document it is mirrored to.
#[derive(Clone, Debug)]
struct Bucket {
    /// Persistence document name.
    document: String,

    /// Most recent first.
    snapshots: Vec<Snapshot>,
}

/// Settings that change with configuration updates.
struct Settings {
    filter: PathFilter,
    max_per_file: usize,
}

impl Settings {
    fn from_config(config: &HistoryConfig) -> Self {
        Self {
            filter: PathFilter::from_config(config),
            max_per_file: config.max_snapshots_per_file.max(1),
        }
    }
}

/// The local history snapshot store.
///
/// Provides:
/// - Capture of document contents on save/open
/// - Per-file buckets capped at a configured size
/// - Whole-document JSON persistence per bucket
/// - Age-based pruning
/// - Change notifications
///
/// In-memory state is authoritative. Persistence failures are logged and
/// never undo or block a mutation.
pub struct HistoryStore {
    /// Bucket documents (None = memory-only).
    storage: Option<BucketStorage>,

    /// Monitored roots.
    roots: RwLock<WorkspaceRoots>,

    /// Filter and cap.
    settings: RwLock<Settings>,

    /// File path -> bucket. Every present bucket is non-empty.
    buckets: RwLock<BTreeMap<String, Bucket>>,

    /// Whether capture is enabled.
    active: AtomicBool,

    subscriptions: SubscriptionManager,
}

impl HistoryStore {
    /// Open a store, reloading any persisted buckets.
    ///
    /// Only fails if the history directory cannot be created. Unreadable
    /// documents are logged and skipped.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let history = config.history.normalized();
        let roots = WorkspaceRoots::new(config.roots);
        let settings = Settings::from_config(&history);

        let storage = match &config.path {
            Some(path) => Some(BucketStorage::new(path)?),
            None => None,
        };

        let buckets = match &storage {
            Some(storage) => Self::load_buckets(storage, &roots, settings.max_per_file),
            None => BTreeMap::new(),
        };

        info!(
            files = buckets.len(),
            snapshots = buckets.values().map(|b| b.snapshots.len()).sum::<usize>(),
            "local history loaded"
        );

        Ok(Self {
            storage,
            roots: RwLock::new(roots),
            settings: RwLock::new(settings),
            buckets: RwLock::new(buckets),
            active: AtomicBool::new(history.enabled),
            subscriptions: SubscriptionManager::new(),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory(roots: Vec<WorkspaceRoot>, history: HistoryConfig) -> Self {
        let history = history.normalized();
        Self {
            storage: None,
            roots: RwLock::new(WorkspaceRoots::new(roots)),
            settings: RwLock::new(Settings::from_config(&history)),
            buckets: RwLock::new(BTreeMap::new()),
            active: AtomicBool::new(history.enabled),
            subscriptions: SubscriptionManager::new(),
        }
    }

    /// Rebuild buckets from persisted documents.
    ///
    /// Each document becomes the bucket of its first record's path. Records
    /// for other paths are dropped, records without a locator get one from
    /// the current roots, and documents touched by either fix are rewritten.
    fn load_buckets(
        storage: &BucketStorage,
        roots: &WorkspaceRoots,
        max_per_file: usize,
    ) -> BTreeMap<String, Bucket> {
        let mut buckets: BTreeMap<String, Bucket> = BTreeMap::new();

        let report = match storage.load_all() {
            Ok(report) => report,
            Err(e) => {
                warn!(
                    path = %storage.path().display(),
                    error = %e,
                    "cannot scan local history directory"
                );
                return buckets;
            }
        };

        for (document, e) in &report.failures {
            warn!(document = %document, error = %e, "skipping unreadable local history document");
        }

        let mut dirty = BTreeSet::new();
        let mut orphaned = Vec::new();
        let mut migrated = 0usize;

        for (document, records) in report.documents {
            let Some(key) = records.first().map(|r| r.file_path.clone()) else {
                debug!(document = %document, "skipping empty local history document");
                continue;
            };

            let mut snapshots = Vec::with_capacity(records.len());
            let mut rewrite = false;

            for record in records {
                if record.file_path != key {
                    warn!(
                        document = %document,
                        expected = %key,
                        found = %record.file_path,
                        "dropping snapshot filed under another path"
                    );
                    rewrite = true;
                    continue;
                }
                if record.needs_locator() {
                    migrated += 1;
                    rewrite = true;
                }
                snapshots.push(record.into_snapshot(|path| roots.locator_for(path)));
            }

            match buckets.entry(key.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(Bucket {
                        document,
                        snapshots,
                    });
                }
                Entry::Occupied(mut slot) => {
                    let bucket = slot.get_mut();
                    bucket.snapshots.extend(snapshots);
                    bucket.snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
                    orphaned.push(document);
                    rewrite = true;
                }
            }

            if rewrite {
                dirty.insert(key);
            }
        }

        for (key, bucket) in buckets.iter_mut() {
            if bucket.snapshots.len() > max_per_file {
                bucket.snapshots.truncate(max_per_file);
                dirty.insert(key.clone());
            }
        }

        for key in &dirty {
            if let Some(bucket) = buckets.get(key) {
                if let Err(e) = storage.write(&bucket.document, &bucket.snapshots) {
                    warn!(file = %key, error = %e, "failed to rewrite migrated local history");
                }
            }
        }

        for document in orphaned {
            if let Err(e) = storage.remove(&document) {
                warn!(
                    document = %document,
                    error = %e,
                    "failed to remove merged local history document"
                );
            }
        }

        if migrated > 0 {
            info!(snapshots = migrated, "synthesized locators for legacy snapshots");
        }

        buckets
    }

    // --- Capture ---

    /// Input port for save events.
    pub fn document_saved(&self, document: &Document) -> Option<Snapshot> {
        self.capture(document, SnapshotKind::Saved)
    }

    /// Input port for open events.
    pub fn document_opened(&self, document: &Document) -> Option<Snapshot> {
        self.capture(document, SnapshotKind::Opened)
    }

    /// Capture `document` now.
    ///
    /// Returns the new snapshot, or `None` when capture is inactive, the
    /// document is outside every monitored root, or the filter rejects it.
    pub fn capture(&self, document: &Document, kind: SnapshotKind) -> Option<Snapshot> {
        self.capture_at(document, kind, Utc::now())
    }

    /// Capture with an explicit timestamp (imports and replays).
    pub fn capture_at(
        &self,
        document: &Document,
        kind: SnapshotKind,
        at: DateTime<Utc>,
    ) -> Option<Snapshot> {
        if !self.is_active() {
            debug!(file = %document.path, "local history inactive, skipping capture");
            return None;
        }

        let roots = self.roots.read();
        if roots.containing(&document.path).is_none() {
            debug!(file = %document.path, "outside monitored roots, skipping capture");
            return None;
        }

        let settings = self.settings.read();
        if !settings.filter.allows(&document.path) {
            debug!(file = %document.path, "filtered out, skipping capture");
            return None;
        }

        let file_uri = document
            .uri
            .clone()
            .unwrap_or_else(|| roots.locator_for(&document.path));
        let snapshot = Snapshot::capture(document, kind, file_uri, at);

        let bucket_len = {
            let mut buckets = self.buckets.write();
            let bucket = buckets.entry(document.path.clone()).or_insert_with(|| {
                let name = document_name(&roots.storage_key(&document.path));
                self.restore_bucket(&document.path, name, &roots)
            });

            bucket.snapshots.insert(0, snapshot.clone());
            bucket.snapshots.truncate(settings.max_per_file);
            self.persist(&document.path, bucket);

            // Published under the bucket lock so a catch-up replay sees
            // this capture either as tracked state or as a live event.
            let bucket_len = bucket.snapshots.len();
            self.subscriptions.snapshot_captured(&snapshot, bucket_len);
            bucket_len
        };

        drop(settings);
        drop(roots);

        debug!(
            file = %snapshot.file_name,
            kind = %kind,
            id = %snapshot.id,
            bucket_len,
            "snapshot captured"
        );

        Some(snapshot)
    }

    // --- Queries ---

    /// Paths with at least one snapshot, in path order.
    pub fn list_files(&self) -> Vec<String> {
        self.buckets.read().keys().cloned().collect()
    }

    /// A file's snapshots, most recent first. Empty for unknown paths.
    pub fn snapshots_for(&self, path: &str) -> Vec<Snapshot> {
        self.buckets
            .read()
            .get(path)
            .map(|bucket| bucket.snapshots.clone())
            .unwrap_or_default()
    }

    /// Most recent snapshot of a file.
    pub fn latest_for(&self, path: &str) -> Option<Snapshot> {
        self.buckets
            .read()
            .get(path)
            .and_then(|bucket| bucket.snapshots.first().cloned())
    }

    /// Find a snapshot by id across all buckets.
    pub fn snapshot_by_id(&self, id: &SnapshotId) -> Option<Snapshot> {
        self.buckets
            .read()
            .values()
            .flat_map(|bucket| bucket.snapshots.iter())
            .find(|snapshot| &snapshot.id == id)
            .cloned()
    }

    pub fn stats(&self) -> HistoryStats {
        let buckets = self.buckets.read();
        let mut stats = HistoryStats {
            total_files: buckets.len(),
            is_active: self.is_active(),
            ..Default::default()
        };

        for snapshot in buckets.values().flat_map(|b| b.snapshots.iter()) {
            stats.total_snapshots += 1;
            stats.total_bytes += snapshot.size;
        }

        stats
    }

    // --- Maintenance ---

    /// Remove snapshots older than `days` days. See
    /// [`prune_older_than_at`](Self::prune_older_than_at).
    pub fn prune_older_than(&self, days: i64) -> Result<usize> {
        self.prune_older_than_at(days, Utc::now())
    }

    /// Remove snapshots with `now - timestamp > days`, returning how many
    /// were removed.
    ///
    /// Emptied buckets leave the store and their documents are deleted;
    /// every surviving bucket's document is rewritten.
    pub fn prune_older_than_at(&self, days: i64, now: DateTime<Utc>) -> Result<usize> {
        if days <= 0 {
            return Err(HistoryError::InvalidRetention(days));
        }

        let cutoff = TimeDelta::try_days(days)
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let mut removed = 0usize;
        let mut cleared = Vec::new();

        {
            let mut buckets = self.buckets.write();

            for (path, bucket) in buckets.iter_mut() {
                let before = bucket.snapshots.len();
                bucket.snapshots.retain(|snapshot| snapshot.timestamp >= cutoff);
                removed += before - bucket.snapshots.len();

                if bucket.snapshots.is_empty() {
                    cleared.push(path.clone());
                } else {
                    self.persist(path, bucket);
                }
            }

            for path in &cleared {
                if let Some(bucket) = buckets.remove(path) {
                    self.remove_document(path, &bucket);
                }
            }

            info!(removed, cleared_files = cleared.len(), days, "local history pruned");
            self.subscriptions.pruned(removed, cleared);
        }

        Ok(removed)
    }

    /// Drop a file's whole bucket and its document. Returns false if the
    /// path had no history.
    pub fn clear_file(&self, path: &str) -> bool {
        let mut buckets = self.buckets.write();

        match buckets.remove(path) {
            Some(bucket) => {
                self.remove_document(path, &bucket);
                info!(
                    file = %path,
                    snapshots = bucket.snapshots.len(),
                    "local history cleared"
                );
                self.subscriptions.file_cleared(path);
                true
            }
            None => false,
        }
    }

    /// Forget all in-memory history (host shutdown). Persisted documents
    /// stay on disk; a later capture of a released file reads its document
    /// back before adding to it.
    pub fn clear(&self) {
        self.buckets.write().clear();
        debug!("local history released");
    }

    // --- Settings ---

    /// Toggle capture. Existing history is untouched.
    pub fn set_active(&self, active: bool) {
        let previous = self.active.swap(active, Ordering::SeqCst);
        if previous != active {
            info!(active, "local history toggled");
            self.subscriptions.active_changed(active);
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Configuration-change input port.
    ///
    /// A lower cap is not applied retroactively; each bucket shrinks on its
    /// next capture.
    pub fn apply_config(&self, config: &HistoryConfig) {
        *self.settings.write() = Settings::from_config(config);
        self.set_active(config.enabled);
    }

    /// Replace the monitored roots (workspace folders added or removed).
    pub fn set_roots(&self, roots: Vec<WorkspaceRoot>) {
        *self.roots.write() = WorkspaceRoots::new(roots);
    }

    /// Whether `path` lies under a monitored root.
    pub fn is_monitored(&self, path: &str) -> bool {
        self.roots.read().containing(path).is_some()
    }

    /// Directory of bucket documents, if persistent.
    pub fn path(&self) -> Option<&Path> {
        self.storage.as_ref().map(|s| s.path())
    }

    // --- Subscriptions ---

    /// Subscribe to change notifications.
    ///
    /// With `catch_up`, one `FileTracked` event per existing bucket is
    /// delivered before `CaughtUp` and live events.
    pub fn subscribe(&self, config: SubscriptionConfig) -> SubscriptionHandle {
        let catch_up = config.catch_up;
        let handle = self.subscriptions.subscribe(config);

        if catch_up {
            let buckets = self.buckets.read();
            let tracked = buckets.iter().map(|(path, bucket)| HistoryEvent::FileTracked {
                file_path: path.clone(),
                snapshot_count: bucket.snapshots.len(),
                latest: bucket
                    .snapshots
                    .first()
                    .map(|s| SnapshotSummary::from_snapshot(s, bucket.snapshots.len())),
            });

            if let Err(e) = self.subscriptions.replay(handle.id, tracked) {
                debug!(
                    subscription = handle.id.0,
                    error = %e,
                    "subscriber dropped during catch-up"
                );
            }
        }

        handle
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.subscriptions.unsubscribe(id);
    }

    // --- Private Helpers ---

    /// Bucket for a path with no in-memory history, seeded from its
    /// document if one is still on disk (e.g. after [`clear`](Self::clear)).
    fn restore_bucket(&self, path: &str, document: String, roots: &WorkspaceRoots) -> Bucket {
        let mut snapshots = Vec::new();

        if let Some(storage) = self.storage.as_ref().filter(|s| s.exists(&document)) {
            match storage.read(&document) {
                Ok(records) => {
                    snapshots = records
                        .into_iter()
                        .filter(|record| record.file_path == path)
                        .map(|record| record.into_snapshot(|p| roots.locator_for(p)))
                        .collect();
                    debug!(file = %path, snapshots = snapshots.len(), "restored local history");
                }
                Err(e) => {
                    warn!(file = %path, error = %e, "cannot restore local history document");
                }
            }
        }

        Bucket {
            document,
            snapshots,
        }
    }

    /// Mirror a bucket to disk; failures are logged only.
    fn persist(&self, path: &str, bucket: &Bucket) {
        let Some(storage) = &self.storage else {
            return;
        };
        if let Err(e) = storage.write(&bucket.document, &bucket.snapshots) {
            warn!(
                file = %path,
                error = %e,
                "failed to persist local history; keeping it in memory"
            );
        }
    }

    fn remove_document(&self, path: &str, bucket: &Bucket) {
        let Some(storage) = &self.storage else {
            return;
        };
        if let Err(e) = storage.remove(&bucket.document) {
            warn!(file = %path, error = %e, "failed to delete local history document");
        }
    }
}

impl Drop for HistoryStore {
    fn drop(&mut self) {
        self.subscriptions.close_all();
    }
}
