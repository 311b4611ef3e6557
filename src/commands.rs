//! Commands offered to presentation layers.
//!
//! Everything here reads the store; the only mutation is [`HistoryCommands::cleanup`].
//! Diff commands do not render anything. They return a [`DiffRequest`]
//! naming both sides so the host can open its own diff view.

use crate::error::{HistoryError, Result};
use crate::store::HistoryStore;
use crate::types::{Snapshot, SnapshotId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// How many files the statistics report lists by name.
const REPORT_FILE_LIMIT: usize = 5;

/// Retention presets offered by the cleanup command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Retention {
    Week,
    Month,
}

impl Retention {
    pub fn days(self) -> i64 {
        match self {
            Retention::Week => 7,
            Retention::Month => 30,
        }
    }
}

/// Per-file line of the history summary.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHistory {
    pub file_path: String,
    pub file_name: String,
    pub snapshot_count: usize,
    pub latest: Option<DateTime<Utc>>,
}

/// Result of the open-history command.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistorySummary {
    pub total_files: usize,
    pub total_snapshots: usize,
    pub is_active: bool,
    /// Most recently touched first.
    pub files: Vec<FileHistory>,
}

impl fmt::Display for HistorySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Local History Statistics")?;
        writeln!(f)?;
        writeln!(f, "Tracked files: {}", self.total_files)?;
        writeln!(f, "Total snapshots: {}", self.total_snapshots)?;
        let status = if self.is_active { "active" } else { "inactive" };
        writeln!(f, "Status: {status}")?;

        if self.files.is_empty() {
            return Ok(());
        }

        writeln!(f)?;
        writeln!(f, "Files with snapshots:")?;
        for file in self.files.iter().take(REPORT_FILE_LIMIT) {
            writeln!(f, "- {} ({} snapshots)", file.file_name, file.snapshot_count)?;
        }
        if self.files.len() > REPORT_FILE_LIMIT {
            let more = self.files.len() - REPORT_FILE_LIMIT;
            writeln!(f, "... and {more} more files")?;
        }
        Ok(())
    }
}

/// One side of a diff.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiffSide {
    pub label: String,
    pub locator: String,
    /// Text for the side. `None` means the host reads the live file.
    pub content: Option<String>,
}

impl DiffSide {
    fn snapshot(snapshot: &Snapshot) -> Self {
        Self {
            label: format!(
                "{} ({})",
                snapshot.timestamp.format("%Y-%m-%d %H:%M:%S"),
                snapshot.kind
            ),
            locator: snapshot.content_locator(),
            content: Some(snapshot.content.clone()),
        }
    }
}

/// Request for the host to show a side-by-side diff.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DiffRequest {
    pub title: String,
    pub left: DiffSide,
    pub right: DiffSide,
}

/// Command handlers over a borrowed store.
pub struct HistoryCommands<'a> {
    store: &'a HistoryStore,
}

impl<'a> HistoryCommands<'a> {
    pub fn new(store: &'a HistoryStore) -> Self {
        Self { store }
    }

    /// Totals plus one line per tracked file.
    pub fn open_history_summary(&self) -> HistorySummary {
        let stats = self.store.stats();

        let mut files: Vec<FileHistory> = self
            .store
            .list_files()
            .into_iter()
            .map(|path| {
                let snapshots = self.store.snapshots_for(&path);
                FileHistory {
                    file_name: snapshots
                        .first()
                        .map(|s| s.file_name.clone())
                        .unwrap_or_else(|| crate::types::display_name(&path).to_string()),
                    snapshot_count: snapshots.len(),
                    latest: snapshots.first().map(|s| s.timestamp),
                    file_path: path,
                }
            })
            .collect();

        files.sort_by(|a, b| b.latest.cmp(&a.latest));

        HistorySummary {
            total_files: stats.total_files,
            total_snapshots: stats.total_snapshots,
            is_active: stats.is_active,
            files,
        }
    }

    /// Plain-text statistics report.
    pub fn show_statistics(&self) -> String {
        self.open_history_summary().to_string()
    }

    /// Prune with a preset window.
    pub fn cleanup(&self, retention: Retention) -> Result<usize> {
        self.store.prune_older_than(retention.days())
    }

    /// Latest snapshot of `path` against the live file.
    ///
    /// `live_text` is the editor's current buffer when the host has one;
    /// without it the host loads the file from the locator.
    pub fn diff_with_latest(&self, path: &str, live_text: Option<String>) -> Result<DiffRequest> {
        let latest = self
            .store
            .latest_for(path)
            .ok_or_else(|| HistoryError::NoSnapshots(path.to_string()))?;

        Ok(DiffRequest {
            title: format!("{} (snapshot ↔ current)", latest.file_name),
            left: DiffSide::snapshot(&latest),
            right: DiffSide {
                label: "current".to_string(),
                locator: latest.file_uri.clone(),
                content: live_text,
            },
        })
    }

    /// Two snapshots of the same file, older on the left.
    pub fn diff_pair(&self, older: &SnapshotId, newer: &SnapshotId) -> Result<DiffRequest> {
        let left = self.find(older)?;
        let right = self.find(newer)?;

        if left.file_path != right.file_path {
            return Err(HistoryError::MismatchedFiles {
                left: left.file_path,
                right: right.file_path,
            });
        }

        let (left, right) = if left.timestamp <= right.timestamp {
            (left, right)
        } else {
            (right, left)
        };

        Ok(DiffRequest {
            title: format!("{} ({} ↔ {})", left.file_name, short_time(&left), short_time(&right)),
            left: DiffSide::snapshot(&left),
            right: DiffSide::snapshot(&right),
        })
    }

    /// A snapshot against the one captured just before it.
    pub fn diff_with_previous(&self, id: &SnapshotId) -> Result<DiffRequest> {
        let selected = self.find(id)?;
        let bucket = self.store.snapshots_for(&selected.file_path);

        let previous = bucket
            .iter()
            .position(|s| &s.id == id)
            .and_then(|index| bucket.get(index + 1))
            .ok_or_else(|| HistoryError::NoPreviousSnapshot(id.clone()))?;

        self.diff_pair(&previous.id, id)
    }

    fn find(&self, id: &SnapshotId) -> Result<Snapshot> {
        self.store
            .snapshot_by_id(id)
            .ok_or_else(|| HistoryError::SnapshotNotFound(id.clone()))
    }
}

fn short_time(snapshot: &Snapshot) -> String {
    snapshot.timestamp.format("%H:%M:%S").to_string()
}

/// Human-readable age of a timestamp.
pub fn format_age(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(timestamp);
    let minutes = elapsed.num_minutes();

    if minutes < 1 {
        "just now".to_string()
    } else if minutes < 60 {
        format!("{minutes}min ago")
    } else if elapsed.num_hours() < 24 {
        format!("{}h ago", elapsed.num_hours())
    } else {
        format!("{}d ago", elapsed.num_days())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HistoryConfig;
    use crate::types::{Document, SnapshotKind};
    use crate::workspace::WorkspaceRoot;
    use chrono::TimeDelta;

    fn store() -> HistoryStore {
        HistoryStore::in_memory(vec![WorkspaceRoot::local("/work")], HistoryConfig::default())
    }

    #[test]
    fn test_summary_orders_by_latest() {
        let store = store();
        let now = Utc::now();
        let earlier = now - TimeDelta::try_hours(2).unwrap();
        store.capture_at(&Document::new("/work/a.txt", "a"), SnapshotKind::Saved, earlier);
        store.capture_at(&Document::new("/work/b.txt", "b"), SnapshotKind::Saved, now);

        let summary = HistoryCommands::new(&store).open_history_summary();
        assert_eq!(summary.total_files, 2);
        assert_eq!(summary.total_snapshots, 2);
        assert_eq!(summary.files[0].file_name, "b.txt");
        assert_eq!(summary.files[1].file_name, "a.txt");
    }

    #[test]
    fn test_statistics_truncates_file_list() {
        let store = store();
        for i in 0..7 {
            store.document_saved(&Document::new(format!("/work/f{i}.txt"), "x"));
        }

        let report = HistoryCommands::new(&store).show_statistics();
        assert!(report.contains("Tracked files: 7"));
        assert!(report.contains("Status: active"));
        assert_eq!(report.matches(" snapshots)").count(), 5);
        assert!(report.contains("... and 2 more files"));
    }

    #[test]
    fn test_statistics_renders_summary() {
        let store = store();
        store.document_saved(&Document::new("/work/a.txt", "x"));
        store.set_active(false);

        let commands = HistoryCommands::new(&store);
        let report = commands.show_statistics();
        assert_eq!(report, commands.open_history_summary().to_string());
        assert!(report.starts_with("Local History Statistics\n\n"));
        assert!(report.contains("Status: inactive"));
        assert!(report.ends_with("- a.txt (1 snapshots)\n"));
    }

    #[test]
    fn test_statistics_empty() {
        let store = store();
        let report = HistoryCommands::new(&store).show_statistics();
        assert!(report.contains("Total snapshots: 0"));
        assert!(!report.contains("Files with snapshots"));
    }

    #[test]
    fn test_cleanup_presets() {
        assert_eq!(Retention::Week.days(), 7);
        assert_eq!(Retention::Month.days(), 30);

        let store = store();
        let old = Utc::now() - TimeDelta::try_days(10).unwrap();
        store.capture_at(&Document::new("/work/a.txt", "x"), SnapshotKind::Saved, old);

        let commands = HistoryCommands::new(&store);
        assert_eq!(commands.cleanup(Retention::Month).unwrap(), 0);
        assert_eq!(commands.cleanup(Retention::Week).unwrap(), 1);
        assert!(store.list_files().is_empty());
    }

    #[test]
    fn test_diff_with_latest() {
        let store = store();
        store.document_saved(&Document::new("/work/a.txt", "saved"));

        let request = HistoryCommands::new(&store)
            .diff_with_latest("/work/a.txt", Some("edited".to_string()))
            .unwrap();

        assert_eq!(request.left.content.as_deref(), Some("saved"));
        assert!(request.left.locator.starts_with("local-history:/a.txt?id="));
        assert_eq!(request.right.locator, "file:///work/a.txt");
        assert_eq!(request.right.content.as_deref(), Some("edited"));
    }

    #[test]
    fn test_diff_with_latest_unknown_file() {
        let store = store();
        let result = HistoryCommands::new(&store).diff_with_latest("/work/none.txt", None);
        assert!(matches!(result, Err(HistoryError::NoSnapshots(_))));
    }

    #[test]
    fn test_diff_with_previous() {
        let store = store();
        let now = Utc::now();
        let first = store
            .capture_at(
                &Document::new("/work/a.txt", "v1"),
                SnapshotKind::Saved,
                now - TimeDelta::try_minutes(5).unwrap(),
            )
            .unwrap();
        let second = store
            .capture_at(&Document::new("/work/a.txt", "v2"), SnapshotKind::Saved, now)
            .unwrap();

        let commands = HistoryCommands::new(&store);
        let request = commands.diff_with_previous(&second.id).unwrap();
        assert_eq!(request.left.content.as_deref(), Some("v1"));
        assert_eq!(request.right.content.as_deref(), Some("v2"));

        assert!(matches!(
            commands.diff_with_previous(&first.id),
            Err(HistoryError::NoPreviousSnapshot(_))
        ));
    }

    #[test]
    fn test_diff_pair_orders_and_validates() {
        let store = store();
        let now = Utc::now();
        let older = store
            .capture_at(
                &Document::new("/work/a.txt", "v1"),
                SnapshotKind::Saved,
                now - TimeDelta::try_minutes(1).unwrap(),
            )
            .unwrap();
        let newer = store
            .capture_at(&Document::new("/work/a.txt", "v2"), SnapshotKind::Saved, now)
            .unwrap();
        let other = store.document_saved(&Document::new("/work/b.txt", "b")).unwrap();

        let commands = HistoryCommands::new(&store);
        let request = commands.diff_pair(&newer.id, &older.id).unwrap();
        assert_eq!(request.left.content.as_deref(), Some("v1"));

        assert!(matches!(
            commands.diff_pair(&older.id, &other.id),
            Err(HistoryError::MismatchedFiles { .. })
        ));
        assert!(matches!(
            commands.diff_pair(&older.id, &SnapshotId::from("missing")),
            Err(HistoryError::SnapshotNotFound(_))
        ));
    }

    #[test]
    fn test_format_age() {
        let now = Utc::now();
        assert_eq!(format_age(now, now), "just now");
        assert_eq!(format_age(now - TimeDelta::try_minutes(5).unwrap(), now), "5min ago");
        assert_eq!(format_age(now - TimeDelta::try_hours(3).unwrap(), now), "3h ago");
        assert_eq!(format_age(now - TimeDelta::try_days(2).unwrap(), now), "2d ago");
    }
}
