//! Bucket document storage implementation.

use crate::error::{HistoryError, Result};
use crate::types::{display_name, Snapshot, SnapshotId, SnapshotKind};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

/// Extension of bucket documents.
const DOCUMENT_EXT: &str = "json";

/// Document name (without extension) for a storage key.
pub fn document_name(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    hex::encode(hasher.finalize())
}

/// A snapshot as read back from disk.
///
/// Older documents may lack `fileUri` (and other derived fields); those
/// are filled in by [`StoredSnapshot::into_snapshot`].
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSnapshot {
    pub id: SnapshotId,
    pub file_path: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_uri: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type", default)]
    pub kind: SnapshotKind,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub line_count: Option<u64>,
}

impl StoredSnapshot {
    /// Whether this record predates resource locators.
    pub fn needs_locator(&self) -> bool {
        self.file_uri.is_none()
    }

    /// Convert to a [`Snapshot`], synthesizing a missing locator with
    /// `locator_for`.
    pub fn into_snapshot(self, locator_for: impl FnOnce(&str) -> String) -> Snapshot {
        let file_uri = match self.file_uri {
            Some(uri) => uri,
            None => locator_for(&self.file_path),
        };
        let file_name = self
            .file_name
            .unwrap_or_else(|| display_name(&self.file_path).to_string());
        let size = self.size.unwrap_or(self.content.len() as u64);
        let line_count = self
            .line_count
            .unwrap_or(self.content.split('\n').count() as u64);

        Snapshot {
            id: self.id,
            file_path: self.file_path,
            file_name,
            file_uri,
            content: self.content,
            timestamp: self.timestamp,
            kind: self.kind,
            size,
            line_count,
        }
    }
}

/// Result of scanning the storage directory at startup.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Parsed documents: (document name, records in stored order).
    pub documents: Vec<(String, Vec<StoredSnapshot>)>,

    /// Documents that could not be read or parsed.
    pub failures: Vec<(String, HistoryError)>,
}

/// Directory of bucket documents.
pub struct BucketStorage {
    /// Base directory.
    path: PathBuf,
}

impl BucketStorage {
    /// Open (creating if needed) storage rooted at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    /// Overwrite a document with the full bucket.
    pub fn write(&self, name: &str, snapshots: &[Snapshot]) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(snapshots)
            .map_err(|e| HistoryError::Serialization(e.to_string()))?;
        fs::write(self.document_path(name), bytes)?;
        Ok(())
    }

    /// Read a single document.
    pub fn read(&self, name: &str) -> Result<Vec<StoredSnapshot>> {
        let bytes = fs::read(self.document_path(name))?;
        let records = serde_json::from_slice(&bytes)
            .map_err(|e| HistoryError::Deserialization(format!("{name}: {e}")))?;
        Ok(records)
    }

    /// Delete a document. Returns false if it did not exist.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let path = self.document_path(name);
        if path.exists() {
            fs::remove_file(&path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn exists(&self, name: &str) -> bool {
        self.document_path(name).exists()
    }

    /// Names of all documents in the directory.
    pub fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();

        for entry in fs::read_dir(&self.path)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DOCUMENT_EXT) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }

        names.sort();
        Ok(names)
    }

    /// Read every document, collecting per-document failures instead of
    /// aborting.
    pub fn load_all(&self) -> Result<LoadReport> {
        let mut report = LoadReport::default();

        for name in self.list()? {
            match self.read(&name) {
                Ok(records) => report.documents.push((name, records)),
                Err(e) => report.failures.push((name, e)),
            }
        }

        Ok(report)
    }

    /// Total size of all documents in bytes.
    pub fn total_size(&self) -> Result<u64> {
        let mut total = 0u64;
        for name in self.list()? {
            total += fs::metadata(self.document_path(&name))?.len();
        }
        Ok(total)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn document_path(&self, name: &str) -> PathBuf {
        self.path.join(format!("{name}.{DOCUMENT_EXT}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Document;
    use tempfile::TempDir;

    fn snapshot(path: &str, text: &str) -> Snapshot {
        let doc = Document::new(path, text);
        Snapshot::capture(&doc, SnapshotKind::Saved, format!("file://{path}"), Utc::now())
    }

    #[test]
    fn test_document_name_is_hex_sha256() {
        let name = document_name("|/w/a.txt");
        assert_eq!(name.len(), 64);
        assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(name, document_name("wsl+Ubuntu|/w/a.txt"));
    }

    #[test]
    fn test_write_and_read() {
        let dir = TempDir::new().unwrap();
        let storage = BucketStorage::new(dir.path().join("history")).unwrap();

        let bucket = vec![snapshot("/w/a.txt", "two"), snapshot("/w/a.txt", "one")];
        let name = document_name("|/w/a.txt");
        storage.write(&name, &bucket).unwrap();

        let records = storage.read(&name).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].content, "two");
        assert_eq!(records[1].content, "one");
        assert!(!records[0].needs_locator());
    }

    #[test]
    fn test_overwrite_replaces_document() {
        let dir = TempDir::new().unwrap();
        let storage = BucketStorage::new(dir.path()).unwrap();

        storage.write("doc", &[snapshot("/w/a.txt", "1"), snapshot("/w/a.txt", "2")]).unwrap();
        storage.write("doc", &[snapshot("/w/a.txt", "3")]).unwrap();

        let records = storage.read("doc").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].content, "3");
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let storage = BucketStorage::new(dir.path()).unwrap();

        storage.write("doc", &[snapshot("/w/a.txt", "x")]).unwrap();
        assert!(storage.exists("doc"));
        assert!(storage.remove("doc").unwrap());
        assert!(!storage.exists("doc"));
        assert!(!storage.remove("doc").unwrap());
    }

    #[test]
    fn test_list_ignores_other_files() {
        let dir = TempDir::new().unwrap();
        let storage = BucketStorage::new(dir.path()).unwrap();

        storage.write("aaa", &[snapshot("/w/a.txt", "x")]).unwrap();
        storage.write("bbb", &[snapshot("/w/b.txt", "y")]).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::create_dir(dir.path().join("nested.json")).unwrap();

        assert_eq!(storage.list().unwrap(), vec!["aaa", "bbb"]);
    }

    #[test]
    fn test_load_all_collects_failures() {
        let dir = TempDir::new().unwrap();
        let storage = BucketStorage::new(dir.path()).unwrap();

        storage.write("good", &[snapshot("/w/a.txt", "x")]).unwrap();
        fs::write(dir.path().join("bad.json"), "{ not json").unwrap();

        let report = storage.load_all().unwrap();
        assert_eq!(report.documents.len(), 1);
        assert_eq!(report.documents[0].0, "good");
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].0, "bad");
        assert!(matches!(report.failures[0].1, HistoryError::Deserialization(_)));
    }

    #[test]
    fn test_legacy_record_fills_missing_fields() {
        let raw = r#"[{
            "id": "snapshot_1_abc",
            "filePath": "/w/src/lib.rs",
            "content": "a\nb",
            "timestamp": "2024-01-01T00:00:00Z",
            "type": "opened"
        }]"#;
        let records: Vec<StoredSnapshot> = serde_json::from_str(raw).unwrap();
        assert!(records[0].needs_locator());

        let snapshot = records
            .into_iter()
            .next()
            .unwrap()
            .into_snapshot(|p| format!("file://{p}"));

        assert_eq!(snapshot.file_uri, "file:///w/src/lib.rs");
        assert_eq!(snapshot.file_name, "lib.rs");
        assert_eq!(snapshot.size, 3);
        assert_eq!(snapshot.line_count, 2);
        assert_eq!(snapshot.kind, SnapshotKind::Opened);
    }

    #[test]
    fn test_total_size() {
        let dir = TempDir::new().unwrap();
        let storage = BucketStorage::new(dir.path()).unwrap();
        assert_eq!(storage.total_size().unwrap(), 0);

        storage.write("doc", &[snapshot("/w/a.txt", "content")]).unwrap();
        assert!(storage.total_size().unwrap() > 0);
    }
}
