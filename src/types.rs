//! Core types for the local history store.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// URI scheme used for locators that point at snapshot content.
pub const SNAPSHOT_SCHEME: &str = "local-history";

const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
const ID_SUFFIX_LEN: usize = 9;

/// Unique identifier for a snapshot.
///
/// Derived from the capture time plus a random base-36 suffix, e.g.
/// `snapshot_1760000000000_k3j9x0q2a`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SnapshotId(pub String);

impl SnapshotId {
    /// Generate a fresh id for a snapshot taken at `at`.
    pub fn generate(at: DateTime<Utc>) -> Self {
        let mut rng = rand::rng();
        let suffix: String = (0..ID_SUFFIX_LEN)
            .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
            .collect();
        SnapshotId(format!("snapshot_{}_{}", at.timestamp_millis(), suffix))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SnapshotId {
    fn from(s: &str) -> Self {
        SnapshotId(s.to_string())
    }
}

impl fmt::Debug for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SnapshotId({})", self.0)
    }
}

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What triggered a capture.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotKind {
    #[default]
    Saved,
    Opened,
    External,
    Manual,
}

impl SnapshotKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotKind::Saved => "saved",
            SnapshotKind::Opened => "opened",
            SnapshotKind::External => "external",
            SnapshotKind::Manual => "manual",
        }
    }
}

impl fmt::Display for SnapshotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A captured copy of a file's full text at one point in time.
///
/// Never mutated after creation. Field names serialize in camelCase,
/// which is also the on-disk schema of bucket documents.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub id: SnapshotId,

    /// Key of the bucket this snapshot belongs to.
    pub file_path: String,

    /// Display name (last path component).
    pub file_name: String,

    /// Resource locator of the live file.
    pub file_uri: String,

    pub content: String,

    pub timestamp: DateTime<Utc>,

    #[serde(rename = "type")]
    pub kind: SnapshotKind,

    /// Content length in bytes.
    pub size: u64,

    pub line_count: u64,
}

impl Snapshot {
    /// Build a snapshot of `document` taken at `at`, using `file_uri` as the
    /// live-file locator.
    pub fn capture(
        document: &Document,
        kind: SnapshotKind,
        file_uri: String,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: SnapshotId::generate(at),
            file_path: document.path.clone(),
            file_name: document.file_name.clone(),
            file_uri,
            content: document.text.clone(),
            timestamp: at,
            kind,
            size: document.text.len() as u64,
            line_count: document.line_count,
        }
    }

    /// Locator addressing this snapshot's content (for diff views).
    pub fn content_locator(&self) -> String {
        format!("{}:/{}?id={}", SNAPSHOT_SCHEME, self.file_name, self.id)
    }
}

/// Handle for a text document offered to the store for capture.
#[derive(Clone, Debug)]
pub struct Document {
    pub path: String,
    pub file_name: String,
    /// Resource locator supplied by the host; derived from the workspace
    /// roots when absent.
    pub uri: Option<String>,
    pub text: String,
    pub line_count: u64,
}

impl Document {
    /// Create a document from a path and its full text.
    pub fn new(path: impl Into<String>, text: impl Into<String>) -> Self {
        let path = path.into();
        let text = text.into();
        Self {
            file_name: display_name(&path).to_string(),
            line_count: count_lines(&text),
            uri: None,
            path,
            text,
        }
    }

    /// Attach the host's resource locator.
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    /// Override the line count (hosts that already know it).
    pub fn with_line_count(mut self, line_count: u64) -> Self {
        self.line_count = line_count;
        self
    }
}

/// Last component of a path, accepting both separator styles.
pub fn display_name(path: &str) -> &str {
    path.rsplit(['/', '\\'])
        .find(|segment| !segment.is_empty())
        .unwrap_or(path)
}

/// Editor-style line count: an empty buffer still has one line.
fn count_lines(text: &str) -> u64 {
    text.split('\n').count() as u64
}

/// Store statistics.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total_files: usize,
    pub total_snapshots: usize,
    /// Sum of snapshot content sizes.
    pub total_bytes: u64,
    pub is_active: bool,
}
