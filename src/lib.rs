//! # Local History
//!
//! Keeps a per-file history of document contents, captured whenever a
//! file in a monitored workspace is saved or opened, so earlier versions
//! can be listed and diffed later.
//!
//! ## Core Concepts
//!
//! - **Snapshots**: Immutable full-text copies tagged with what triggered them
//! - **Buckets**: One file's snapshots, most recent first, capped in length
//! - **Store**: All buckets in memory, mirrored to one JSON document per file
//! - **Pruning**: Age-based removal of old snapshots
//!
//! ## Example
//!
//! ```ignore
//! use local_history::{Document, HistoryConfig, HistoryStore, StoreConfig, WorkspaceRoot};
//!
//! let store = HistoryStore::open(StoreConfig {
//!     path: Some("./.history".into()),
//!     roots: vec![WorkspaceRoot::local("/home/me/project")],
//!     history: HistoryConfig::default(),
//! })?;
//!
//! // Wire the host's save event to the store
//! store.document_saved(&Document::new("/home/me/project/src/main.rs", text));
//!
//! for snapshot in store.snapshots_for("/home/me/project/src/main.rs") {
//!     println!("{} {}", snapshot.timestamp, snapshot.kind);
//! }
//!
//! // Drop anything older than a month
//! store.prune_older_than(30)?;
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod filter;
pub mod persistence;
pub mod store;
pub mod subscriptions;
pub mod types;
pub mod workspace;

// Re-exports
pub use commands::{
    format_age, DiffRequest, DiffSide, FileHistory, HistoryCommands, HistorySummary, Retention,
};
pub use config::{HistoryConfig, DEFAULT_MAX_SNAPSHOTS_PER_FILE};
pub use error::{HistoryError, Result};
pub use filter::PathFilter;
pub use persistence::{BucketStorage, StoredSnapshot};
pub use store::{HistoryStore, StoreConfig};
pub use subscriptions::{
    DropReason, HistoryEvent, SnapshotSummary, SubscriptionConfig, SubscriptionFilter,
    SubscriptionHandle, SubscriptionId,
};
pub use types::*;
pub use workspace::{WorkspaceRoot, WorkspaceRoots};
