//! Change notifications for the history store.
//!
//! Presentation layers subscribe here to learn when snapshots are
//! captured, when history is pruned or cleared, and when capture is
//! switched on or off.
//!
//! Subscriptions support:
//! - Filtering by file path and event family
//! - Catch-up replay of the files already tracked
//! - Bounded buffers with slow-subscriber dropping
//!
//! # Example
//!
//! ```ignore
//! let handle = store.subscribe(SubscriptionConfig {
//!     filter: SubscriptionFilter::files(vec!["/work/src/main.rs".to_string()]),
//!     ..Default::default()
//! });
//!
//! loop {
//!     match handle.recv() {
//!         Ok(HistoryEvent::SnapshotCaptured { snapshot }) => refresh(&snapshot.file_path),
//!         Ok(HistoryEvent::Dropped { .. }) | Err(_) => break,
//!         Ok(_) => {}
//!     }
//! }
//! ```

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{
    DropReason, HistoryEvent, SnapshotSummary, SubscriptionConfig, SubscriptionFilter,
    SubscriptionHandle, SubscriptionId,
};
