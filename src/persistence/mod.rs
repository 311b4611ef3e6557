//! Bucket persistence.
//!
//! Each file's bucket is mirrored to one JSON document holding the whole
//! snapshot array, most recent first. Documents are named by the SHA-256
//! of the bucket's storage key, so paths never leak into file names.
//! Every mutation rewrites the whole document; there is no append path.

mod storage;

pub use storage::{document_name, BucketStorage, LoadReport, StoredSnapshot};
