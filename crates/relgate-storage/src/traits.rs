use std::future::Future;
use std::time::Duration;

use relgate_core::{MappingRecord, RelationTuple};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    #[error("malformed data at '{key}': {reason}")]
    Malformed { key: String, reason: String },

    #[error("internal storage error: {0}")]
    Internal(String),
}

/// Everything a snapshot is built from, as read in one pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreContents {
    pub mappings: Vec<MappingRecord>,
    pub tuples: Vec<RelationTuple>,
}

pub trait SnapshotSource: Send + Sync {
    fn load(&self) -> impl Future<Output = Result<StoreContents, StorageError>> + Send;
}

/// Fleet-wide "data changed" signal. The value only ever grows; a reader
/// that sees a value different from the one it last acted on must reload.
pub trait InvalidationMarker: Send + Sync {
    fn read_marker(&self) -> impl Future<Output = Result<Option<u64>, StorageError>> + Send;

    fn bump_marker(&self) -> impl Future<Output = Result<u64, StorageError>> + Send;
}

/// Expiring key/value markers used for revocation. Keys are built by
/// [`crate::KeySpace`].
pub trait RevocationStore: Send + Sync {
    fn put_marker(
        &self,
        key: &str,
        value: i64,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    fn get_marker(&self, key: &str)
    -> impl Future<Output = Result<Option<i64>, StorageError>> + Send;

    fn delete_marker(&self, key: &str) -> impl Future<Output = Result<bool, StorageError>> + Send;
}
