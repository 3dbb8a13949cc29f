use relgate_storage::StorageError;

use crate::cache::ReloadError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("cache reload failed: {0}")]
    Reload(#[from] ReloadError),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}
