//! Storage error types.

use gstjob_common::error::JobError;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while talking to the object store or writing output.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to configure storage client: {0}")]
    ConfigError(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Upload of '{key}' failed: {message}")]
    UploadFailed { key: String, message: String },

    #[error("Download of '{key}' failed: {message}")]
    DownloadFailed { key: String, message: String },

    #[error("Composing '{key}' failed: {message}")]
    ComposeFailed { key: String, message: String },

    #[error("Delete of '{key}' failed: {message}")]
    DeleteFailed { key: String, message: String },

    #[error("Presign failed: {0}")]
    PresignFailed(String),

    #[error("Composed '{key}' but failed to remove {failed} temporary part(s): {message}")]
    CleanupFailed {
        key: String,
        failed: usize,
        message: String,
    },

    #[error("Writer for '{0}' is already finished")]
    WriterFinished(String),

    #[error("Writing {len} bytes at {position} overflows the size of '{key}'")]
    CursorOverflow { key: String, position: u64, len: usize },
}

impl StorageError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn upload_failed(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::UploadFailed {
            key: key.into(),
            message: msg.into(),
        }
    }

    pub fn download_failed(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::DownloadFailed {
            key: key.into(),
            message: msg.into(),
        }
    }

    pub fn compose_failed(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::ComposeFailed {
            key: key.into(),
            message: msg.into(),
        }
    }

    pub fn delete_failed(key: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::DeleteFailed {
            key: key.into(),
            message: msg.into(),
        }
    }
}

impl From<StorageError> for JobError {
    fn from(err: StorageError) -> Self {
        JobError::storage(err.to_string())
    }
}
