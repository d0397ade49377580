//! Batch-level error type returned to callers of the orchestrator.
//!
//! Per-item problems never surface here; they are recorded as
//! [`ItemFailure`](crate::pool::ItemFailure)s in the manifest. A `BatchError`
//! means the batch as a whole did not produce an archive.

use thiserror::Error;

use crate::archive::ArchiveError;
use crate::fetch::FetchError;
use crate::storage::{CredentialError, StorageError};

/// Errors that abort an entire batch.
#[derive(Debug, Error)]
pub enum BatchError {
    /// The request was rejected before any work started.
    #[error("{0}")]
    Validation(String),

    /// An outbound API call failed.
    #[error(transparent)]
    Upstream(#[from] FetchError),

    /// Every item in the batch failed.
    #[error("all {total} downloads failed")]
    AllDownloadsFailed {
        /// Number of items in the batch.
        total: usize,
    },

    /// Uploading or presigning the archive failed.
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Client credentials could not be obtained.
    #[error(transparent)]
    CredentialUnavailable(#[from] CredentialError),

    /// Packaging the archive failed.
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// The batch exceeded its overall deadline.
    #[error("batch timed out after {secs}s")]
    BatchTimedOut {
        /// Configured deadline in seconds.
        secs: u64,
    },

    /// Unexpected failure; the original message is preserved.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BatchError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns the stable machine-readable code for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Upstream(_) => "UPSTREAM_ERROR",
            Self::AllDownloadsFailed { .. } => "ALL_DOWNLOADS_FAILED",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::CredentialUnavailable(_) => "CREDENTIAL_UNAVAILABLE",
            Self::Archive(_) => "ARCHIVE_ERROR",
            Self::BatchTimedOut { .. } => "BATCH_TIMED_OUT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status class a request surface should answer with.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Upstream(_) => 502,
            Self::BatchTimedOut { .. } => 504,
            Self::AllDownloadsFailed { .. }
            | Self::Storage(_)
            | Self::CredentialUnavailable(_)
            | Self::Archive(_)
            | Self::Internal(_) => 500,
        }
    }

    /// Returns true if the caller's input was at fault.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.http_status() < 500
    }
}
