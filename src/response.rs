//! JSON bodies returned by the batch request surface.

use serde::{Deserialize, Serialize};

use crate::aggregate::Manifest;
use crate::error::BatchError;

/// Successful batch response: the download URL plus the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResponse {
    /// Time-limited archive download URL.
    pub download_url: String,
    /// URL lifetime in seconds.
    pub expires_in: u64,
    /// Per-item results.
    #[serde(flatten)]
    pub manifest: Manifest,
}

/// Error payload: `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error details.
    pub error: ErrorBody,
}

/// Code and message of an [`ErrorResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Stable machine-readable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

impl ErrorResponse {
    /// Creates an error response from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}

impl From<&BatchError> for ErrorResponse {
    fn from(error: &BatchError) -> Self {
        Self::new(error.code(), error.to_string())
    }
}
