//! Per-item failure reasons.
//!
//! An [`ItemFailure`] is recorded in the manifest for its item and never
//! aborts the rest of the batch.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Why a single item produced no file.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemFailure {
    /// The fetcher finished but no matching audio file was found.
    #[error("no audio file produced")]
    MediaNotFound,

    /// The fetch exceeded its deadline.
    #[error("fetch timed out after {secs}s")]
    Timeout {
        /// Deadline in seconds.
        secs: u64,
    },

    /// The external fetch tool is not installed.
    #[error("fetch tool '{program}' not found on PATH")]
    ToolUnavailable {
        /// Program that was looked up.
        program: String,
    },

    /// The external fetch tool exited unsuccessfully.
    #[error("fetch tool failed ({status}): {detail}")]
    ToolFailed {
        /// Exit status description.
        status: String,
        /// Tail of the tool's error output.
        detail: String,
    },

    /// The batch was abandoned before the fetch finished.
    #[error("fetch cancelled")]
    Cancelled,

    /// File system error in the item directory.
    #[error("IO error: {message}")]
    Io {
        /// Error description.
        message: String,
    },

    /// Unexpected failure, including a panicking fetcher.
    #[error("internal error: {message}")]
    Internal {
        /// Error description.
        message: String,
    },
}

impl ItemFailure {
    /// Creates an IO failure from an error.
    pub fn io(error: &std::io::Error) -> Self {
        Self::Io {
            message: error.to_string(),
        }
    }

    /// Creates a timeout failure, rounding `limit` up to whole seconds.
    #[must_use]
    pub fn timeout(limit: Duration) -> Self {
        Self::Timeout {
            secs: ceil_secs(limit),
        }
    }

    /// Creates an internal failure.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the stable machine-readable code for this failure.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MediaNotFound => "MEDIA_NOT_FOUND",
            Self::Timeout { .. } => "TIMEOUT",
            Self::ToolUnavailable { .. } => "TOOL_UNAVAILABLE",
            Self::ToolFailed { .. } => "TOOL_FAILED",
            Self::Cancelled => "CANCELLED",
            Self::Io { .. } => "IO_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

/// Returns `duration` in whole seconds, rounded up.
pub(crate) fn ceil_secs(duration: Duration) -> u64 {
    duration.as_secs() + u64::from(duration.subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_failure_codes_are_distinct() {
        let failures = [
            ItemFailure::MediaNotFound,
            ItemFailure::Timeout { secs: 1 },
            ItemFailure::ToolUnavailable {
                program: "scdl".to_string(),
            },
            ItemFailure::ToolFailed {
                status: "exit status: 1".to_string(),
                detail: String::new(),
            },
            ItemFailure::Cancelled,
            ItemFailure::Io {
                message: String::new(),
            },
            ItemFailure::internal("x"),
        ];
        let mut codes: Vec<_> = failures.iter().map(ItemFailure::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), failures.len());
    }

    #[test]
    fn test_item_failure_display() {
        let failure = ItemFailure::Timeout { secs: 45 };
        assert_eq!(failure.to_string(), "fetch timed out after 45s");
    }

    #[test]
    fn test_timeout_rounds_up_to_whole_seconds() {
        assert_eq!(
            ItemFailure::timeout(Duration::from_millis(50)),
            ItemFailure::Timeout { secs: 1 }
        );
        assert_eq!(
            ItemFailure::timeout(Duration::from_millis(1500)),
            ItemFailure::Timeout { secs: 2 }
        );
        assert_eq!(
            ItemFailure::timeout(Duration::from_secs(45)),
            ItemFailure::Timeout { secs: 45 }
        );
        assert_eq!(ceil_secs(Duration::ZERO), 0);
    }
}
