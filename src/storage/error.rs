//! Error types for archive handoff and credential retrieval.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised by an [`ObjectStore`](super::ObjectStore).
#[derive(Debug, Error)]
pub enum StorageError {
    /// The object key is empty, absolute, or escapes the store root.
    #[error("invalid object key: {key}")]
    InvalidKey {
        /// The rejected key.
        key: String,
    },

    /// No object exists under the key.
    #[error("object not found: {key}")]
    NotFound {
        /// The missing key.
        key: String,
    },

    /// An object already exists under the key; stores never overwrite.
    #[error("object already exists: {key}")]
    AlreadyExists {
        /// The occupied key.
        key: String,
    },

    /// File system error while storing or reading an object.
    #[error("storage IO error at {path}: {source}")]
    Io {
        /// The path involved.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A download URL could not be issued for the object.
    #[error("cannot issue URL for {path}")]
    Url {
        /// The object path.
        path: PathBuf,
    },
}

impl StorageError {
    /// Creates an invalid key error.
    pub fn invalid_key(key: impl Into<String>) -> Self {
        Self::InvalidKey { key: key.into() }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised by a [`CredentialProvider`](super::CredentialProvider).
#[derive(Debug, Error)]
pub enum CredentialError {
    /// A required secret is not set.
    #[error("credential {name} is not set")]
    Missing {
        /// Name of the missing secret.
        name: String,
    },

    /// The secret backend could not be reached.
    #[error("credential backend unavailable: {message}")]
    Backend {
        /// Backend failure description.
        message: String,
    },
}
