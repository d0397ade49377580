//! Archive handoff: durable object storage and API credentials.
//!
//! # Architecture
//!
//! - [`ObjectStore`] - Async trait for uploading an archive and issuing a download URL
//! - [`LocalObjectStore`] - Directory-backed implementation with `file://` URLs
//! - [`CredentialProvider`] - Async trait yielding API client credentials
//! - [`EnvCredentialProvider`] - Environment-backed implementation, cached per provider
//! - [`archive_key`] - Builds the storage key for a batch archive

mod credentials;
mod error;
mod local;

pub use credentials::{
    CLIENT_ID_VAR, CLIENT_SECRET_VAR, ClientCredentials, CredentialProvider, EnvCredentialProvider,
};
pub use error::{CredentialError, StorageError};
pub use local::LocalObjectStore;

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Default lifetime of an issued download URL.
pub const DEFAULT_PRESIGN_TTL: Duration = Duration::from_secs(3600);

/// Durable storage for finished archives.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads the file at `local` under `key` and returns the stored key.
    async fn put(&self, local: &Path, key: &str) -> Result<String, StorageError>;

    /// Issues a time-limited download URL for `key`.
    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StorageError>;
}

/// Returns the storage key `downloads/<owner>_<YYYYmmdd_HHMMSS>_<batch_id>/<file_name>`.
///
/// `batch_id` keeps keys of batches started in the same second apart.
#[must_use]
pub fn archive_key(owner: &str, at: DateTime<Utc>, batch_id: &str, file_name: &str) -> String {
    format!(
        "downloads/{owner}_{}_{batch_id}/{file_name}",
        at.format("%Y%m%d_%H%M%S")
    )
}
