//! Directory-backed object store.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument};
use url::Url;

use super::{ObjectStore, StorageError};

/// Object store that copies archives under a root directory.
///
/// Presigned URLs are `file://` URLs carrying an `expires` query parameter
/// (unix seconds). Expiry is advisory: nothing enforces it for local files.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Creates a store rooted at `root`. The directory is created on first put.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the store root.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolves a key to its path under the root, rejecting keys that escape it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKey`] for empty or absolute keys and
    /// keys with `..` components.
    pub fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(key);
        let escapes = key.is_empty()
            || key.contains('\\')
            || relative
                .components()
                .any(|component| !matches!(component, Component::Normal(_)));
        if escapes {
            return Err(StorageError::invalid_key(key));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    #[instrument(skip(self), fields(local = %local.display()))]
    async fn put(&self, local: &Path, key: &str) -> Result<String, StorageError> {
        let target = self.object_path(key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StorageError::io(parent, e))?;
        }
        let mut source = tokio::fs::File::open(local)
            .await
            .map_err(|e| StorageError::io(local, e))?;
        let mut object = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                return Err(StorageError::AlreadyExists {
                    key: key.to_string(),
                });
            }
            Err(e) => return Err(StorageError::io(&target, e)),
        };
        let bytes = tokio::io::copy(&mut source, &mut object)
            .await
            .map_err(|e| StorageError::io(&target, e))?;
        object
            .sync_all()
            .await
            .map_err(|e| StorageError::io(&target, e))?;
        debug!(bytes, target = %target.display(), "object stored");
        Ok(key.to_string())
    }

    #[instrument(skip(self))]
    async fn presign(&self, key: &str, ttl: Duration) -> Result<String, StorageError> {
        let path = self.object_path(key)?;
        let exists = tokio::fs::try_exists(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        if !exists {
            return Err(StorageError::NotFound {
                key: key.to_string(),
            });
        }

        let absolute = std::path::absolute(&path).map_err(|e| StorageError::io(&path, e))?;
        let mut url =
            Url::from_file_path(&absolute).map_err(|()| StorageError::Url { path: absolute })?;
        let ttl_secs = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        let expires = Utc::now().timestamp().saturating_add(ttl_secs);
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string());
        Ok(url.to_string())
    }
}
