//! Per-batch private scratch directory.

use std::io;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

const WORKSPACE_PREFIX: &str = "trackbatch-";
const BATCH_ID_LEN: usize = 10;

/// Private temporary directory owned by one batch.
///
/// Each item fetches into its own `item_<index>` subdirectory. The whole tree
/// is removed when the workspace is dropped, on success and failure alike.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Creates a workspace under `root`, or under the system temp directory.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be created.
    pub fn create(root: Option<&Path>) -> io::Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(WORKSPACE_PREFIX).rand_bytes(BATCH_ID_LEN);
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        debug!(path = %dir.path().display(), "workspace created");
        Ok(Self { dir })
    }

    /// Returns the workspace root.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the random part of the workspace directory name.
    ///
    /// Unique among live workspaces sharing a root.
    #[must_use]
    pub fn batch_id(&self) -> String {
        self.path()
            .file_name()
            .map(|name| name.to_string_lossy())
            .map(|name| {
                name.strip_prefix(WORKSPACE_PREFIX)
                    .unwrap_or(&name)
                    .to_string()
            })
            .unwrap_or_default()
    }

    /// Returns the directory reserved for the item at `index`.
    #[must_use]
    pub fn item_dir(&self, index: usize) -> PathBuf {
        self.path().join(format!("item_{index}"))
    }

    /// Creates and returns the directory for the item at `index`.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be created.
    pub fn create_item_dir(&self, index: usize) -> io::Result<PathBuf> {
        let dir = self.item_dir(index);
        std::fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    /// Removes the workspace now, logging instead of failing on error.
    pub fn close(self) {
        let path = self.path().to_path_buf();
        match self.dir.close() {
            Ok(()) => debug!(path = %path.display(), "workspace removed"),
            Err(error) => warn!(path = %path.display(), error = %error, "workspace removal failed"),
        }
    }
}
