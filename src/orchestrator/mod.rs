//! Batch orchestration: validate, fetch, aggregate, package, hand off, clean up.
//!
//! A batch moves through [`BatchState`]s:
//!
//! `Validating -> Dispatching -> Awaiting -> Aggregating -> Packaging ->
//! Handoff -> CleaningUp -> Done`, with `Failed` reachable from every step.
//!
//! No workspace exists until validation passes. Once created, the workspace
//! (including the archive file written inside it) is removed on every exit
//! path, including a batch timeout. On timeout the in-flight fetches are
//! cancelled and awaited first, so none of them outlives the removal.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trackbatch_core::config::BatchSettings;
//! use trackbatch_core::item::Item;
//! use trackbatch_core::orchestrator::BatchOrchestrator;
//! use trackbatch_core::pool::CommandFetcher;
//! use trackbatch_core::storage::LocalObjectStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let orchestrator = BatchOrchestrator::new(
//!     BatchSettings::default(),
//!     Arc::new(CommandFetcher::scdl()),
//!     Arc::new(LocalObjectStore::new("./archives")),
//! )?;
//! let items = vec![Item::new("1", "https://soundcloud.com/a/b", "B", "A")];
//! let report = orchestrator.run(items, "A").await?;
//! println!("{}", report.download_url);
//! # Ok(())
//! # }
//! ```

mod state;

pub use state::BatchState;

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument, warn};

use self::state::StateTracker;
use crate::aggregate::{Manifest, aggregate};
use crate::archive::build_archive_blocking;
use crate::config::{BatchSettings, ConfigError};
use crate::error::BatchError;
use crate::item::{BatchRequest, Item, owner_slug};
use crate::pool::{DispatchedBatch, MediaFetcher, WorkerPool, Workspace, ceil_secs};
use crate::resolve::MetadataResolver;
use crate::response::BatchResponse;
use crate::storage::{ObjectStore, archive_key};

/// Result of a successful batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    /// Per-item results.
    pub manifest: Manifest,
    /// Time-limited download URL.
    pub download_url: String,
    /// Lifetime of the download URL.
    pub expires_in: Duration,
    /// Storage key of the uploaded archive.
    pub key: String,
    /// States the batch passed through, in order.
    pub states: Vec<BatchState>,
}

impl BatchReport {
    /// Converts the report into the response body.
    #[must_use]
    pub fn into_response(self) -> BatchResponse {
        BatchResponse {
            download_url: self.download_url,
            expires_in: self.expires_in.as_secs(),
            manifest: self.manifest,
        }
    }
}

/// Runs batches end to end.
#[derive(Clone)]
pub struct BatchOrchestrator {
    settings: BatchSettings,
    pool: WorkerPool,
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("settings", &self.settings)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl BatchOrchestrator {
    /// Creates an orchestrator from validated settings and its collaborators.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `settings` fail validation.
    pub fn new(
        settings: BatchSettings,
        fetcher: Arc<dyn MediaFetcher>,
        store: Arc<dyn ObjectStore>,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let pool = WorkerPool::new(settings.concurrency, fetcher)
            .map_err(|e| ConfigError::invalid("concurrency", settings.concurrency, e.to_string()))?
            .with_item_timeout(settings.item_timeout);
        Ok(Self {
            settings,
            pool,
            store,
        })
    }

    /// Returns the settings in effect.
    #[must_use]
    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// Checks the batch size limits.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::Validation`] for an empty or oversized batch.
    pub fn validate_size(&self, len: usize) -> Result<(), BatchError> {
        if len == 0 {
            return Err(BatchError::validation("at least one item required"));
        }
        if len > self.settings.max_items {
            return Err(BatchError::validation(format!(
                "too many items: {len} requested, maximum is {}",
                self.settings.max_items
            )));
        }
        Ok(())
    }

    /// Checks a batch before any work starts.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::Validation`] for an empty or oversized batch, an
    /// item without id or url (naming its index), or a repeated id.
    pub fn validate(&self, items: &[Item]) -> Result<(), BatchError> {
        self.validate_size(items.len())?;
        let mut seen = HashSet::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            if item.id.trim().is_empty() {
                return Err(BatchError::validation(format!(
                    "item {index} missing 'id' field"
                )));
            }
            if item.url.trim().is_empty() {
                return Err(BatchError::validation(format!(
                    "item {index} missing 'url' field"
                )));
            }
            if !seen.insert(item.id.as_str()) {
                return Err(BatchError::validation(format!(
                    "item {index} repeats id '{}'",
                    item.id
                )));
            }
        }
        Ok(())
    }

    /// Runs a request body: size check, optional metadata resolution, defaults, then [`run`](Self::run).
    ///
    /// # Errors
    ///
    /// Same as [`run`](Self::run), plus resolver failures.
    pub async fn run_request(
        &self,
        request: BatchRequest,
        resolver: Option<&MetadataResolver>,
    ) -> Result<BatchReport, BatchError> {
        self.validate_size(request.descriptors().len())?;
        let request = match resolver {
            Some(resolver) => {
                let descriptors = request.descriptors().to_vec();
                BatchRequest::Bare(resolver.resolve(descriptors).await?)
            }
            None => request,
        };
        let owner = request.owner();
        let items = request.into_items()?;
        self.run(items, &owner).await
    }

    /// Runs one batch to completion.
    ///
    /// `owner` names the uploader in the storage key; it is reduced to
    /// `[A-Za-z0-9_-]` before use.
    ///
    /// # Errors
    ///
    /// Returns [`BatchError::Validation`] before any work starts,
    /// [`BatchError::AllDownloadsFailed`] when nothing was fetched,
    /// [`BatchError::BatchTimedOut`] when the batch deadline passes, and
    /// archive/storage errors from packaging and handoff.
    #[instrument(skip(self, items), fields(items = items.len(), owner = %owner))]
    pub async fn run(&self, items: Vec<Item>, owner: &str) -> Result<BatchReport, BatchError> {
        let mut tracker = StateTracker::new();
        if let Err(error) = self.validate(&items) {
            warn!(error = %error, "batch rejected");
            tracker.enter(BatchState::Failed);
            return Err(error);
        }

        let workspace = match Workspace::create(self.settings.workspace_root.as_deref()) {
            Ok(workspace) => workspace,
            Err(error) => {
                tracker.enter(BatchState::Failed);
                return Err(BatchError::internal(format!(
                    "failed to create workspace: {error}"
                )));
            }
        };

        tracker.enter(BatchState::Dispatching);
        let mut dispatched = self.pool.dispatch(&items, &workspace);

        let result = match self.settings.batch_timeout {
            Some(limit) => {
                let completed = tokio::time::timeout(
                    limit,
                    self.complete(&items, owner, &workspace, &mut dispatched, &mut tracker),
                )
                .await;
                match completed {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            secs = ceil_secs(limit),
                            "batch deadline passed, cancelling fetches"
                        );
                        dispatched.cancel().await;
                        Err(BatchError::BatchTimedOut {
                            secs: ceil_secs(limit),
                        })
                    }
                }
            }
            None => {
                self.complete(&items, owner, &workspace, &mut dispatched, &mut tracker)
                    .await
            }
        };

        // Every fetch has returned here, so nothing recreates the workspace.
        drop(dispatched);
        tracker.enter(BatchState::CleaningUp);
        workspace.close();

        match result {
            Ok((manifest, download_url, key)) => {
                tracker.enter(BatchState::Done);
                info!(
                    total = manifest.total,
                    successful = manifest.successful,
                    failed = manifest.failed_count,
                    key = %key,
                    "batch complete"
                );
                Ok(BatchReport {
                    manifest,
                    download_url,
                    expires_in: self.settings.presign_ttl,
                    key,
                    states: tracker.history().to_vec(),
                })
            }
            Err(error) => {
                tracker.enter(BatchState::Failed);
                warn!(code = error.code(), error = %error, "batch failed");
                Err(error)
            }
        }
    }

    async fn complete(
        &self,
        items: &[Item],
        owner: &str,
        workspace: &Workspace,
        dispatched: &mut DispatchedBatch,
        tracker: &mut StateTracker,
    ) -> Result<(Manifest, String, String), BatchError> {
        tracker.enter(BatchState::Awaiting);
        let outcomes = dispatched.join().await;

        tracker.enter(BatchState::Aggregating);
        let aggregation = aggregate(items, &outcomes)?;

        tracker.enter(BatchState::Packaging);
        let archive_path: PathBuf = workspace.path().join(&self.settings.archive_name);
        let summary = build_archive_blocking(aggregation.entries, archive_path).await?;

        tracker.enter(BatchState::Handoff);
        let key = archive_key(
            &owner_slug(owner),
            Utc::now(),
            &workspace.batch_id(),
            &self.settings.archive_name,
        );
        let key = self.store.put(&summary.path, &key).await?;
        let download_url = self.store.presign(&key, self.settings.presign_ttl).await?;

        Ok((aggregation.manifest, download_url, key))
    }
}
