//! Bounded worker pool that fetches every item of a batch in isolation.
//!
//! # Concurrency Model
//!
//! - Each item gets its own Tokio task and its own `item_<index>` directory
//! - A semaphore permit is acquired before the blocking fetch starts
//! - The permit moves into the blocking closure, so a hung fetch keeps its
//!   slot and the bound is never exceeded
//! - Outcomes are collected by index; every item is awaited, there is no
//!   early exit on failure
//! - Each item carries a child of the batch's [`CancellationToken`]; an item
//!   timeout cancels its own token, [`DispatchedBatch::cancel`] cancels all of
//!   them, and both wait for the blocking fetch to return
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use trackbatch_core::item::Item;
//! use trackbatch_core::pool::{CommandFetcher, WorkerPool, Workspace};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = WorkerPool::new(4, Arc::new(CommandFetcher::scdl()))?;
//! let workspace = Workspace::create(None)?;
//! let items = vec![Item::new("1", "https://soundcloud.com/a/b", "B", "A")];
//! let outcomes = pool.fetch_batch(&items, &workspace).await;
//! assert_eq!(outcomes.len(), items.len());
//! # Ok(())
//! # }
//! ```

mod command;
mod error;
mod workspace;

pub use command::{CommandFetcher, DEFAULT_FETCH_ARGS, DEFAULT_FETCH_PROGRAM};
pub use error::ItemFailure;
pub(crate) use error::ceil_secs;
pub use workspace::Workspace;

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::item::Item;

/// Minimum allowed concurrency value.
pub const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub const MAX_CONCURRENCY: usize = 32;

/// Default number of concurrent fetches.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Error type for worker pool construction.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// Invalid concurrency value provided.
    #[error(
        "invalid concurrency value {value}: must be between {MIN_CONCURRENCY} and {MAX_CONCURRENCY}"
    )]
    InvalidConcurrency {
        /// The invalid value that was provided.
        value: usize,
    },
}

/// Retrieves one item's audio payload into a private directory.
///
/// Implementations block; the pool only calls them on the blocking thread pool.
/// Long-running implementations should watch `cancel` and return
/// [`ItemFailure::Cancelled`] once it fires, leaving `dir` untouched from then on.
pub trait MediaFetcher: Send + Sync {
    /// Fetches `item` into `dir` and returns the path of the produced file.
    ///
    /// # Errors
    ///
    /// Returns the [`ItemFailure`] describing why no file was produced.
    fn fetch(
        &self,
        item: &Item,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, ItemFailure>;
}

/// Result of fetching one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The item's file was produced.
    Success {
        /// Path of the fetched file inside the workspace.
        path: PathBuf,
    },
    /// The item produced no file.
    Failure {
        /// Why the item failed.
        reason: ItemFailure,
    },
}

impl FetchOutcome {
    /// Returns true for [`FetchOutcome::Success`].
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Returns the fetched path for a success.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Success { path } => Some(path),
            Self::Failure { .. } => None,
        }
    }

    /// Returns the failure reason for a failure.
    #[must_use]
    pub fn failure(&self) -> Option<&ItemFailure> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { reason } => Some(reason),
        }
    }
}

impl From<Result<PathBuf, ItemFailure>> for FetchOutcome {
    fn from(result: Result<PathBuf, ItemFailure>) -> Self {
        match result {
            Ok(path) => Self::Success { path },
            Err(reason) => Self::Failure { reason },
        }
    }
}

/// Fetches that have been dispatched but not yet awaited.
#[derive(Debug)]
pub struct DispatchedBatch {
    handles: Vec<JoinHandle<FetchOutcome>>,
    next: usize,
    outcomes: Vec<FetchOutcome>,
    cancel: CancellationToken,
}

impl DispatchedBatch {
    /// Returns the number of dispatched items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns true if nothing was dispatched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Awaits every fetch and returns outcomes in dispatch order.
    ///
    /// Cancel-safe: if the returned future is dropped, outcomes gathered so
    /// far are kept and the next call resumes where this one stopped.
    pub async fn join(&mut self) -> Vec<FetchOutcome> {
        while let Some(handle) = self.handles.get_mut(self.next) {
            let index = self.next;
            let outcome = handle.await.unwrap_or_else(|e| {
                warn!(index, error = %e, "fetch task aborted");
                FetchOutcome::Failure {
                    reason: ItemFailure::internal(format!("fetch task aborted: {e}")),
                }
            });
            self.outcomes.push(outcome);
            self.next += 1;
        }
        std::mem::take(&mut self.outcomes)
    }

    /// Cancels every fetch and waits until all of them have returned.
    ///
    /// Queued items never start. Running fetches are signalled, not aborted,
    /// so once this returns nothing still writes into the workspace.
    #[instrument(skip(self), fields(pending = self.handles.len() - self.next))]
    pub async fn cancel(&mut self) -> Vec<FetchOutcome> {
        self.cancel.cancel();
        let outcomes = self.join().await;
        debug!("cancelled fetches drained");
        outcomes
    }
}

impl Drop for DispatchedBatch {
    fn drop(&mut self) {
        self.cancel.cancel();
        for handle in &self.handles[self.next..] {
            handle.abort();
        }
    }
}

/// Bounded pool running a [`MediaFetcher`] over a batch.
#[derive(Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    concurrency: usize,
    fetcher: Arc<dyn MediaFetcher>,
    item_timeout: Option<Duration>,
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("concurrency", &self.concurrency)
            .field("item_timeout", &self.item_timeout)
            .finish_non_exhaustive()
    }
}

impl WorkerPool {
    /// Creates a pool with the given concurrency limit.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::InvalidConcurrency`] if the value is outside
    /// [`MIN_CONCURRENCY`]..=[`MAX_CONCURRENCY`].
    #[instrument(level = "debug", skip(fetcher))]
    pub fn new(concurrency: usize, fetcher: Arc<dyn MediaFetcher>) -> Result<Self, PoolError> {
        if !(MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(&concurrency) {
            return Err(PoolError::InvalidConcurrency { value: concurrency });
        }
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            fetcher,
            item_timeout: None,
        })
    }

    /// Converts any fetch running longer than `timeout` into [`ItemFailure::Timeout`].
    #[must_use]
    pub fn with_item_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.item_timeout = timeout;
        self
    }

    /// Returns the configured concurrency limit.
    #[must_use]
    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Returns the number of free fetch slots.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Starts one task per item and returns without waiting for them.
    ///
    /// Item directories are created here; an item whose directory cannot be
    /// created fails immediately with [`ItemFailure::Io`].
    #[instrument(skip(self, items, workspace), fields(items = items.len()))]
    pub fn dispatch(&self, items: &[Item], workspace: &Workspace) -> DispatchedBatch {
        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(items.len());
        for (index, item) in items.iter().enumerate() {
            let item = item.clone();
            let dir = workspace.create_item_dir(index);
            let semaphore = Arc::clone(&self.semaphore);
            let fetcher = Arc::clone(&self.fetcher);
            let item_timeout = self.item_timeout;
            let item_cancel = cancel.child_token();

            handles.push(tokio::spawn(async move {
                let dir = match dir {
                    Ok(dir) => dir,
                    Err(error) => {
                        warn!(index, item_id = %item.id, error = %error, "item directory unavailable");
                        return FetchOutcome::Failure {
                            reason: ItemFailure::io(&error),
                        };
                    }
                };
                let outcome = run_fetch(semaphore, fetcher, item_timeout, &item, dir, item_cancel).await;
                match &outcome {
                    FetchOutcome::Success { path } => {
                        info!(index, item_id = %item.id, path = %path.display(), "item fetched");
                    }
                    FetchOutcome::Failure { reason } => {
                        warn!(index, item_id = %item.id, code = reason.code(), error = %reason, "item failed");
                    }
                }
                outcome
            }));
        }
        debug!(task_count = handles.len(), "fetches dispatched");
        DispatchedBatch {
            outcomes: Vec::with_capacity(handles.len()),
            handles,
            next: 0,
            cancel,
        }
    }

    /// Fetches every item and returns outcomes index-aligned with `items`.
    pub async fn fetch_batch(&self, items: &[Item], workspace: &Workspace) -> Vec<FetchOutcome> {
        let mut dispatched = self.dispatch(items, workspace);
        dispatched.join().await
    }
}

async fn run_fetch(
    semaphore: Arc<Semaphore>,
    fetcher: Arc<dyn MediaFetcher>,
    item_timeout: Option<Duration>,
    item: &Item,
    dir: PathBuf,
    cancel: CancellationToken,
) -> FetchOutcome {
    let acquired = tokio::select! {
        biased;
        () = cancel.cancelled() => {
            return FetchOutcome::Failure {
                reason: ItemFailure::Cancelled,
            };
        }
        acquired = semaphore.acquire_owned() => acquired,
    };
    let Ok(permit) = acquired else {
        return FetchOutcome::Failure {
            reason: ItemFailure::internal("worker pool closed"),
        };
    };

    let blocking_item = item.clone();
    let blocking_cancel = cancel.clone();
    let mut handle = tokio::task::spawn_blocking(move || {
        // Released when the fetch returns, not when the caller stops waiting.
        let _permit = permit;
        fetcher.fetch(&blocking_item, &dir, &blocking_cancel)
    });

    let joined = match item_timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                cancel.cancel();
                // The fetch owns its directory until it returns.
                if let Err(error) = handle.await {
                    debug!(error = %error, "timed out fetch ended abnormally");
                }
                return FetchOutcome::Failure {
                    reason: ItemFailure::timeout(limit),
                };
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(result) => FetchOutcome::from(result),
        Err(error) if error.is_panic() => FetchOutcome::Failure {
            reason: ItemFailure::internal(format!(
                "fetcher panicked: {}",
                panic_message(&*error.into_panic())
            )),
        },
        Err(error) => FetchOutcome::Failure {
            reason: ItemFailure::internal(format!("fetch task cancelled: {error}")),
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Writes `<id>.mp3` after sleeping for the title's parsed milliseconds.
    ///
    /// Stops early on cancellation unless the artist is "stubborn".
    struct SleepyFetcher {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SleepyFetcher {
        fn new() -> Self {
            Self {
                running: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    impl MediaFetcher for SleepyFetcher {
        fn fetch(
            &self,
            item: &Item,
            dir: &Path,
            cancel: &CancellationToken,
        ) -> Result<PathBuf, ItemFailure> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            let millis: u64 = item.title.parse().unwrap_or(0);
            let until = std::time::Instant::now() + Duration::from_millis(millis);
            while std::time::Instant::now() < until {
                if cancel.is_cancelled() && item.artist != "stubborn" {
                    self.running.fetch_sub(1, Ordering::SeqCst);
                    return Err(ItemFailure::Cancelled);
                }
                std::thread::sleep(Duration::from_millis(5));
            }
            self.running.fetch_sub(1, Ordering::SeqCst);

            if item.artist == "fail" {
                return Err(ItemFailure::MediaNotFound);
            }
            if item.artist == "panic" {
                panic!("fetcher exploded");
            }
            let path = dir.join(format!("{}.mp3", item.id));
            std::fs::write(&path, item.id.as_bytes()).map_err(|e| ItemFailure::io(&e))?;
            Ok(path)
        }
    }

    fn item(id: &str, millis: u64, artist: &str) -> Item {
        Item::new(id, format!("https://x.test/{id}"), millis.to_string(), artist)
    }

    // ==================== Construction Tests ====================

    #[test]
    fn test_pool_rejects_invalid_concurrency() {
        let fetcher: Arc<dyn MediaFetcher> = Arc::new(SleepyFetcher::new());
        assert!(matches!(
            WorkerPool::new(0, Arc::clone(&fetcher)),
            Err(PoolError::InvalidConcurrency { value: 0 })
        ));
        assert!(matches!(
            WorkerPool::new(33, Arc::clone(&fetcher)),
            Err(PoolError::InvalidConcurrency { value: 33 })
        ));
        assert_eq!(WorkerPool::new(32, fetcher).unwrap().concurrency(), 32);
    }

    #[test]
    fn test_fetch_outcome_accessors() {
        let ok = FetchOutcome::from(Ok(PathBuf::from("/a.mp3")));
        assert!(ok.is_success());
        assert_eq!(ok.path(), Some(Path::new("/a.mp3")));
        let failed = FetchOutcome::from(Err(ItemFailure::MediaNotFound));
        assert_eq!(failed.failure(), Some(&ItemFailure::MediaNotFound));
    }

    // ==================== Fetch Batch Tests ====================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_outcomes_index_aligned_under_skewed_delays() {
        let fetcher = Arc::new(SleepyFetcher::new());
        let pool = WorkerPool::new(4, fetcher).unwrap();
        let workspace = Workspace::create(None).unwrap();
        let items = vec![
            item("slow", 150, "a"),
            item("fast", 0, "a"),
            item("mid", 50, "fail"),
            item("quick", 10, "a"),
        ];

        let outcomes = pool.fetch_batch(&items, &workspace).await;

        assert_eq!(outcomes.len(), 4);
        assert!(outcomes[0].path().unwrap().ends_with("item_0/slow.mp3"));
        assert!(outcomes[1].path().unwrap().ends_with("item_1/fast.mp3"));
        assert_eq!(outcomes[2].failure(), Some(&ItemFailure::MediaNotFound));
        assert!(outcomes[3].path().unwrap().ends_with("item_3/quick.mp3"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrency_bound_is_respected() {
        let fetcher = Arc::new(SleepyFetcher::new());
        let pool = WorkerPool::new(2, Arc::clone(&fetcher) as Arc<dyn MediaFetcher>).unwrap();
        let workspace = Workspace::create(None).unwrap();
        let items: Vec<_> = (0..8).map(|i| item(&i.to_string(), 30, "a")).collect();

        let outcomes = pool.fetch_batch(&items, &workspace).await;

        assert!(outcomes.iter().all(FetchOutcome::is_success));
        assert!(fetcher.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(pool.available_permits(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_panicking_fetcher_fails_only_its_item() {
        let pool = WorkerPool::new(2, Arc::new(SleepyFetcher::new())).unwrap();
        let workspace = Workspace::create(None).unwrap();
        let items = vec![item("ok", 0, "a"), item("boom", 0, "panic")];

        let outcomes = pool.fetch_batch(&items, &workspace).await;

        assert!(outcomes[0].is_success());
        match outcomes[1].failure() {
            Some(ItemFailure::Internal { message }) => {
                assert!(message.contains("fetcher exploded"), "Got: {message}");
            }
            other => panic!("expected Internal failure, got {other:?}"),
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_item_timeout_converts_hang() {
        let pool = WorkerPool::new(2, Arc::new(SleepyFetcher::new()))
            .unwrap()
            .with_item_timeout(Some(Duration::from_millis(50)));
        let workspace = Workspace::create(None).unwrap();
        let items = vec![item("hang", 500, "a"), item("ok", 0, "a")];

        let outcomes = pool.fetch_batch(&items, &workspace).await;

        assert_eq!(
            outcomes[0].failure(),
            Some(&ItemFailure::Timeout { secs: 1 })
        );
        assert!(outcomes[1].is_success());
        assert_eq!(pool.available_permits(), 2, "Timed out fetch must release its slot");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_item_timeout_waits_for_stubborn_fetch() {
        let pool = WorkerPool::new(1, Arc::new(SleepyFetcher::new()))
            .unwrap()
            .with_item_timeout(Some(Duration::from_millis(50)));
        let workspace = Workspace::create(None).unwrap();
        let items = vec![item("late", 200, "stubborn")];

        let outcomes = pool.fetch_batch(&items, &workspace).await;

        assert_eq!(
            outcomes[0].failure(),
            Some(&ItemFailure::Timeout { secs: 1 })
        );
        // The file lands before the outcome is reported, never after.
        assert!(workspace.item_dir(0).join("late.mp3").exists());
        assert_eq!(pool.available_permits(), 1);
    }

    // ==================== Cancellation Tests ====================

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_stops_running_and_queued_fetches() {
        let pool = WorkerPool::new(1, Arc::new(SleepyFetcher::new())).unwrap();
        let workspace = Workspace::create(None).unwrap();
        let items = vec![item("a", 5000, "x"), item("b", 5000, "x"), item("c", 5000, "x")];

        let mut dispatched = pool.dispatch(&items, &workspace);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let started = std::time::Instant::now();
        let outcomes = dispatched.cancel().await;

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(outcomes.len(), 3);
        for outcome in &outcomes {
            assert_eq!(outcome.failure(), Some(&ItemFailure::Cancelled));
        }
        assert_eq!(pool.available_permits(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_waits_for_fetch_ignoring_signal() {
        let pool = WorkerPool::new(2, Arc::new(SleepyFetcher::new())).unwrap();
        let workspace = Workspace::create(None).unwrap();
        let items = vec![item("stuck", 300, "stubborn"), item("polite", 5000, "x")];

        let mut dispatched = pool.dispatch(&items, &workspace);
        tokio::time::sleep(Duration::from_millis(50)).await;
        let outcomes = dispatched.cancel().await;

        assert!(outcomes[0].is_success());
        assert!(workspace.item_dir(0).join("stuck.mp3").exists());
        assert_eq!(outcomes[1].failure(), Some(&ItemFailure::Cancelled));
        assert_eq!(pool.available_permits(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_join_resumes_after_dropped_wait() {
        let pool = WorkerPool::new(2, Arc::new(SleepyFetcher::new())).unwrap();
        let workspace = Workspace::create(None).unwrap();
        let items = vec![item("fast", 0, "x"), item("slow", 200, "x")];

        let mut dispatched = pool.dispatch(&items, &workspace);
        let first = tokio::time::timeout(Duration::from_millis(50), dispatched.join()).await;
        assert!(first.is_err());
        let outcomes = dispatched.join().await;

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(FetchOutcome::is_success));
        assert!(dispatched.join().await.is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_dispatches_nothing() {
        let pool = WorkerPool::new(1, Arc::new(SleepyFetcher::new())).unwrap();
        let workspace = Workspace::create(None).unwrap();
        let mut dispatched = pool.dispatch(&[], &workspace);
        assert!(dispatched.is_empty());
        assert!(dispatched.join().await.is_empty());
    }
}
