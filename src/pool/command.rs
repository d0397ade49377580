//! Media fetcher that shells out to an external downloader.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use super::{ItemFailure, MediaFetcher};
use crate::item::Item;
use crate::matcher::ResultMatcher;

/// Downloader program used when none is configured.
pub const DEFAULT_FETCH_PROGRAM: &str = "scdl";

/// Argument template for [`DEFAULT_FETCH_PROGRAM`].
pub const DEFAULT_FETCH_ARGS: [&str; 10] = [
    "-l",
    "{url}",
    "--path",
    "{dir}",
    "--name-format",
    "{name}",
    "--onlymp3",
    "--no-playlist",
    "--hide-progress",
    "--overwrite",
];

/// Maximum number of trailing stderr characters kept in a failure.
const STDERR_TAIL_CHARS: usize = 500;

/// Stderr capture file written inside the item directory.
const STDERR_LOG: &str = ".fetch-stderr.log";

/// How often a running child is polled for exit, deadline and cancellation.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Runs an external program per item, then locates its output with a [`ResultMatcher`].
///
/// Arguments are a template; these placeholders are substituted per item:
///
/// - `{url}` - item source URL
/// - `{dir}` - the item's private directory
/// - `{name}` - the item's SafeName
/// - `{id}` - the item id
///
/// The program is resolved on `PATH` at fetch time. Arguments are passed
/// directly, never through a shell.
#[derive(Debug, Clone)]
pub struct CommandFetcher {
    program: String,
    args: Vec<String>,
    deadline: Option<Duration>,
    matcher: Arc<ResultMatcher>,
}

impl CommandFetcher {
    /// Creates a fetcher for `program` with an argument template.
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            deadline: None,
            matcher: Arc::new(ResultMatcher::default()),
        }
    }

    /// Creates a fetcher running `scdl` with [`DEFAULT_FETCH_ARGS`].
    #[must_use]
    pub fn scdl() -> Self {
        Self::new(DEFAULT_FETCH_PROGRAM, DEFAULT_FETCH_ARGS)
    }

    /// Kills the child process once it has run for `deadline`.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Replaces the result matcher.
    #[must_use]
    pub fn with_matcher(mut self, matcher: ResultMatcher) -> Self {
        self.matcher = Arc::new(matcher);
        self
    }

    /// Returns the configured program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the argument list for `item` fetching into `dir`.
    #[must_use]
    pub fn render_args(&self, item: &Item, dir: &Path) -> Vec<String> {
        let dir = dir.to_string_lossy();
        let name = item.safe_name();
        self.args
            .iter()
            .map(|arg| {
                arg.replace("{url}", &item.url)
                    .replace("{dir}", &dir)
                    .replace("{name}", &name)
                    .replace("{id}", &item.id)
            })
            .collect()
    }

    fn resolve_program(&self) -> Result<PathBuf, ItemFailure> {
        which::which(&self.program).map_err(|_| ItemFailure::ToolUnavailable {
            program: self.program.clone(),
        })
    }

    fn wait(
        &self,
        child: &mut Child,
        cancel: &CancellationToken,
    ) -> Result<ExitStatus, ItemFailure> {
        let started = Instant::now();
        loop {
            if let Some(status) = child.try_wait().map_err(|e| ItemFailure::io(&e))? {
                return Ok(status);
            }
            if cancel.is_cancelled() {
                debug!("fetch cancelled, killing tool");
                stop(child);
                return Err(ItemFailure::Cancelled);
            }
            if let Some(deadline) = self.deadline.filter(|d| started.elapsed() >= *d) {
                stop(child);
                return Err(ItemFailure::timeout(deadline));
            }
            std::thread::sleep(POLL_INTERVAL);
        }
    }
}

impl MediaFetcher for CommandFetcher {
    #[instrument(skip(self, item), fields(item_id = %item.id, program = %self.program))]
    fn fetch(
        &self,
        item: &Item,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, ItemFailure> {
        if cancel.is_cancelled() {
            return Err(ItemFailure::Cancelled);
        }
        let program = self.resolve_program()?;
        let log_path = dir.join(STDERR_LOG);
        let log = File::create(&log_path).map_err(|e| ItemFailure::io(&e))?;

        debug!(program = %program.display(), "starting fetch tool");
        let mut child = Command::new(&program)
            .args(self.render_args(item, dir))
            .current_dir(dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log))
            .spawn()
            .map_err(|e| ItemFailure::io(&e))?;

        let status = self.wait(&mut child, cancel)?;
        if !status.success() {
            return Err(ItemFailure::ToolFailed {
                status: status.to_string(),
                detail: stderr_tail(&log_path),
            });
        }

        self.matcher.locate(dir, item)
    }
}

/// Kills the child and reaps it so no zombie outlives the item.
fn stop(child: &mut Child) {
    if let Err(error) = child.kill() {
        warn!(error = %error, "failed to kill fetch tool");
    }
    if let Err(error) = child.wait() {
        warn!(error = %error, "failed to reap fetch tool");
    }
}

fn stderr_tail(path: &Path) -> String {
    let Ok(bytes) = std::fs::read(path) else {
        return String::new();
    };
    let text = String::from_utf8_lossy(&bytes);
    let text = text.trim();
    let skip = text.chars().count().saturating_sub(STDERR_TAIL_CHARS);
    text.chars().skip(skip).collect()
}
