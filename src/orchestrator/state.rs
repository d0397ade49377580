//! Batch lifecycle states.

use std::fmt;

use tracing::debug;

/// Step a batch is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchState {
    /// Checking the request; no workspace exists yet.
    Validating,
    /// Starting one fetch task per item.
    Dispatching,
    /// Waiting for every fetch to finish.
    Awaiting,
    /// Partitioning outcomes and naming entries.
    Aggregating,
    /// Writing the archive.
    Packaging,
    /// Uploading the archive and issuing its URL.
    Handoff,
    /// Removing the workspace.
    CleaningUp,
    /// Finished with a download URL.
    Done,
    /// Finished with an error.
    Failed,
}

impl BatchState {
    /// Returns the stable lower-case label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::Dispatching => "dispatching",
            Self::Awaiting => "awaiting",
            Self::Aggregating => "aggregating",
            Self::Packaging => "packaging",
            Self::Handoff => "handoff",
            Self::CleaningUp => "cleaning_up",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Returns true for `Done` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for BatchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Records the states a batch passes through.
#[derive(Debug, Clone)]
pub(crate) struct StateTracker {
    history: Vec<BatchState>,
}

impl StateTracker {
    pub(crate) fn new() -> Self {
        Self {
            history: vec![BatchState::Validating],
        }
    }

    pub(crate) fn current(&self) -> BatchState {
        self.history
            .last()
            .copied()
            .unwrap_or(BatchState::Validating)
    }

    pub(crate) fn enter(&mut self, next: BatchState) {
        let from = self.current();
        if from.is_terminal() {
            return;
        }
        debug!(from = %from, to = %next, "batch state transition");
        self.history.push(next);
    }

    pub(crate) fn history(&self) -> &[BatchState] {
        &self.history
    }
}
