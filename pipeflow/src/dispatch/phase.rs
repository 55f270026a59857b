//! Dispatch lifecycle phases.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The phase a dispatch has reached.
///
/// The happy path is strictly linear:
/// `Created -> PreProcessed -> Dispatching -> Merged -> PostProcessed -> Done`.
/// `Failed` is reachable from any non-terminal phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPhase {
    /// Nothing has run yet.
    #[default]
    Created,
    /// `pre_process` completed and the work list was taken.
    PreProcessed,
    /// Workers are running.
    Dispatching,
    /// Every worker returned and the retention policy was applied.
    Merged,
    /// `post_process` completed.
    PostProcessed,
    /// The dispatch finished.
    Done,
    /// The dispatch stopped on a failure.
    Failed,
}

impl DispatchPhase {
    /// Returns the phase that follows this one on the happy path.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Created => Some(Self::PreProcessed),
            Self::PreProcessed => Some(Self::Dispatching),
            Self::Dispatching => Some(Self::Merged),
            Self::Merged => Some(Self::PostProcessed),
            Self::PostProcessed => Some(Self::Done),
            Self::Done | Self::Failed => None,
        }
    }

    /// Returns true if the dispatch may move from `self` to `to`.
    #[must_use]
    pub fn can_transition_to(self, to: Self) -> bool {
        if to == Self::Failed {
            return !self.is_terminal();
        }
        self.next() == Some(to)
    }

    /// Returns true for `Done` and `Failed`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => write!(f, "created"),
            Self::PreProcessed => write!(f, "pre_processed"),
            Self::Dispatching => write!(f, "dispatching"),
            Self::Merged => write!(f, "merged"),
            Self::PostProcessed => write!(f, "post_processed"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
