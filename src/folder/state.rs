use std::fmt;

use thiserror::Error;

/// Lifecycle of one folder within a single run.
///
/// Each folder flows through: PENDING → PROCESSING → SUCCEEDED | FAILED_SKIPPED
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderState {
    Pending,
    Processing,
    Succeeded,
    FailedSkipped,
}

impl FolderState {
    pub fn is_terminal(self) -> bool {
        matches!(self, FolderState::Succeeded | FolderState::FailedSkipped)
    }

    /// Whether moving from `self` to `next` is a legal step.
    pub fn can_transition_to(self, next: FolderState) -> bool {
        matches!(
            (self, next),
            (FolderState::Pending, FolderState::Processing)
                | (FolderState::Processing, FolderState::Succeeded)
                | (FolderState::Processing, FolderState::FailedSkipped)
        )
    }
}

impl fmt::Display for FolderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FolderState::Pending => write!(f, "PENDING"),
            FolderState::Processing => write!(f, "PROCESSING"),
            FolderState::Succeeded => write!(f, "SUCCEEDED"),
            FolderState::FailedSkipped => write!(f, "FAILED_SKIPPED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("folder {folder}: illegal transition {from} -> {to}")]
pub struct InvalidTransition {
    pub folder: String,
    pub from: FolderState,
    pub to: FolderState,
}
