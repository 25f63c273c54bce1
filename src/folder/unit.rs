use std::path::PathBuf;

use super::state::{FolderState, InvalidTransition};

/// A validated work unit discovered in the input directory.
#[derive(Debug, Clone)]
pub struct Folder {
    pub name: String,
    pub source_path: PathBuf,
    /// Recognized images, sorted by file name.
    pub images: Vec<PathBuf>,
    pub document: PathBuf,
    state: FolderState,
    history: Vec<FolderState>,
}

impl Folder {
    pub fn new(name: String, source_path: PathBuf, images: Vec<PathBuf>, document: PathBuf) -> Self {
        Self {
            name,
            source_path,
            images,
            document,
            state: FolderState::Pending,
            history: Vec::new(),
        }
    }

    pub fn state(&self) -> FolderState {
        self.state
    }

    /// States this folder has left, oldest first.
    pub fn history(&self) -> &[FolderState] {
        &self.history
    }

    pub fn begin(&mut self) -> Result<(), InvalidTransition> {
        self.transition(FolderState::Processing)
    }

    pub fn succeed(&mut self) -> Result<(), InvalidTransition> {
        self.transition(FolderState::Succeeded)
    }

    pub fn skip(&mut self) -> Result<(), InvalidTransition> {
        self.transition(FolderState::FailedSkipped)
    }

    fn transition(&mut self, next: FolderState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                folder: self.name.clone(),
                from: self.state,
                to: next,
            });
        }
        self.history.push(self.state);
        self.state = next;
        Ok(())
    }
}
