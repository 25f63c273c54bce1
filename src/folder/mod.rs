mod state;
mod unit;

pub use state::{FolderState, InvalidTransition};
pub use unit::Folder;
