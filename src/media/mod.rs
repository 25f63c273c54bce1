//! Per-file work done outside the language models: image filtering and
//! document text extraction. Both are synchronous and CPU/disk bound; the
//! orchestrator runs them on the blocking pool.

mod document;
mod imaging;

use std::path::{Path, PathBuf};

pub use document::{DocumentError, FsDocumentReader};
pub use imaging::{ImageError, ImagePipeline};

/// Turns one source image into a processed copy inside `dest_dir`.
pub trait ImageTransformer: Send + Sync {
    fn transform(&self, source: &Path, dest_dir: &Path) -> Result<PathBuf, ImageError>;
}

/// Extracts normalized text from a folder's document.
pub trait DocumentReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<String, DocumentError>;
}
