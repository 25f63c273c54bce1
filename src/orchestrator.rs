use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::bundle::{BundleWriter, relocate, source_fingerprint};
use crate::config::AppConfig;
use crate::error::{BatchError, FailureReason, FolderError, Stage, is_systemic};
use crate::folder::Folder;
use crate::media::{
    DocumentError, DocumentReader, FsDocumentReader, ImageError, ImagePipeline, ImageTransformer,
};
use crate::provider::TaskKind;
use crate::retry::{Sleeper, TokioSleeper};
use crate::router::ProviderRouter;
use crate::scanner::{FolderScanner, ScanReport};

/// Receives progress events while a batch runs.
pub trait BatchObserver: Send + Sync {
    fn scan_complete(&self, _report: &ScanReport) {}
    fn folder_started(&self, _index: usize, _total: usize, _folder: &Folder) {}
    fn folder_finished(&self, _folder: &Folder, _outcome: &Result<CompletedFolder, FolderError>) {}
    fn waiting(&self, _delay: Duration) {}
}

/// Observer that ignores every event.
pub struct NoopObserver;

impl BatchObserver for NoopObserver {}

/// Where a successful folder ended up.
#[derive(Debug, Clone)]
pub struct CompletedFolder {
    pub bundle: PathBuf,
    pub processed: PathBuf,
    pub images: usize,
    pub title: String,
}

#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub succeeded: usize,
    /// Folders rejected by the scanner.
    pub skipped: usize,
    /// Folders that failed and were left in the input directory.
    pub failed: Vec<String>,
    pub interrupted: bool,
}

/// Drives every pending folder through the pipeline, one at a time.
pub struct BatchOrchestrator {
    input_dir: PathBuf,
    processed_dir: PathBuf,
    folder_delay: Duration,
    scanner: FolderScanner,
    router: ProviderRouter,
    images: Arc<dyn ImageTransformer>,
    documents: Arc<dyn DocumentReader>,
    bundles: BundleWriter,
    sleeper: Arc<dyn Sleeper>,
    stop: CancellationToken,
}

impl BatchOrchestrator {
    pub fn new(config: &AppConfig, router: ProviderRouter) -> Self {
        Self {
            input_dir: config.paths.input_dir.clone(),
            processed_dir: config.paths.processed_dir.clone(),
            folder_delay: config.folder_delay(),
            scanner: FolderScanner::new(config),
            router,
            images: Arc::new(ImagePipeline::new(&config.image)),
            documents: Arc::new(FsDocumentReader),
            bundles: BundleWriter::new(config.paths.output_dir.clone()),
            sleeper: Arc::new(TokioSleeper),
            stop: CancellationToken::new(),
        }
    }

    pub fn with_images(mut self, images: Arc<dyn ImageTransformer>) -> Self {
        self.images = images;
        self
    }

    pub fn with_documents(mut self, documents: Arc<dyn DocumentReader>) -> Self {
        self.documents = documents;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Token that stops the run at the next folder boundary.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Scan the input directory and process every valid folder.
    ///
    /// Contained folder failures are counted in the summary. Only scan
    /// failures, unusable output roots and systemic I/O errors are returned.
    pub async fn run(&self, observer: &dyn BatchObserver) -> Result<RunSummary, BatchError> {
        let mut summary = RunSummary::default();
        if self.stop.is_cancelled() {
            summary.interrupted = true;
            return Ok(summary);
        }

        self.bundles.ensure_root().map_err(|source| BatchError::Setup {
            path: self.bundles.output_root().display().to_string(),
            source,
        })?;
        fs::create_dir_all(&self.processed_dir).map_err(|source| BatchError::Setup {
            path: self.processed_dir.display().to_string(),
            source,
        })?;

        let report = self
            .scanner
            .scan(&self.input_dir)
            .map_err(|source| BatchError::Scan {
                path: self.input_dir.display().to_string(),
                source,
            })?;
        summary.skipped = report.skipped.len();
        observer.scan_complete(&report);
        tracing::info!(
            pending = report.folders.len(),
            skipped = report.skipped.len(),
            "scan complete"
        );

        let total = report.folders.len();
        for (index, mut folder) in report.folders.into_iter().enumerate() {
            if self.stop.is_cancelled() {
                summary.interrupted = true;
                break;
            }

            observer.folder_started(index, total, &folder);
            folder.begin()?;
            tracing::info!(folder = %folder.name, "processing folder");

            let outcome = match self.process(&folder).await {
                Ok(done) => {
                    folder.succeed()?;
                    summary.succeeded += 1;
                    tracing::info!(
                        folder = %folder.name,
                        bundle = %done.bundle.display(),
                        processed = %done.processed.display(),
                        images = done.images,
                        "folder completed"
                    );
                    Ok(done)
                }
                Err(FolderError {
                    stage,
                    reason: FailureReason::Io(source),
                }) if is_systemic(&source) => {
                    self.bundles.discard_staging(&folder.name);
                    tracing::error!(folder = %folder.name, %stage, error = %source, "stopping batch");
                    return Err(BatchError::Fatal {
                        folder: folder.name,
                        stage,
                        source,
                    });
                }
                Err(err) => {
                    self.bundles.discard_staging(&folder.name);
                    folder.skip()?;
                    summary.failed.push(folder.name.clone());
                    tracing::warn!(
                        folder = %folder.name,
                        stage = %err.stage,
                        reason = %err.reason,
                        "folder failed, left in place"
                    );
                    Err(err)
                }
            };
            observer.folder_finished(&folder, &outcome);
            debug_assert!(folder.state().is_terminal());
            tracing::debug!(
                folder = %folder.name,
                history = ?folder.history(),
                state = %folder.state(),
                "folder settled"
            );

            if index + 1 < total && !self.folder_delay.is_zero() {
                observer.waiting(self.folder_delay);
                tokio::select! {
                    biased;
                    _ = self.stop.cancelled() => {
                        summary.interrupted = true;
                        break;
                    }
                    _ = self.sleeper.sleep(self.folder_delay) => {}
                }
            }
        }

        if summary.interrupted {
            tracing::warn!(succeeded = summary.succeeded, "run interrupted");
        }
        Ok(summary)
    }

    /// Steps up to the bundle rename only ever write into the staging
    /// directory; relocating the source folder comes last. Publishing drops
    /// any bundle left by an earlier, interrupted run of the same folder.
    async fn process(&self, folder: &Folder) -> Result<CompletedFolder, FolderError> {
        let staging = self
            .bundles
            .prepare_staging(&folder.name)
            .map_err(|e| FolderError::new(Stage::Bundle, e))?;

        let images = self.transform_images(folder, &staging).await?;
        let text = self.read_document(&folder.document).await?;

        let body = self
            .router
            .route(TaskKind::Rewrite, &text)
            .await
            .map_err(|e| FolderError::new(Stage::Rewrite, e))?;
        let title = self
            .router
            .route(TaskKind::Title, &body)
            .await
            .map_err(|e| FolderError::new(Stage::Title, e))?;

        let bundle = source_fingerprint(&folder.source_path)
            .and_then(|fingerprint| self.bundles.finalize(&staging, &fingerprint, &title, &body))
            .map_err(|e| FolderError::new(Stage::Bundle, e))?;
        let processed = relocate(&folder.source_path, &self.processed_dir)
            .map_err(|e| FolderError::new(Stage::Relocate, e))?;

        Ok(CompletedFolder {
            bundle,
            processed,
            images,
            title,
        })
    }

    /// Transform every image; the folder fails only if none succeeds.
    ///
    /// A systemic write error stops the loop and is returned as I/O so the
    /// batch halts.
    async fn transform_images(&self, folder: &Folder, staging: &Path) -> Result<usize, FolderError> {
        let transformer = Arc::clone(&self.images);
        let sources = folder.images.clone();
        let dest = staging.to_path_buf();

        let results = tokio::task::spawn_blocking(move || {
            let mut results = Vec::with_capacity(sources.len());
            for src in sources {
                let result = transformer.transform(&src, &dest);
                let systemic = result.as_ref().is_err_and(ImageError::is_systemic);
                results.push((src, result));
                if systemic {
                    break;
                }
            }
            results
        })
        .await
        .map_err(|e| {
            FolderError::new(
                Stage::Images,
                FailureReason::AllImagesFailed {
                    count: folder.images.len(),
                    last: ImageError::Aborted(e.to_string()),
                },
            )
        })?;

        let count = results.len();
        let mut written = 0;
        let mut last = None;
        for (src, result) in results {
            match result {
                Ok(_) => written += 1,
                Err(ImageError::Io { source, .. }) if is_systemic(&source) => {
                    return Err(FolderError::new(Stage::Images, source));
                }
                Err(e) => {
                    tracing::warn!(folder = %folder.name, image = %src.display(), error = %e, "image skipped");
                    last = Some(e);
                }
            }
        }

        match last {
            Some(last) if written == 0 => Err(FolderError::new(
                Stage::Images,
                FailureReason::AllImagesFailed { count, last },
            )),
            _ => Ok(written),
        }
    }

    async fn read_document(&self, path: &Path) -> Result<String, FolderError> {
        let reader = Arc::clone(&self.documents);
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || reader.read(&path))
            .await
            .map_err(|e| FolderError::new(Stage::Document, io::Error::other(e)))?
            .map_err(|e: DocumentError| FolderError::new(Stage::Document, e))
    }
}
