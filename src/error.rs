use std::fmt;
use std::io;

use thiserror::Error;

use crate::folder::InvalidTransition;
use crate::media::{DocumentError, ImageError};
use crate::provider::{ProviderError, TaskKind};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Missing API key for provider {provider}: set {env}")]
    MissingApiKey { provider: String, env: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Last failure observed for one provider of a chain.
#[derive(Debug, Clone)]
pub struct ProviderFailure {
    pub provider: String,
    pub attempts: u32,
    pub error: ProviderError,
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({} attempt{}): {}",
            self.provider,
            self.attempts,
            if self.attempts == 1 { "" } else { "s" },
            self.error
        )
    }
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("all {task} providers failed: {}", join_failures(.failures))]
    Exhausted {
        task: TaskKind,
        failures: Vec<ProviderFailure>,
    },
}

fn join_failures(failures: &[ProviderFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Pipeline step in which a folder failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Images,
    Document,
    Rewrite,
    Title,
    Bundle,
    Relocate,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Images => write!(f, "images"),
            Stage::Document => write!(f, "document"),
            Stage::Rewrite => write!(f, "rewrite"),
            Stage::Title => write!(f, "title"),
            Stage::Bundle => write!(f, "bundle"),
            Stage::Relocate => write!(f, "relocate"),
        }
    }
}

#[derive(Debug, Error)]
pub enum FailureReason {
    #[error("all {count} images failed to transform, last error: {last}")]
    AllImagesFailed { count: usize, last: ImageError },

    #[error(transparent)]
    Document(#[from] DocumentError),

    #[error(transparent)]
    Router(#[from] RouterError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// A failure contained at the folder boundary.
#[derive(Debug, Error)]
#[error("{stage} step failed: {reason}")]
pub struct FolderError {
    pub stage: Stage,
    #[source]
    pub reason: FailureReason,
}

impl FolderError {
    pub fn new(stage: Stage, reason: impl Into<FailureReason>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

/// Failures that stop the whole batch.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("cannot scan input directory {path}: {source}")]
    Scan {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("fatal I/O during {stage} of folder {folder}: {source}")]
    Fatal {
        folder: String,
        stage: Stage,
        #[source]
        source: io::Error,
    },

    #[error("cannot prepare directory {path}: {source}")]
    Setup {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Transition(#[from] InvalidTransition),
}

/// I/O conditions that mean no further folder can make progress.
pub fn is_systemic(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::StorageFull | io::ErrorKind::ReadOnlyFilesystem | io::ErrorKind::QuotaExceeded
    )
}
