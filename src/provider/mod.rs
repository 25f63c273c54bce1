pub mod client;
pub mod error;
pub mod types;

#[cfg(test)]
pub mod mock;

use std::fmt;

use async_trait::async_trait;

pub use client::ChatProvider;
pub use error::ProviderError;

/// The two kinds of text work delegated to language-model providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKind {
    /// Rewrite the source document into the note style.
    Rewrite,
    /// Generate a headline for an already rewritten body.
    Title,
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskKind::Rewrite => write!(f, "rewrite"),
            TaskKind::Title => write!(f, "title"),
        }
    }
}

/// Static identity of a configured provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderDescriptor {
    pub name: String,
    /// Full URL requests are posted to.
    pub endpoint: String,
    pub model: String,
    /// Position in its task's fallback chain (0 = tried first).
    pub priority: usize,
}

/// One unit of work handed to a provider.
#[derive(Debug, Clone)]
pub struct TaskRequest {
    pub kind: TaskKind,
    pub system_prompt: String,
    pub input: String,
}

/// A remote text-generation endpoint.
#[async_trait]
pub trait Provider: Send + Sync {
    fn descriptor(&self) -> &ProviderDescriptor;

    /// Submit a task and return the generated text.
    async fn submit(&self, request: &TaskRequest) -> Result<String, ProviderError>;

    fn name(&self) -> &str {
        &self.descriptor().name
    }
}
