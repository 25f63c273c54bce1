//! Scripted in-process provider for router and orchestrator tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use super::{Provider, ProviderDescriptor, ProviderError, TaskRequest};

type Script = dyn Fn(&TaskRequest, u32) -> Result<String, ProviderError> + Send + Sync;

/// Answers each call with the script, passing the zero-based call index.
pub struct ScriptedProvider {
    descriptor: ProviderDescriptor,
    script: Box<Script>,
    calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn new<F>(name: &str, priority: usize, script: F) -> Arc<Self>
    where
        F: Fn(&TaskRequest, u32) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        Arc::new(Self {
            descriptor: ProviderDescriptor {
                name: name.to_string(),
                endpoint: format!("mock://{name}"),
                model: "mock-model".to_string(),
                priority,
            },
            script: Box::new(script),
            calls: AtomicU32::new(0),
        })
    }

    pub fn replying(name: &str, priority: usize, text: &'static str) -> Arc<Self> {
        Self::new(name, priority, move |_, _| Ok(text.to_string()))
    }

    pub fn unavailable(name: &str, priority: usize) -> Arc<Self> {
        Self::new(name, priority, |_, _| {
            Err(ProviderError::from_status(503, "overloaded".into(), None))
        })
    }

    pub fn unauthorized(name: &str, priority: usize) -> Arc<Self> {
        Self::new(name, priority, |_, _| {
            Err(ProviderError::from_status(401, "invalid key".into(), None))
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn descriptor(&self) -> &ProviderDescriptor {
        &self.descriptor
    }

    async fn submit(&self, request: &TaskRequest) -> Result<String, ProviderError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        (self.script)(request, call)
    }
}
