use std::sync::Arc;

use crate::config::AppConfig;
use crate::error::{AppError, ProviderFailure, RouterError};
use crate::prompts::PromptSet;
use crate::provider::{ChatProvider, Provider, ProviderError, TaskKind, TaskRequest};
use crate::retry::RetryExecutor;

/// Providers for one task kind, in the order they are tried.
///
/// The order is fixed at construction; a provider is only passed over once
/// it has used up its own retry budget or failed permanently.
#[derive(Clone)]
pub struct FallbackChain {
    providers: Vec<Arc<dyn Provider>>,
}

impl FallbackChain {
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Result<Self, AppError> {
        if providers.is_empty() {
            return Err(AppError::Config("fallback chain needs at least one provider".into()));
        }
        Ok(Self { providers })
    }

    pub fn single(provider: Arc<dyn Provider>) -> Self {
        Self {
            providers: vec![provider],
        }
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }
}

/// Completes rewrite and title tasks against their provider chains.
pub struct ProviderRouter {
    rewrite: FallbackChain,
    title: FallbackChain,
    executor: RetryExecutor,
    prompts: PromptSet,
}

impl ProviderRouter {
    /// The title task always has exactly one provider and no fallback.
    pub fn new(
        rewrite: FallbackChain,
        title: Arc<dyn Provider>,
        executor: RetryExecutor,
        prompts: PromptSet,
    ) -> Self {
        Self {
            rewrite,
            title: FallbackChain::single(title),
            executor,
            prompts,
        }
    }

    /// Build HTTP providers for every configured endpoint.
    pub fn from_config(config: &AppConfig, executor: RetryExecutor) -> Result<Self, AppError> {
        let rewrite = config
            .providers
            .rewrite
            .iter()
            .enumerate()
            .map(|(priority, p)| {
                ChatProvider::from_config(p, priority).map(|c| Arc::new(c) as Arc<dyn Provider>)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let title = Arc::new(ChatProvider::from_config(&config.providers.title, 0)?);
        let prompts = PromptSet::load(&config.prompts)?;
        let rewrite = FallbackChain::new(rewrite)?;
        tracing::info!(
            rewrite = %rewrite.names().join(" -> "),
            title = %config.providers.title.name,
            max_attempts = executor.policy().max_attempts,
            "providers ready"
        );

        Ok(Self::new(rewrite, title, executor, prompts))
    }

    pub fn chain(&self, kind: TaskKind) -> &FallbackChain {
        match kind {
            TaskKind::Rewrite => &self.rewrite,
            TaskKind::Title => &self.title,
        }
    }

    /// Complete `kind` for `payload`, walking the chain in order.
    pub async fn route(&self, kind: TaskKind, payload: &str) -> Result<String, RouterError> {
        let request = TaskRequest {
            kind,
            system_prompt: self.prompts.for_task(kind).to_string(),
            input: payload.to_string(),
        };
        let request = &request;
        let chain = self.chain(kind);
        let mut failures = Vec::with_capacity(chain.providers.len());

        for provider in &chain.providers {
            let provider = provider.as_ref();
            tracing::debug!(task = %kind, provider = %provider.name(), "submitting task");

            match self
                .executor
                .execute(
                    provider.name(),
                    move |_| provider.submit(request),
                    ProviderError::is_transient,
                )
                .await
            {
                Ok(text) => {
                    if !failures.is_empty() {
                        tracing::info!(task = %kind, provider = %provider.name(), "fallback provider succeeded");
                    }
                    return Ok(text);
                }
                Err(err) => {
                    tracing::warn!(
                        task = %kind,
                        provider = %provider.name(),
                        attempts = err.attempts(),
                        error = %err.last_error(),
                        "provider gave up"
                    );
                    failures.push(ProviderFailure {
                        provider: provider.name().to_string(),
                        attempts: err.attempts(),
                        error: err.into_last_error(),
                    });
                }
            }
        }

        Err(RouterError::Exhausted {
            task: kind,
            failures,
        })
    }
}
