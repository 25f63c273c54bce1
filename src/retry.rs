//! Bounded retry with exponential backoff.
//!
//! [`RetryExecutor`] runs a fallible async operation up to
//! `max_attempts` times. After a retryable failure of attempt `k` it waits
//! `base_delay * 2^k + jitter` where jitter is drawn from `[0, jitter_bound)`.
//! A failure classified as permanent stops immediately. The jitter source and
//! the sleeper are injected so delay sequences can be asserted without sleeping.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use thiserror::Error;

use crate::config::RetryConfig;

/// Immutable retry parameters shared by every provider invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included. Never below 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Exclusive upper bound of the random extra delay.
    pub jitter_bound: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            jitter_bound: Duration::from_millis(config.jitter_ms),
        }
    }
}

impl RetryPolicy {
    /// Deterministic part of the wait after attempt `attempt` (zero-based) failed.
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Source of the random extra delay.
pub trait JitterSource: Send + Sync {
    /// Sample a duration in `[0, bound)`. A zero bound yields zero.
    fn sample(&self, bound: Duration) -> Duration;
}

/// Uniform jitter at millisecond resolution.
pub struct RandomJitter;

impl JitterSource for RandomJitter {
    fn sample(&self, bound: Duration) -> Duration {
        let bound_ms = bound.as_millis() as u64;
        if bound_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..bound_ms))
    }
}

/// Blocking wait used for backoff and inter-folder pacing.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// How a single attempt ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded,
    Retryable(String),
    Permanent(String),
}

/// One attempt against one target. Only logged, never persisted.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub target: String,
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    pub at: DateTime<Utc>,
}

impl AttemptRecord {
    fn log(&self, max_attempts: u32) {
        let attempt = self.attempt + 1;
        let at = self.at.to_rfc3339();
        match &self.outcome {
            AttemptOutcome::Succeeded => tracing::debug!(
                target_name = %self.target,
                attempt,
                max_attempts,
                %at,
                "attempt succeeded"
            ),
            AttemptOutcome::Retryable(error) => tracing::warn!(
                target_name = %self.target,
                attempt,
                max_attempts,
                %at,
                %error,
                "attempt failed with retryable error"
            ),
            AttemptOutcome::Permanent(error) => tracing::warn!(
                target_name = %self.target,
                attempt,
                max_attempts,
                %at,
                %error,
                "attempt failed with permanent error"
            ),
        }
    }
}

/// Terminal failure of a retried operation.
#[derive(Debug, Error)]
pub enum RetryError<E: fmt::Debug + fmt::Display> {
    #[error("attempts exhausted after {attempts} tries: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("permanent failure on attempt {}: {error}", .attempt + 1)]
    Aborted { attempt: u32, error: E },
}

impl<E: fmt::Debug + fmt::Display> RetryError<E> {
    /// Number of attempts actually made.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Aborted { attempt, .. } => attempt + 1,
        }
    }

    pub fn last_error(&self) -> &E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Aborted { error, .. } => error,
        }
    }

    pub fn into_last_error(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Aborted { error, .. } => error,
        }
    }
}

/// Runs operations under a [`RetryPolicy`].
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    jitter: Arc<dyn JitterSource>,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self::with_parts(policy, Arc::new(RandomJitter), Arc::new(TokioSleeper))
    }

    pub fn with_parts(
        policy: RetryPolicy,
        jitter: Arc<dyn JitterSource>,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            policy,
            jitter,
            sleeper,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Full wait after attempt `attempt` failed, jitter included.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.policy.backoff_for_attempt(attempt) + self.jitter.sample(self.policy.jitter_bound)
    }

    /// Run `op` until it succeeds, fails permanently, or runs out of attempts.
    ///
    /// `op` receives the zero-based attempt index; `is_retryable` decides
    /// whether a failure may be retried.
    pub async fn execute<T, E, F, Fut, C>(
        &self,
        target: &str,
        mut op: F,
        is_retryable: C,
    ) -> Result<T, RetryError<E>>
    where
        E: fmt::Debug + fmt::Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: Fn(&E) -> bool,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match op(attempt).await {
                Ok(value) => {
                    self.record(target, attempt, AttemptOutcome::Succeeded);
                    return Ok(value);
                }
                Err(error) if !is_retryable(&error) => {
                    self.record(target, attempt, AttemptOutcome::Permanent(error.to_string()));
                    return Err(RetryError::Aborted { attempt, error });
                }
                Err(error) => {
                    self.record(target, attempt, AttemptOutcome::Retryable(error.to_string()));
                    if attempt + 1 >= max_attempts {
                        return Err(RetryError::Exhausted {
                            attempts: attempt + 1,
                            last: error,
                        });
                    }
                    let delay = self.delay_for_attempt(attempt);
                    tracing::debug!(
                        target_name = %target,
                        delay_ms = delay.as_millis() as u64,
                        "backing off before next attempt"
                    );
                    self.sleeper.sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    fn record(&self, target: &str, attempt: u32, outcome: AttemptOutcome) {
        AttemptRecord {
            target: target.to_string(),
            attempt,
            outcome,
            at: Utc::now(),
        }
        .log(self.policy.max_attempts.max(1));
    }
}
