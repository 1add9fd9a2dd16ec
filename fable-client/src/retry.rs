//! Resilient execution with exponential backoff.
//!
//! Any fallible asynchronous action can be run under a [`RetryPolicy`]:
//! transient failures (no status, 429, 5xx, network/timeout messages)
//! are retried with doubling delays; permanent failures and the final
//! exhausted attempt propagate the last error unchanged.

use crate::error::Error;
use crate::fallback::{SpeechProvider, SpeechRequest, TextProvider, TextRequest};
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Retry budget for one logical operation.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total number of attempts (not extra retries).
    pub retries: u32,

    /// Delay before the first retry; doubles each attempt after.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            base_delay: Duration::from_millis(1000),
        }
    }
}

/// Delay to wait after `attempt` failed attempts: `base * 2^(attempt-1)`.
pub fn backoff_delay(base_delay: Duration, attempt: u32) -> Duration {
    base_delay * 2u32.saturating_pow(attempt.saturating_sub(1))
}

impl RetryPolicy {
    /// Create a policy with the given attempt budget and base delay.
    pub fn new(retries: u32, base_delay: Duration) -> Self {
        Self { retries, base_delay }
    }

    /// Set the attempt budget.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Set the base delay.
    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Execute `op` until it succeeds or the budget is exhausted.
    ///
    /// Non-retryable failures propagate immediately; the exhausted
    /// final attempt propagates the action's own error.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let attempts = self.retries.max(1);
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !err.is_retryable() || attempt >= attempts {
                        return Err(err);
                    }
                    let delay = backoff_delay(self.base_delay, attempt);
                    log::warn!(
                        "{label} failed (attempt {attempt}/{attempts}), retrying in {delay:?}: {err}"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// A text provider whose every call runs under a retry policy.
pub struct RetryingText {
    inner: Arc<dyn TextProvider>,
    policy: RetryPolicy,
}

impl RetryingText {
    pub fn new(inner: Arc<dyn TextProvider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl TextProvider for RetryingText {
    async fn generate(&self, request: &TextRequest) -> Result<String, Error> {
        self.policy
            .run("text generation", || self.inner.generate(request))
            .await
    }
}

/// A speech provider whose every call runs under a retry policy.
pub struct RetryingSpeech {
    inner: Arc<dyn SpeechProvider>,
    policy: RetryPolicy,
}

impl RetryingSpeech {
    pub fn new(inner: Arc<dyn SpeechProvider>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }
}

#[async_trait]
impl SpeechProvider for RetryingSpeech {
    fn prefers_split_text(&self) -> bool {
        self.inner.prefers_split_text()
    }

    async fn synthesize(&self, request: &SpeechRequest) -> Result<String, Error> {
        self.policy
            .run("speech synthesis", || self.inner.synthesize(request))
            .await
    }
}
