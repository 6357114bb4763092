use crate::domain::errors::LlmServiceError;
use crate::domain::ports::LanguageModelService;
use crate::infrastructure::observability::Metrics;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound for a single completion call
    pub call_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            call_timeout: Duration::from_secs(90),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based): base doubled each time, capped
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Adds a per-call timeout and bounded exponential backoff to any language model.
///
/// Non-transient errors (bad request, undecodable response) are returned at
/// once; transient ones are retried until `max_attempts` is reached and then
/// reported as `LlmServiceError::Exhausted`.
pub struct RetryingLanguageModel {
    inner: Arc<dyn LanguageModelService>,
    policy: RetryPolicy,
    metrics: Option<Metrics>,
}

impl RetryingLanguageModel {
    pub fn new(inner: Arc<dyn LanguageModelService>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }
}

#[async_trait]
impl LanguageModelService for RetryingLanguageModel {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmServiceError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last = String::new();

        for attempt in 1..=attempts {
            let call = self.inner.complete(system_prompt, user_prompt);
            let error = match tokio::time::timeout(self.policy.call_timeout, call).await {
                Ok(Ok(completion)) => return Ok(completion),
                Ok(Err(err)) if !err.is_transient() => return Err(err),
                Ok(Err(err)) => err,
                Err(_) => LlmServiceError::Timeout {
                    after: self.policy.call_timeout,
                },
            };
            last = error.to_string();

            if attempt < attempts {
                let delay = self.policy.delay_for(attempt);
                warn!(
                    "RetryingLanguageModel: attempt {}/{} failed ({}); retrying in {:?}",
                    attempt, attempts, last, delay
                );
                if let Some(metrics) = &self.metrics {
                    metrics.llm_retries_total.inc();
                }
                tokio::time::sleep(delay).await;
            }
        }

        Err(LlmServiceError::Exhausted { attempts, last })
    }
}
