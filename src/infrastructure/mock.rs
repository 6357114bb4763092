//! Scripted stand-ins for the external services, used by unit and
//! integration tests.

use crate::domain::cancellation::CancelSignal;
use crate::domain::errors::{LlmServiceError, SandboxError};
use crate::domain::execution::{ExecutionRequest, ExecutionResult};
use crate::domain::ports::{LanguageModelService, SandboxEnvironment};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Replays queued completions in order, then the fallback (if any)
pub struct ScriptedLanguageModel {
    replies: Mutex<VecDeque<Result<String, LlmServiceError>>>,
    fallback: Option<String>,
    prompts: Mutex<Vec<(String, String)>>,
}

impl ScriptedLanguageModel {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            fallback: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Reply used once the queue is empty
    pub fn with_fallback(mut self, reply: impl Into<String>) -> Self {
        self.fallback = Some(reply.into());
        self
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        lock(&self.replies).push_back(Ok(reply.into()));
    }

    pub fn push_error(&self, error: LlmServiceError) {
        lock(&self.replies).push_back(Err(error));
    }

    pub fn call_count(&self) -> usize {
        lock(&self.prompts).len()
    }

    /// `(system, user)` prompt pairs in call order
    pub fn prompts(&self) -> Vec<(String, String)> {
        lock(&self.prompts).clone()
    }
}

#[async_trait]
impl LanguageModelService for ScriptedLanguageModel {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmServiceError> {
        lock(&self.prompts).push((system_prompt.to_string(), user_prompt.to_string()));
        let next = lock(&self.replies).pop_front();
        match next {
            Some(reply) => reply,
            None => self.fallback.clone().ok_or_else(|| {
                LlmServiceError::InvalidResponse("scripted model has no replies left".to_string())
            }),
        }
    }
}

/// Process-free sandbox returning queued results in order.
///
/// With a delay configured each run sleeps first and honours cancellation
/// while sleeping, like a real child process would be killed.
pub struct ScriptedSandbox {
    results: Mutex<VecDeque<ExecutionResult>>,
    fallback: Option<ExecutionResult>,
    delay: Option<Duration>,
    requests: Mutex<Vec<ExecutionRequest>>,
}

impl ScriptedSandbox {
    pub fn new(results: Vec<ExecutionResult>) -> Self {
        Self {
            results: Mutex::new(results.into()),
            fallback: None,
            delay: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, result: ExecutionResult) -> Self {
        self.fallback = Some(result);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn run_count(&self) -> usize {
        lock(&self.requests).len()
    }

    /// Artifact versions in the order they were run
    pub fn executed_versions(&self) -> Vec<u32> {
        lock(&self.requests).iter().map(|r| r.artifact_version).collect()
    }

    pub fn requests(&self) -> Vec<ExecutionRequest> {
        lock(&self.requests).clone()
    }

    /// Successful run printing `stdout`
    pub fn exited_ok(stdout: impl Into<String>) -> ExecutionResult {
        ExecutionResult {
            stdout: stdout.into(),
            exit_code: Some(0),
            duration_ms: 5,
            ..Default::default()
        }
    }

    /// Failed run with the given exit code and stderr
    pub fn exited_with(exit_code: i32, stderr: impl Into<String>) -> ExecutionResult {
        ExecutionResult {
            stderr: stderr.into(),
            exit_code: Some(exit_code),
            duration_ms: 5,
            ..Default::default()
        }
    }
}

#[async_trait]
impl SandboxEnvironment for ScriptedSandbox {
    async fn run(&self, request: ExecutionRequest, cancel: &CancelSignal) -> Result<ExecutionResult, SandboxError> {
        debug!(
            "ScriptedSandbox: run {} v{}",
            request.run_id, request.artifact_version
        );
        lock(&self.requests).push(request);

        if let Some(delay) = self.delay {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SandboxError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        } else if cancel.is_cancelled() {
            return Err(SandboxError::Cancelled);
        }

        let next = lock(&self.results).pop_front();
        next.or_else(|| self.fallback.clone()).ok_or_else(|| {
            SandboxError::Workspace("scripted sandbox has no results left".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cancellation::cancellation_pair;

    fn request(version: u32) -> ExecutionRequest {
        ExecutionRequest {
            run_id: "TEST".to_string(),
            artifact_version: version,
            source: "print(1)\n".to_string(),
            market_data: None,
            timeout: Duration::from_secs(1),
        }
    }

    #[tokio::test]
    async fn test_model_replays_then_falls_back() {
        let model = ScriptedLanguageModel::new(["first"]).with_fallback("again");
        assert_eq!(model.complete("s", "u1").await.unwrap(), "first");
        assert_eq!(model.complete("s", "u2").await.unwrap(), "again");
        assert_eq!(model.call_count(), 2);
        assert_eq!(model.prompts()[1].1, "u2");
    }

    #[tokio::test]
    async fn test_model_without_fallback_errors_when_empty() {
        let model = ScriptedLanguageModel::new(Vec::<String>::new());
        assert!(model.complete("s", "u").await.is_err());
    }

    #[tokio::test]
    async fn test_sandbox_honours_cancellation_during_delay() {
        let sandbox = ScriptedSandbox::new(vec![]).with_delay(Duration::from_secs(30));
        let (handle, signal) = cancellation_pair();
        let run = sandbox.run(request(1), &signal);
        handle.cancel();
        assert!(matches!(run.await, Err(SandboxError::Cancelled)));
        assert_eq!(sandbox.executed_versions(), vec![1]);
    }
}
