use crate::domain::market::timeframe::Timeframe;
use crate::domain::pipeline::RunStatus;
use std::time::Duration;
use thiserror::Error;

/// The research translator could not turn an idea into a usable spec
#[derive(Debug, Error)]
pub enum TranslationError {
    #[error("Strategy idea is empty")]
    EmptyIdea,

    #[error("Language model returned no JSON object: {excerpt}")]
    NoStructuredOutput { excerpt: String },

    #[error("Language model returned malformed spec JSON: {reason}")]
    MalformedSpec { reason: String },

    #[error("Spec field '{field}' is missing or empty")]
    MissingField { field: &'static str },

    #[error("Spec field '{field}' is invalid: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// The code synthesizer produced output that is not a complete artifact
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SynthesisError {
    #[error("Completion contained no source code")]
    EmptySource,

    #[error("Code fence opened at line {line} was never closed")]
    UnterminatedFence { line: usize },

    #[error("Unbalanced delimiter '{delimiter}' in generated source")]
    UnbalancedDelimiter { delimiter: char },

    #[error("Generated source ends mid-statement: '{last_line}'")]
    Truncated { last_line: String },
}

/// Failure class of one sandbox run
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionFailure {
    Timeout,
    NonZeroExit,
    Crash,
}

impl std::fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionFailure::Timeout => write!(f, "timeout"),
            ExecutionFailure::NonZeroExit => write!(f, "non-zero-exit"),
            ExecutionFailure::Crash => write!(f, "crash"),
        }
    }
}

/// No recognizable statistics block in the subprocess output
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    #[error("No statistics block found in {stdout_bytes} bytes of stdout")]
    MissingStatisticsBlock { stdout_bytes: usize },
}

/// Failures of the language-model service after (or during) retries
#[derive(Debug, Error)]
pub enum LlmServiceError {
    #[error("Language model call timed out after {after:?}")]
    Timeout { after: Duration },

    #[error("Language model transport error: {0}")]
    Transport(String),

    #[error("Language model API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Language model response could not be decoded: {0}")]
    InvalidResponse(String),

    #[error("Language model unavailable after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: String },
}

impl LlmServiceError {
    /// Whether a retry has a chance of succeeding
    pub fn is_transient(&self) -> bool {
        match self {
            LlmServiceError::Timeout { .. } | LlmServiceError::Transport(_) => true,
            LlmServiceError::Api { status, .. } => *status == 429 || *status >= 500,
            LlmServiceError::InvalidResponse(_) | LlmServiceError::Exhausted { .. } => false,
        }
    }
}

/// Market data could not be served for the requested window
#[derive(Debug, Error)]
pub enum DataUnavailableError {
    #[error(
        "{timeframe} history is limited to {max_days} days, requested {}",
        describe_days(.requested_days)
    )]
    WindowExceedsLimit {
        timeframe: Timeframe,
        requested_days: Option<u32>,
        max_days: u32,
    },

    #[error("No data for {ticker}: {reason}")]
    Unavailable { ticker: String, reason: String },
}

fn describe_days(days: &Option<u32>) -> String {
    match days {
        Some(days) => format!("{} days", days),
        None => "full history".to_string(),
    }
}

impl DataUnavailableError {
    pub fn is_transient(&self) -> bool {
        matches!(self, DataUnavailableError::Unavailable { .. })
    }
}

/// Failures of the sandbox environment itself (not of the candidate)
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Failed to prepare sandbox workspace: {0}")]
    Workspace(String),

    #[error("Failed to spawn interpreter '{interpreter}': {reason}")]
    Spawn { interpreter: String, reason: String },

    #[error("Sandbox run cancelled")]
    Cancelled,
}

/// Attempts to mutate a run that already reached a terminal status
#[derive(Debug, Error, PartialEq)]
pub enum RunStateError {
    #[error("Run {run_id} already finished with status {status}")]
    AlreadyTerminal { run_id: String, status: RunStatus },

    #[error("Run {run_id} cannot finish with non-terminal status {status}")]
    NotTerminal { run_id: String, status: RunStatus },

    #[error("Run {run_id}: optimization iteration {iteration} does not follow {last}")]
    IterationOutOfOrder { run_id: String, iteration: u32, last: u32 },
}

/// Optimization attempts must arrive in strictly increasing iteration order
#[derive(Debug, Error, PartialEq)]
#[error("Optimization iteration {iteration} does not follow iteration {last}")]
pub struct HistoryOrderError {
    pub iteration: u32,
    pub last: u32,
}

/// Fatal pipeline errors: everything that ends a run outside the repair loop
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Translation(#[from] TranslationError),

    #[error(transparent)]
    LlmService(#[from] LlmServiceError),

    #[error(transparent)]
    DataUnavailable(#[from] DataUnavailableError),

    #[error(transparent)]
    Sandbox(SandboxError),

    #[error(transparent)]
    RunState(#[from] RunStateError),

    #[error("Pipeline run cancelled")]
    Cancelled,

    #[error("Internal pipeline error: {0}")]
    Internal(String),
}

impl From<SandboxError> for PipelineError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::Cancelled => PipelineError::Cancelled,
            other => PipelineError::Sandbox(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_error_formatting() {
        let err = DataUnavailableError::WindowExceedsLimit {
            timeframe: Timeframe::FiveMin,
            requested_days: Some(730),
            max_days: 60,
        };

        let msg = err.to_string();
        assert!(msg.contains("5m"));
        assert!(msg.contains("60 days"));
        assert!(msg.contains("730 days"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_llm_error_transience() {
        assert!(LlmServiceError::Timeout { after: Duration::from_secs(1) }.is_transient());
        assert!(LlmServiceError::Api { status: 503, message: "busy".into() }.is_transient());
        assert!(LlmServiceError::Api { status: 429, message: "slow down".into() }.is_transient());
        assert!(!LlmServiceError::Api { status: 401, message: "key".into() }.is_transient());
        assert!(!LlmServiceError::InvalidResponse("garbage".into()).is_transient());
    }

    #[test]
    fn test_sandbox_cancel_maps_to_pipeline_cancel() {
        assert!(matches!(
            PipelineError::from(SandboxError::Cancelled),
            PipelineError::Cancelled
        ));
        assert!(matches!(
            PipelineError::from(SandboxError::Workspace("disk full".into())),
            PipelineError::Sandbox(_)
        ));
    }
}
