use crate::domain::artifact::CandidateArtifact;
use crate::domain::errors::{ExecutionFailure, HistoryOrderError, RunStateError};
use crate::domain::execution::ExecutionResult;
use crate::domain::optimization::{OptimizationAttempt, OptimizationHistory};
use crate::domain::performance::{PerformanceMetrics, Sanitize};
use crate::domain::strategy::{StrategyIdea, StrategySpec};
use crate::domain::validation::ValidationReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// `<TICKER>-<strategy_type>-<YYYYMMDDTHHMMSS>-<8 hex>`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn generate(ticker: &str, strategy_type: &str, at: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self::compose(ticker, strategy_type, &at.format("%Y%m%dT%H%M%S").to_string(), &suffix[..8])
    }

    fn compose(ticker: &str, strategy_type: &str, stamp: &str, suffix: &str) -> Self {
        RunId(format!(
            "{}-{}-{}-{}",
            ticker.trim().to_uppercase(),
            strategy_type,
            stamp,
            suffix
        ))
    }

    /// Same timestamp and suffix, new ticker and strategy type
    pub fn rebase(&self, ticker: &str, strategy_type: &str) -> Self {
        let mut tail = self.0.rsplitn(3, '-');
        match (tail.next(), tail.next()) {
            (Some(suffix), Some(stamp)) => Self::compose(ticker, strategy_type, stamp, suffix),
            _ => self.clone(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        RunId(value.to_string())
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelinePhase {
    Research,
    Synthesize,
    Validate,
    Repair,
    Execute,
    Parse,
    Optimize,
    Done,
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelinePhase::Research => "RESEARCH",
            PipelinePhase::Synthesize => "SYNTHESIZE",
            PipelinePhase::Validate => "VALIDATE",
            PipelinePhase::Repair => "REPAIR",
            PipelinePhase::Execute => "EXECUTE",
            PipelinePhase::Parse => "PARSE",
            PipelinePhase::Optimize => "OPTIMIZE",
            PipelinePhase::Done => "DONE",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
    Error,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Success => "SUCCESS",
            RunStatus::Failed => "FAILED",
            RunStatus::Error => "ERROR",
            RunStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "RUNNING" => Ok(RunStatus::Running),
            "SUCCESS" => Ok(RunStatus::Success),
            "FAILED" => Ok(RunStatus::Failed),
            "ERROR" => Ok(RunStatus::Error),
            "CANCELLED" => Ok(RunStatus::Cancelled),
            other => Err(anyhow::anyhow!("Unknown run status '{}'", other)),
        }
    }
}

/// How one repair-loop attempt ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AttemptOutcome {
    SynthesisFailed { reason: String },
    ValidationFailed { errors: usize },
    ExecutionFailed { failure: ExecutionFailure },
    Executed,
    Cancelled,
}

impl AttemptOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            AttemptOutcome::SynthesisFailed { .. } => "synthesis-failed",
            AttemptOutcome::ValidationFailed { .. } => "validation-failed",
            AttemptOutcome::ExecutionFailed { .. } => "execution-failed",
            AttemptOutcome::Executed => "executed",
            AttemptOutcome::Cancelled => "cancelled",
        }
    }
}

/// Everything observed during one repair-loop attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Optimization iteration this attempt belongs to (1 = baseline)
    pub iteration: u32,
    /// 1-based position inside the repair loop
    pub attempt: u32,
    pub artifact: Option<CandidateArtifact>,
    pub validation: Option<ValidationReport>,
    pub execution: Option<ExecutionResult>,
    pub metrics: Option<PerformanceMetrics>,
    /// Set when the statistics block was missing and metrics were degraded to nulls
    pub parse_error: Option<String>,
    pub outcome: AttemptOutcome,
    pub recorded_at: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn new(iteration: u32, attempt: u32, outcome: AttemptOutcome) -> Self {
        Self {
            iteration,
            attempt,
            artifact: None,
            validation: None,
            execution: None,
            metrics: None,
            parse_error: None,
            outcome,
            recorded_at: Utc::now(),
        }
    }
}

impl Sanitize for AttemptRecord {
    fn sanitize(&mut self) {
        self.metrics.sanitize();
        if let Some(artifact) = self.artifact.as_mut() {
            artifact.parameters_mut().sanitize();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Termination {
    TargetReached,
    IterationsExhausted,
    RepairExhausted,
    SearchSpaceExhausted,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::TargetReached => write!(f, "target-reached"),
            Termination::IterationsExhausted => write!(f, "iterations-exhausted"),
            Termination::RepairExhausted => write!(f, "repair-exhausted"),
            Termination::SearchSpaceExhausted => write!(f, "search-space-exhausted"),
        }
    }
}

/// What a successful run reports: always the best-reward attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub best_version: u32,
    pub best_iteration: u32,
    pub metrics: PerformanceMetrics,
    pub reward: Option<f64>,
    pub target_met: bool,
    pub termination: Termination,
}

impl RunOutcome {
    pub fn from_best(best: &OptimizationAttempt, target_return_pct: f64, termination: Termination) -> Self {
        Self {
            best_version: best.artifact_version,
            best_iteration: best.iteration,
            metrics: best.metrics.clone(),
            reward: best.reward,
            target_met: best.metrics.meets_target(target_return_pct),
            termination,
        }
    }
}

impl Sanitize for RunOutcome {
    fn sanitize(&mut self) {
        self.metrics.sanitize();
        self.reward = self.reward.filter(|r| r.is_finite());
    }
}

/// Explicit context of one pipeline run, threaded through every phase.
///
/// All mutation goes through methods that refuse to touch a run once its
/// status is terminal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRun {
    id: RunId,
    idea: StrategyIdea,
    spec: Option<StrategySpec>,
    phase: PipelinePhase,
    status: RunStatus,
    attempts: Vec<AttemptRecord>,
    optimization: OptimizationHistory,
    outcome: Option<RunOutcome>,
    created_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    error: Option<String>,
    last_version: u32,
}

impl PipelineRun {
    /// Until research names a ticker the id carries a placeholder prefix
    pub fn new(idea: StrategyIdea) -> Self {
        let created_at = Utc::now();
        Self {
            id: RunId::generate("UNRESOLVED", "pending", created_at),
            idea,
            spec: None,
            phase: PipelinePhase::Research,
            status: RunStatus::Running,
            attempts: Vec::new(),
            optimization: OptimizationHistory::new(),
            outcome: None,
            created_at,
            finished_at: None,
            error: None,
            last_version: 0,
        }
    }

    pub fn id(&self) -> &RunId {
        &self.id
    }

    pub fn idea(&self) -> &StrategyIdea {
        &self.idea
    }

    pub fn spec(&self) -> Option<&StrategySpec> {
        self.spec.as_ref()
    }

    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    pub fn optimization(&self) -> &OptimizationHistory {
        &self.optimization
    }

    pub fn outcome(&self) -> Option<&RunOutcome> {
        self.outcome.as_ref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        self.finished_at
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn ensure_running(&self) -> Result<(), RunStateError> {
        if self.status.is_terminal() {
            return Err(RunStateError::AlreadyTerminal {
                run_id: self.id.to_string(),
                status: self.status,
            });
        }
        Ok(())
    }

    /// Stores the spec and re-derives the id from its ticker and strategy type
    pub fn attach_spec(&mut self, spec: StrategySpec) -> Result<(), RunStateError> {
        self.ensure_running()?;
        self.id = self.id.rebase(&spec.ticker, &spec.strategy_type);
        self.spec = Some(spec);
        Ok(())
    }

    pub fn enter_phase(&mut self, phase: PipelinePhase) -> Result<(), RunStateError> {
        self.ensure_running()?;
        self.phase = phase;
        Ok(())
    }

    /// Next artifact version; strictly increasing over the life of the run
    pub fn allocate_version(&mut self) -> Result<u32, RunStateError> {
        self.ensure_running()?;
        self.last_version += 1;
        Ok(self.last_version)
    }

    pub fn record_attempt(&mut self, record: AttemptRecord) -> Result<(), RunStateError> {
        self.ensure_running()?;
        self.attempts.push(record);
        Ok(())
    }

    /// Appends to the optimization history; returns whether the best pointer moved
    pub fn record_optimization(&mut self, attempt: OptimizationAttempt) -> Result<bool, RunStateError> {
        self.ensure_running()?;
        self.optimization.record(attempt).map_err(|HistoryOrderError { iteration, last }| {
            RunStateError::IterationOutOfOrder {
                run_id: self.id.to_string(),
                iteration,
                last,
            }
        })
    }

    /// Moves the run to a terminal status. Succeeds exactly once.
    pub fn finish(
        &mut self,
        status: RunStatus,
        outcome: Option<RunOutcome>,
        error: Option<String>,
    ) -> Result<(), RunStateError> {
        self.ensure_running()?;
        if !status.is_terminal() {
            return Err(RunStateError::NotTerminal {
                run_id: self.id.to_string(),
                status,
            });
        }
        self.status = status;
        self.phase = PipelinePhase::Done;
        self.outcome = outcome;
        self.error = error;
        self.finished_at = Some(Utc::now());
        Ok(())
    }

    pub fn summary(&self) -> PipelineRunSummary {
        PipelineRunSummary {
            id: self.id.clone(),
            ticker: self.spec.as_ref().map(|s| s.ticker.clone()),
            strategy_type: self.spec.as_ref().map(|s| s.strategy_type.clone()),
            status: self.status,
            attempt_count: self.attempts.len(),
            best_reward: self.outcome.as_ref().and_then(|o| o.reward),
            created_at: self.created_at,
            finished_at: self.finished_at,
        }
    }
}

impl Sanitize for PipelineRun {
    fn sanitize(&mut self) {
        if let Some(spec) = self.spec.as_mut() {
            spec.parameters.sanitize();
            if !spec.target_return_pct.is_finite() {
                spec.target_return_pct = 0.0;
            }
        }
        self.attempts.sanitize();
        self.optimization.sanitize();
        self.outcome.sanitize();
    }
}

/// Listing row for stored runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRunSummary {
    pub id: RunId,
    pub ticker: Option<String>,
    pub strategy_type: Option<String>,
    pub status: RunStatus,
    pub attempt_count: usize,
    pub best_reward: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunFilter {
    pub ticker: Option<String>,
    pub status: Option<RunStatus>,
    pub limit: Option<usize>,
}

impl RunFilter {
    pub fn matches(&self, summary: &PipelineRunSummary) -> bool {
        if let Some(ticker) = &self.ticker
            && summary
                .ticker
                .as_deref()
                .is_none_or(|t| !t.eq_ignore_ascii_case(ticker))
        {
            return false;
        }
        if let Some(status) = self.status
            && summary.status != status
        {
            return false;
        }
        true
    }

    /// Filters, sorts newest first and applies the limit
    pub fn apply(&self, mut summaries: Vec<PipelineRunSummary>) -> Vec<PipelineRunSummary> {
        summaries.retain(|s| self.matches(s));
        summaries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        if let Some(limit) = self.limit {
            summaries.truncate(limit);
        }
        summaries
    }
}
