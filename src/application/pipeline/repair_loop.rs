use crate::application::metrics_parser;
use crate::application::synthesis::{CodeSynthesizer, RepairFeedback, SynthesisRequest, SynthesizeError};
use crate::application::validation::StaticValidator;
use crate::domain::artifact::CandidateArtifact;
use crate::domain::cancellation::CancelSignal;
use crate::domain::errors::{PipelineError, SandboxError};
use crate::domain::execution::ExecutionRequest;
use crate::domain::market::candle::OhlcvSeries;
use crate::domain::performance::PerformanceMetrics;
use crate::domain::pipeline::{AttemptOutcome, AttemptRecord, PipelinePhase, PipelineRun};
use crate::domain::ports::SandboxEnvironment;
use crate::domain::strategy::StrategySpec;
use crate::infrastructure::observability::Metrics;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct RepairLoopConfig {
    /// Total attempts per loop, the first synthesis included
    pub max_attempts: u32,
    pub sandbox_timeout: Duration,
    /// Lines of stderr/stdout handed back to the synthesizer after a failed run
    pub output_tail_lines: usize,
}

impl Default for RepairLoopConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            sandbox_timeout: Duration::from_secs(120),
            output_tail_lines: 40,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RepairOutcome {
    Succeeded {
        artifact: CandidateArtifact,
        metrics: PerformanceMetrics,
        attempts: u32,
    },
    Exhausted {
        attempts: u32,
    },
    Cancelled,
}

/// Where one repair loop starts and what it runs against
pub struct RepairContext<'a> {
    pub spec: &'a StrategySpec,
    /// Optimization iteration the attempts are recorded under (1 = baseline)
    pub iteration: u32,
    pub market_data: Option<&'a OhlcvSeries>,
    pub cancel: &'a CancelSignal,
}

/// Bounded synthesize → validate → execute → parse loop.
///
/// Every attempt is recorded on the run. An artifact only reaches the
/// sandbox once its validation report has no errors.
pub struct RepairLoop {
    synthesizer: Arc<CodeSynthesizer>,
    validator: Arc<StaticValidator>,
    sandbox: Arc<dyn SandboxEnvironment>,
    metrics: Metrics,
    config: RepairLoopConfig,
}

impl RepairLoop {
    pub fn new(
        synthesizer: Arc<CodeSynthesizer>,
        validator: Arc<StaticValidator>,
        sandbox: Arc<dyn SandboxEnvironment>,
        metrics: Metrics,
        config: RepairLoopConfig,
    ) -> Self {
        Self {
            synthesizer,
            validator,
            sandbox,
            metrics,
            config,
        }
    }

    pub fn config(&self) -> &RepairLoopConfig {
        &self.config
    }

    fn record(&self, run: &mut PipelineRun, record: AttemptRecord) -> Result<(), PipelineError> {
        self.metrics.inc_attempts(record.outcome.label());
        run.record_attempt(record)?;
        Ok(())
    }

    fn record_cancelled(
        &self,
        run: &mut PipelineRun,
        ctx: &RepairContext<'_>,
        attempt: u32,
    ) -> Result<RepairOutcome, PipelineError> {
        info!("RepairLoop: run {} cancelled during attempt {}", run.id(), attempt);
        self.record(run, AttemptRecord::new(ctx.iteration, attempt, AttemptOutcome::Cancelled))?;
        Ok(RepairOutcome::Cancelled)
    }

    /// Runs at most `max_attempts` attempts starting from `request`.
    ///
    /// Validation and execution failures are fed back as repair requests and
    /// never escape. Language-model exhaustion and sandbox environment
    /// failures are returned as errors.
    pub async fn run(
        &self,
        run: &mut PipelineRun,
        ctx: &RepairContext<'_>,
        request: SynthesisRequest,
    ) -> Result<RepairOutcome, PipelineError> {
        let parameters = request.parameters(ctx.spec).clone();
        let mut previous: Option<CandidateArtifact> = match &request {
            SynthesisRequest::Optimize { base, .. } => Some(base.clone()),
            SynthesisRequest::Repair { previous, .. } => previous.clone(),
            SynthesisRequest::Initial => None,
        };
        let mut request = request;

        for attempt in 1..=self.config.max_attempts {
            if ctx.cancel.is_cancelled() {
                return self.record_cancelled(run, ctx, attempt);
            }

            run.enter_phase(if attempt == 1 {
                PipelinePhase::Synthesize
            } else {
                PipelinePhase::Repair
            })?;
            let version = run.allocate_version()?;

            let synthesized = tokio::select! {
                biased;
                _ = ctx.cancel.cancelled() => return self.record_cancelled(run, ctx, attempt),
                result = self.synthesizer.synthesize(ctx.spec, &request, version) => result,
            };

            let artifact = match synthesized {
                Ok(artifact) => artifact,
                Err(SynthesizeError::Service(err)) => return Err(err.into()),
                Err(SynthesizeError::Invalid(err)) => {
                    warn!("RepairLoop: attempt {}/{} produced no artifact: {}", attempt, self.config.max_attempts, err);
                    let reason = err.to_string();
                    self.record(
                        run,
                        AttemptRecord::new(ctx.iteration, attempt, AttemptOutcome::SynthesisFailed { reason: reason.clone() }),
                    )?;
                    request = SynthesisRequest::Repair {
                        previous: previous.clone(),
                        parameters: parameters.clone(),
                        feedback: RepairFeedback::Synthesis(reason),
                    };
                    continue;
                }
            };

            run.enter_phase(PipelinePhase::Validate)?;
            let report = self.validator.validate(&artifact);
            for finding in &report.findings {
                self.metrics
                    .inc_findings(finding.category.as_str(), &finding.severity.to_string());
            }

            if !report.passed() {
                info!(
                    "RepairLoop: v{} rejected with {} error(s), {} warning(s)",
                    artifact.version(),
                    report.error_count(),
                    report.warning_count()
                );
                let mut record = AttemptRecord::new(
                    ctx.iteration,
                    attempt,
                    AttemptOutcome::ValidationFailed {
                        errors: report.error_count(),
                    },
                );
                record.artifact = Some(artifact.clone());
                record.validation = Some(report.clone());
                self.record(run, record)?;

                request = SynthesisRequest::Repair {
                    previous: Some(artifact.clone()),
                    parameters: parameters.clone(),
                    feedback: RepairFeedback::Findings(report),
                };
                previous = Some(artifact);
                continue;
            }

            if ctx.cancel.is_cancelled() {
                return self.record_cancelled(run, ctx, attempt);
            }
            run.enter_phase(PipelinePhase::Execute)?;
            let execution_request = ExecutionRequest {
                run_id: run.id().to_string(),
                artifact_version: artifact.version(),
                source: artifact.source().to_string(),
                market_data: ctx.market_data.cloned(),
                timeout: self.config.sandbox_timeout,
            };

            let result = match self.sandbox.run(execution_request, ctx.cancel).await {
                Ok(result) => result,
                Err(SandboxError::Cancelled) => return self.record_cancelled(run, ctx, attempt),
                Err(err) => return Err(err.into()),
            };

            let failure = result.failure();
            self.metrics.observe_sandbox(
                &failure.map_or_else(|| "ok".to_string(), |f| f.to_string()),
                result.duration().as_secs_f64(),
            );

            if let Some(failure) = failure {
                info!(
                    "RepairLoop: v{} failed in sandbox ({}) after {} ms",
                    artifact.version(),
                    failure,
                    result.duration_ms
                );
                let output_tail = result.output_tail(self.config.output_tail_lines);
                let mut record = AttemptRecord::new(ctx.iteration, attempt, AttemptOutcome::ExecutionFailed { failure });
                record.artifact = Some(artifact.clone());
                record.validation = Some(report);
                record.execution = Some(result);
                self.record(run, record)?;

                request = SynthesisRequest::Repair {
                    previous: Some(artifact.clone()),
                    parameters: parameters.clone(),
                    feedback: RepairFeedback::Execution { failure, output_tail },
                };
                previous = Some(artifact);
                continue;
            }

            run.enter_phase(PipelinePhase::Parse)?;
            let (metrics, parse_error) = metrics_parser::parse_or_degrade(&result);
            debug!("RepairLoop: v{} metrics {:?}", artifact.version(), metrics);

            let mut record = AttemptRecord::new(ctx.iteration, attempt, AttemptOutcome::Executed);
            record.artifact = Some(artifact.clone());
            record.validation = Some(report);
            record.execution = Some(result);
            record.metrics = Some(metrics.clone());
            record.parse_error = parse_error.map(|e| e.to_string());
            self.record(run, record)?;

            return Ok(RepairOutcome::Succeeded {
                artifact,
                metrics,
                attempts: attempt,
            });
        }

        warn!(
            "RepairLoop: run {} exhausted {} attempts in iteration {}",
            run.id(),
            self.config.max_attempts,
            ctx.iteration
        );
        Ok(RepairOutcome::Exhausted {
            attempts: self.config.max_attempts,
        })
    }
}
