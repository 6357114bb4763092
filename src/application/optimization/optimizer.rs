use crate::application::optimization::search_space::SearchSpace;
use crate::application::optimization::tuner::CoordinateTuner;
use crate::application::pipeline::repair_loop::{RepairContext, RepairLoop, RepairOutcome};
use crate::application::synthesis::SynthesisRequest;
use crate::domain::artifact::CandidateArtifact;
use crate::domain::errors::PipelineError;
use crate::domain::optimization::{OptimizationAttempt, RewardWeights};
use crate::domain::performance::PerformanceMetrics;
use crate::domain::pipeline::{PipelinePhase, PipelineRun, RunOutcome, Termination};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationConfig {
    /// Evaluated parameter sets per run, the baseline included
    pub max_iterations: u32,
    pub weights: RewardWeights,
    pub search_space: SearchSpace,
    pub step_multipliers: Vec<u32>,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            weights: RewardWeights::default(),
            search_space: SearchSpace::standard(),
            step_multipliers: vec![1, 2, 4],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OptimizationOutcome {
    /// Best-reward attempt, whatever ended the search
    Finished(RunOutcome),
    Cancelled,
}

/// Optimize-toward-target loop.
///
/// Iteration 1 is the already executed baseline. Each later iteration moves
/// one parameter of the best set so far, asks for an optimized artifact and
/// runs it through the repair loop. The best pointer only moves on a strictly
/// better reward, so a worse late attempt never replaces an earlier best.
pub struct OptimizationLoop {
    repair: Arc<RepairLoop>,
    config: OptimizationConfig,
}

impl OptimizationLoop {
    pub fn new(repair: Arc<RepairLoop>, config: OptimizationConfig) -> Self {
        Self { repair, config }
    }

    fn record(
        &self,
        run: &mut PipelineRun,
        iteration: u32,
        artifact: &CandidateArtifact,
        metrics: PerformanceMetrics,
    ) -> Result<bool, PipelineError> {
        let reward = self.config.weights.reward(&metrics);
        info!(
            "OptimizationLoop: iteration {} v{} reward {:?} ({})",
            iteration,
            artifact.version(),
            reward,
            artifact.parameters()
        );
        let moved = run.record_optimization(OptimizationAttempt {
            iteration,
            artifact_version: artifact.version(),
            parameters: artifact.parameters().clone(),
            metrics,
            reward,
        })?;
        Ok(moved)
    }

    fn finish(&self, run: &PipelineRun, target: f64, termination: Termination) -> Result<OptimizationOutcome, PipelineError> {
        let best = run
            .optimization()
            .best()
            .ok_or_else(|| PipelineError::Internal("optimization finished without a baseline".to_string()))?;
        info!(
            "OptimizationLoop: run {} finished ({}) with best v{} reward {:?}",
            run.id(),
            termination,
            best.artifact_version,
            best.reward
        );
        Ok(OptimizationOutcome::Finished(RunOutcome::from_best(best, target, termination)))
    }

    pub async fn run(
        &self,
        run: &mut PipelineRun,
        ctx: &RepairContext<'_>,
        baseline: CandidateArtifact,
        baseline_metrics: PerformanceMetrics,
    ) -> Result<OptimizationOutcome, PipelineError> {
        let target = ctx.spec.target_return_pct;
        let reached = baseline_metrics.meets_target(target);
        self.record(run, 1, &baseline, baseline_metrics)?;
        if reached {
            return self.finish(run, target, Termination::TargetReached);
        }

        let space = self.config.search_space.clone().covering(baseline.parameters().iter());
        let mut tuner = CoordinateTuner::with_multipliers(space, self.config.step_multipliers.clone());
        let mut best_artifact = baseline;

        for iteration in 2..=self.config.max_iterations {
            if ctx.cancel.is_cancelled() {
                return Ok(OptimizationOutcome::Cancelled);
            }
            run.enter_phase(PipelinePhase::Optimize)?;

            let latest_metrics = match run.optimization().latest() {
                Some(latest) => latest.metrics.clone(),
                None => PerformanceMetrics::unavailable(),
            };
            let Some((parameters, delta)) = tuner.propose(best_artifact.parameters(), &latest_metrics) else {
                return self.finish(run, target, Termination::SearchSpaceExhausted);
            };
            info!("OptimizationLoop: iteration {} tries {}", iteration, delta);

            let request = SynthesisRequest::Optimize {
                base: best_artifact.clone(),
                previous_metrics: latest_metrics,
                parameters,
            };
            let iteration_ctx = RepairContext {
                spec: ctx.spec,
                iteration,
                market_data: ctx.market_data,
                cancel: ctx.cancel,
            };

            match self.repair.run(run, &iteration_ctx, request).await? {
                RepairOutcome::Succeeded { artifact, metrics, .. } => {
                    let reached = metrics.meets_target(target);
                    if self.record(run, iteration, &artifact, metrics)? {
                        best_artifact = artifact;
                    }
                    if reached {
                        return self.finish(run, target, Termination::TargetReached);
                    }
                }
                RepairOutcome::Exhausted { attempts } => {
                    warn!(
                        "OptimizationLoop: iteration {} could not be repaired in {} attempts; keeping best so far",
                        iteration, attempts
                    );
                    return self.finish(run, target, Termination::RepairExhausted);
                }
                RepairOutcome::Cancelled => return Ok(OptimizationOutcome::Cancelled),
            }
        }

        self.finish(run, target, Termination::IterationsExhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::metrics_parser::render_block;
    use crate::application::pipeline::repair_loop::RepairLoopConfig;
    use crate::application::synthesis::CodeSynthesizer;
    use crate::application::validation::StaticValidator;
    use crate::domain::artifact::ArtifactPhase;
    use crate::domain::cancellation::CancelSignal;
    use crate::domain::market::timeframe::{HistoryWindow, Timeframe};
    use crate::domain::strategy::{IdeaOrigin, StrategyIdea, StrategySpec, TradeDirection};
    use crate::infrastructure::mock::{ScriptedLanguageModel, ScriptedSandbox};
    use crate::infrastructure::observability::Metrics;
    use rust_decimal_macros::dec;

    const VALID: &str = "```python
position_size = 0.4
entry_price = 100.0
stop_loss = entry_price * 0.98
take_profit = entry_price * 1.04

for bar in bars:
    if bar.signal > 0:
        buy(size=position_size, sl=stop_loss, tp=take_profit)
    elif bar.signal < 0:
        position.close()
```";

    fn spec(target: f64) -> StrategySpec {
        StrategySpec {
            name: "Trend rider".to_string(),
            strategy_type: "trend-rider".to_string(),
            entry_rules: vec!["close above 50-day average".to_string()],
            exit_rules: vec!["close below 50-day average".to_string()],
            ticker: "IWM".to_string(),
            timeframe: Timeframe::OneDay,
            history_window: HistoryWindow::Days(365),
            direction: TradeDirection::Long,
            initial_capital: dec!(10000),
            target_return_pct: target,
            parameters: StrategySpec::default_parameters(),
        }
    }

    /// Stats whose reward is exactly `return_pct / 100 * 0.5`
    fn stats(return_pct: f64) -> String {
        render_block(&PerformanceMetrics {
            return_pct: Some(return_pct),
            sharpe: Some(0.0),
            win_rate: Some(0.0),
            trade_count: Some(10),
            ..Default::default()
        })
    }

    fn optimizer(sandbox: Arc<ScriptedSandbox>, max_iterations: u32, max_attempts: u32) -> OptimizationLoop {
        let llm = Arc::new(ScriptedLanguageModel::new(Vec::<String>::new()).with_fallback(VALID));
        let repair = RepairLoop::new(
            Arc::new(CodeSynthesizer::new(llm)),
            Arc::new(StaticValidator::standard()),
            sandbox,
            Metrics::new().unwrap(),
            RepairLoopConfig {
                max_attempts,
                ..Default::default()
            },
        );
        OptimizationLoop::new(
            Arc::new(repair),
            OptimizationConfig {
                max_iterations,
                ..Default::default()
            },
        )
    }

    fn baseline(run: &mut PipelineRun, spec: &StrategySpec) -> CandidateArtifact {
        let version = run.allocate_version().unwrap();
        CandidateArtifact::new(version, ArtifactPhase::Synthesized, "print(1)\n".to_string(), spec.parameters.clone())
    }

    fn new_run(spec: &StrategySpec) -> PipelineRun {
        let mut run = PipelineRun::new(StrategyIdea::new("ride trends", IdeaOrigin::Text));
        run.attach_spec(spec.clone()).unwrap();
        run
    }

    fn metrics(return_pct: f64) -> PerformanceMetrics {
        crate::application::metrics_parser::parse_stdout(&stats(return_pct)).unwrap()
    }

    #[tokio::test]
    async fn test_best_attempt_is_kept() {
        // rewards 0.3, 0.5, 0.2, 0.6, 0.1
        let sandbox = Arc::new(ScriptedSandbox::new(
            [100.0, 40.0, 120.0, 20.0].iter().map(|r| ScriptedSandbox::exited_ok(stats(*r))).collect(),
        ));
        let spec = spec(1000.0);
        let mut run = new_run(&spec);
        let base = baseline(&mut run, &spec);
        let cancel = CancelSignal::never();
        let ctx = RepairContext { spec: &spec, iteration: 1, market_data: None, cancel: &cancel };

        let outcome = optimizer(sandbox, 5, 3).run(&mut run, &ctx, base, metrics(60.0)).await.unwrap();
        let OptimizationOutcome::Finished(outcome) = outcome else {
            panic!("optimization was cancelled");
        };

        let rewards: Vec<Option<f64>> = run.optimization().attempts().iter().map(|a| a.reward).collect();
        assert_eq!(rewards, vec![Some(0.3), Some(0.5), Some(0.2), Some(0.6), Some(0.1)]);
        assert_eq!(outcome.reward, Some(0.6));
        assert_eq!(outcome.best_iteration, 4);
        assert_eq!(outcome.termination, Termination::IterationsExhausted);
        assert!(!outcome.target_met);
    }

    #[tokio::test]
    async fn test_stops_when_target_met() {
        let sandbox = Arc::new(ScriptedSandbox::new(vec![
            ScriptedSandbox::exited_ok(stats(5.0)),
            ScriptedSandbox::exited_ok(stats(12.0)),
        ]));
        let spec = spec(10.0);
        let mut run = new_run(&spec);
        let base = baseline(&mut run, &spec);
        let cancel = CancelSignal::never();
        let ctx = RepairContext { spec: &spec, iteration: 1, market_data: None, cancel: &cancel };

        let outcome = optimizer(sandbox.clone(), 10, 3).run(&mut run, &ctx, base, metrics(2.0)).await.unwrap();
        let OptimizationOutcome::Finished(outcome) = outcome else {
            panic!("optimization was cancelled");
        };
        assert_eq!(outcome.termination, Termination::TargetReached);
        assert!(outcome.target_met);
        assert_eq!(outcome.metrics.return_pct, Some(12.0));
        assert_eq!(run.optimization().len(), 3);
        assert_eq!(sandbox.run_count(), 2);
    }

    #[tokio::test]
    async fn test_baseline_meeting_target_skips_search() {
        let sandbox = Arc::new(ScriptedSandbox::new(vec![]));
        let spec = spec(10.0);
        let mut run = new_run(&spec);
        let base = baseline(&mut run, &spec);
        let cancel = CancelSignal::never();
        let ctx = RepairContext { spec: &spec, iteration: 1, market_data: None, cancel: &cancel };

        let outcome = optimizer(sandbox.clone(), 10, 3).run(&mut run, &ctx, base, metrics(15.0)).await.unwrap();
        assert!(matches!(
            outcome,
            OptimizationOutcome::Finished(RunOutcome { termination: Termination::TargetReached, .. })
        ));
        assert_eq!(sandbox.run_count(), 0);
    }

    #[tokio::test]
    async fn test_repair_exhaustion_reports_best_so_far() {
        let sandbox = Arc::new(ScriptedSandbox::new(vec![ScriptedSandbox::exited_ok(stats(8.0))]).with_fallback(
            ScriptedSandbox::exited_with(1, "ZeroDivisionError"),
        ));
        let spec = spec(50.0);
        let mut run = new_run(&spec);
        let base = baseline(&mut run, &spec);
        let cancel = CancelSignal::never();
        let ctx = RepairContext { spec: &spec, iteration: 1, market_data: None, cancel: &cancel };

        let outcome = optimizer(sandbox, 10, 2).run(&mut run, &ctx, base, metrics(4.0)).await.unwrap();
        let OptimizationOutcome::Finished(outcome) = outcome else {
            panic!("optimization was cancelled");
        };
        assert_eq!(outcome.termination, Termination::RepairExhausted);
        assert_eq!(outcome.metrics.return_pct, Some(8.0));
        assert_eq!(outcome.best_iteration, 2);
    }

    #[tokio::test]
    async fn test_optimized_artifacts_carry_proposed_parameters() {
        let sandbox = Arc::new(ScriptedSandbox::new(vec![]).with_fallback(ScriptedSandbox::exited_ok(stats(1.0))));
        let spec = spec(100.0);
        let mut run = new_run(&spec);
        let base = baseline(&mut run, &spec);
        let cancel = CancelSignal::never();
        let ctx = RepairContext { spec: &spec, iteration: 1, market_data: None, cancel: &cancel };

        optimizer(sandbox, 4, 3).run(&mut run, &ctx, base, metrics(1.0)).await.unwrap();
        let signatures: Vec<String> = run
            .optimization()
            .attempts()
            .iter()
            .map(|a| a.parameters.signature())
            .collect();
        let mut unique = signatures.clone();
        unique.sort();
        unique.dedup();
        assert_eq!(signatures.len(), 4);
        assert_eq!(unique.len(), 4);
    }
}
