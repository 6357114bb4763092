use crate::application::optimization::{OptimizationConfig, OptimizationLoop, OptimizationOutcome};
use crate::application::pipeline::repair_loop::{RepairContext, RepairLoop, RepairLoopConfig, RepairOutcome};
use crate::application::research::ResearchTranslator;
use crate::application::synthesis::{CodeSynthesizer, SynthesisRequest};
use crate::application::validation::{StaticValidator, check_request};
use crate::domain::cancellation::CancelSignal;
use crate::domain::errors::{DataUnavailableError, PipelineError};
use crate::domain::market::candle::OhlcvSeries;
use crate::domain::market::timeframe::{WindowCheck, check_window};
use crate::domain::performance::Sanitize;
use crate::domain::pipeline::{PipelinePhase, PipelineRun, RunOutcome, RunStatus};
use crate::domain::ports::{LanguageModelService, MarketDataProvider, SandboxEnvironment};
use crate::domain::repositories::ResultStore;
use crate::domain::strategy::{StrategyIdea, StrategySpec};
use crate::domain::validation::data_quality::StrictCandleValidator;
use crate::infrastructure::observability::Metrics;
use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

/// External collaborators one orchestrator talks to
#[derive(Clone)]
pub struct PipelineServices {
    pub llm: Arc<dyn LanguageModelService>,
    pub sandbox: Arc<dyn SandboxEnvironment>,
    /// Without a provider, generated code gets no `ohlcv.csv`
    pub market_data: Option<Arc<dyn MarketDataProvider>>,
    pub store: Arc<dyn ResultStore>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    pub repair: RepairLoopConfig,
    pub optimization: OptimizationConfig,
}

#[derive(Debug, Clone)]
pub struct RunRequest {
    pub idea: StrategyIdea,
    /// Overrides any target stated in the idea text
    pub target_return_pct: Option<f64>,
}

impl RunRequest {
    pub fn new(idea: StrategyIdea) -> Self {
        Self {
            idea,
            target_return_pct: None,
        }
    }

    pub fn with_target(mut self, target_return_pct: f64) -> Self {
        self.target_return_pct = Some(target_return_pct);
        self
    }
}

/// How the phases ended, before it is mapped to a terminal status
enum Completion {
    Finished(RunOutcome),
    RepairExhausted,
    Cancelled,
}

fn ensure_not_cancelled(cancel: &CancelSignal) -> Result<(), PipelineError> {
    if cancel.is_cancelled() {
        return Err(PipelineError::Cancelled);
    }
    Ok(())
}

/// Drives one `PipelineRun` through research, synthesis, validation, repair,
/// execution, parsing and optimization, then persists it exactly once.
pub struct PipelineOrchestrator {
    translator: ResearchTranslator,
    repair: Arc<RepairLoop>,
    optimizer: OptimizationLoop,
    market_data: Option<Arc<dyn MarketDataProvider>>,
    store: Arc<dyn ResultStore>,
    metrics: Metrics,
}

impl PipelineOrchestrator {
    pub fn new(services: PipelineServices, config: PipelineConfig, metrics: Metrics) -> Self {
        let repair = Arc::new(RepairLoop::new(
            Arc::new(CodeSynthesizer::new(services.llm.clone())),
            Arc::new(StaticValidator::standard()),
            services.sandbox,
            metrics.clone(),
            config.repair,
        ));
        Self {
            translator: ResearchTranslator::new(services.llm),
            optimizer: OptimizationLoop::new(repair.clone(), config.optimization),
            repair,
            market_data: services.market_data,
            store: services.store,
            metrics,
        }
    }

    pub fn store(&self) -> &Arc<dyn ResultStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Runs the pipeline to a terminal status and stores the run.
    ///
    /// Pipeline failures are captured in the returned run (`ERROR`, `FAILED`,
    /// `CANCELLED`); only a failure to persist is returned as an error.
    pub async fn execute(&self, request: RunRequest, cancel: CancelSignal) -> Result<PipelineRun> {
        let mut run = PipelineRun::new(request.idea);
        self.metrics.runs_in_flight.inc();
        let completion = self.drive(&mut run, request.target_return_pct, &cancel).await;
        self.metrics.runs_in_flight.dec();

        let (status, outcome, message) = match completion {
            Ok(Completion::Finished(outcome)) => (RunStatus::Success, Some(outcome), None),
            Ok(Completion::RepairExhausted) => (RunStatus::Failed, None, None),
            Ok(Completion::Cancelled) | Err(PipelineError::Cancelled) => (RunStatus::Cancelled, None, None),
            Err(err) => {
                error!("PipelineOrchestrator: run {} failed in {}: {}", run.id(), run.phase(), err);
                (RunStatus::Error, None, Some(err.to_string()))
            }
        };

        run.finish(status, outcome, message)
            .with_context(|| format!("Failed to finish run {}", run.id()))?;
        run.sanitize();
        self.metrics.inc_runs(status.as_str());

        self.store
            .save(&run)
            .await
            .with_context(|| format!("Failed to store run {}", run.id()))?;
        info!(
            "PipelineOrchestrator: run {} finished {} after {} attempt(s)",
            run.id(),
            status,
            run.attempts().len()
        );
        Ok(run)
    }

    async fn drive(
        &self,
        run: &mut PipelineRun,
        target_return_pct: Option<f64>,
        cancel: &CancelSignal,
    ) -> Result<Completion, PipelineError> {
        ensure_not_cancelled(cancel)?;
        run.enter_phase(PipelinePhase::Research)?;
        let spec = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            spec = self.translator.translate(run.idea(), target_return_pct) => spec?,
        };
        run.attach_spec(spec.clone())?;
        info!("PipelineOrchestrator: run {} researched '{}'", run.id(), spec.name);

        Self::check_data_window(&spec)?;

        ensure_not_cancelled(cancel)?;
        let market_data = self.prefetch(&spec, cancel).await?;

        ensure_not_cancelled(cancel)?;
        let ctx = RepairContext {
            spec: &spec,
            iteration: 1,
            market_data: market_data.as_ref(),
            cancel,
        };
        let (baseline, baseline_metrics) = match self.repair.run(run, &ctx, SynthesisRequest::Initial).await? {
            RepairOutcome::Succeeded { artifact, metrics, .. } => (artifact, metrics),
            RepairOutcome::Exhausted { attempts } => {
                warn!(
                    "PipelineOrchestrator: run {} produced no runnable artifact in {} attempts",
                    run.id(),
                    attempts
                );
                return Ok(Completion::RepairExhausted);
            }
            RepairOutcome::Cancelled => return Ok(Completion::Cancelled),
        };

        ensure_not_cancelled(cancel)?;
        run.enter_phase(PipelinePhase::Optimize)?;
        match self.optimizer.run(run, &ctx, baseline, baseline_metrics).await? {
            OptimizationOutcome::Finished(outcome) => Ok(Completion::Finished(outcome)),
            OptimizationOutcome::Cancelled => Ok(Completion::Cancelled),
        }
    }

    /// Refuses specs whose window the provider cannot serve
    fn check_data_window(spec: &StrategySpec) -> Result<(), PipelineError> {
        match check_window(spec.timeframe, spec.history_window) {
            WindowCheck::Exceeds {
                requested_days,
                max_days,
            } => Err(DataUnavailableError::WindowExceedsLimit {
                timeframe: spec.timeframe,
                requested_days,
                max_days,
            }
            .into()),
            WindowCheck::NearLimit { .. } => {
                if let Some(finding) = check_request(spec.timeframe, spec.history_window, None) {
                    warn!("PipelineOrchestrator: {}", finding.message);
                }
                Ok(())
            }
            WindowCheck::Within => Ok(()),
        }
    }

    async fn prefetch(&self, spec: &StrategySpec, cancel: &CancelSignal) -> Result<Option<OhlcvSeries>, PipelineError> {
        let Some(provider) = &self.market_data else {
            return Ok(None);
        };
        let mut series = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(PipelineError::Cancelled),
            series = provider.get_series(&spec.ticker, spec.timeframe, spec.history_window) => series?,
        };
        let dropped = StrictCandleValidator::sanitize_series(&mut series);
        if dropped > 0 {
            warn!(
                "PipelineOrchestrator: dropped {} invalid {} bars for {}",
                dropped, spec.timeframe, spec.ticker
            );
        }
        if series.is_empty() {
            return Err(DataUnavailableError::Unavailable {
                ticker: spec.ticker.clone(),
                reason: "no valid bars in the requested window".to_string(),
            }
            .into());
        }
        info!(
            "PipelineOrchestrator: prefetched {} {} bars for {}",
            series.len(),
            spec.timeframe,
            spec.ticker
        );
        Ok(Some(series))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::metrics_parser::render_block;
    use crate::domain::cancellation::cancellation_pair;
    use crate::domain::errors::LlmServiceError;
    use crate::domain::market::candle::Candle;
    use crate::domain::performance::PerformanceMetrics;
    use crate::domain::pipeline::{AttemptOutcome, RunFilter};
    use crate::domain::strategy::IdeaOrigin;
    use crate::infrastructure::market_data::InMemoryMarketData;
    use crate::infrastructure::mock::{ScriptedLanguageModel, ScriptedSandbox};
    use crate::infrastructure::persistence::InMemoryResultStore;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    const SPEC_JSON: &str = r#"{"name": "Dip buyer", "ticker": "spy", "timeframe": "1d",
        "history_window": "1y", "entry_rules": ["RSI below 30"], "exit_rules": ["RSI above 55"]}"#;

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

    fn stats(return_pct: f64) -> String {
        render_block(&PerformanceMetrics {
            return_pct: Some(return_pct),
            sharpe: Some(1.2),
            win_rate: Some(55.0),
            max_drawdown: Some(-6.0),
            trade_count: Some(25),
            profit_factor: Some(1.5),
            ..Default::default()
        })
    }

    fn orchestrator(
        llm: Arc<ScriptedLanguageModel>,
        sandbox: Arc<ScriptedSandbox>,
        market_data: Option<Arc<dyn MarketDataProvider>>,
        store: Arc<InMemoryResultStore>,
    ) -> PipelineOrchestrator {
        PipelineOrchestrator::new(
            PipelineServices {
                llm,
                sandbox,
                market_data,
                store,
            },
            PipelineConfig::default(),
            Metrics::new().unwrap(),
        )
    }

    fn request() -> RunRequest {
        RunRequest::new(StrategyIdea::new("Buy SPY when RSI dips below 30", IdeaOrigin::Text)).with_target(10.0)
    }

    #[tokio::test]
    async fn test_successful_run_is_stored_once() {
        let llm = Arc::new(ScriptedLanguageModel::new([SPEC_JSON]).with_fallback(VALID));
        let sandbox = Arc::new(ScriptedSandbox::new(vec![
            ScriptedSandbox::exited_ok(stats(4.0)),
            ScriptedSandbox::exited_ok(stats(11.0)),
        ]));
        let store = Arc::new(InMemoryResultStore::new());
        let orchestrator = orchestrator(llm, sandbox, None, store.clone());

        let run = orchestrator.execute(request(), CancelSignal::never()).await.unwrap();
        assert_eq!(run.status(), RunStatus::Success);
        assert_eq!(run.phase(), PipelinePhase::Done);
        assert!(run.id().as_str().starts_with("SPY-dip-buyer-"));
        let outcome = run.outcome().unwrap();
        assert!(outcome.target_met);
        assert_eq!(outcome.metrics.return_pct, Some(11.0));

        let stored = store.get_run(run.id()).await.unwrap().unwrap();
        assert_eq!(stored, run);
        assert_eq!(store.list_runs(&RunFilter::default()).await.unwrap().len(), 1);
        assert!(orchestrator.metrics().render().contains("stratforge_runs_total{status=\"SUCCESS\"} 1"));
    }

    #[tokio::test]
    async fn test_empty_idea_errors_before_any_model_call() {
        let llm = Arc::new(ScriptedLanguageModel::new(Vec::<String>::new()));
        let store = Arc::new(InMemoryResultStore::new());
        let orchestrator = orchestrator(llm.clone(), Arc::new(ScriptedSandbox::new(vec![])), None, store);

        let run = orchestrator
            .execute(RunRequest::new(StrategyIdea::new("   ", IdeaOrigin::Note)), CancelSignal::never())
            .await
            .unwrap();
        assert_eq!(run.status(), RunStatus::Error);
        assert!(run.error().unwrap().contains("empty"));
        assert_eq!(llm.call_count(), 0);
    }

    #[tokio::test]
    async fn test_window_beyond_provider_limit_is_an_error() {
        let spec = r#"{"name": "Scalper", "ticker": "QQQ", "timeframe": "5m", "history_window": "2y",
            "entry_rules": ["breakout"], "exit_rules": ["breakdown"]}"#;
        let llm = Arc::new(ScriptedLanguageModel::new([spec]));
        let sandbox = Arc::new(ScriptedSandbox::new(vec![]));
        let orchestrator = orchestrator(llm.clone(), sandbox.clone(), None, Arc::new(InMemoryResultStore::new()));

        let run = orchestrator.execute(request(), CancelSignal::never()).await.unwrap();
        assert_eq!(run.status(), RunStatus::Error);
        assert!(run.error().unwrap().contains("limited to 60 days"));
        assert_eq!(llm.call_count(), 1);
        assert_eq!(sandbox.run_count(), 0);
    }

    #[tokio::test]
    async fn test_repair_exhaustion_fails_the_run() {
        let llm = Arc::new(ScriptedLanguageModel::new([SPEC_JSON]).with_fallback(VALID));
        let sandbox = Arc::new(
            ScriptedSandbox::new(vec![]).with_fallback(ScriptedSandbox::exited_with(1, "ImportError: pandas")),
        );
        let orchestrator = orchestrator(llm, sandbox.clone(), None, Arc::new(InMemoryResultStore::new()));

        let run = orchestrator.execute(request(), CancelSignal::never()).await.unwrap();
        assert_eq!(run.status(), RunStatus::Failed);
        assert!(run.outcome().is_none());
        assert_eq!(run.attempts().len(), 3);
        assert_eq!(sandbox.run_count(), 3);
    }

    #[tokio::test]
    async fn test_llm_exhaustion_errors_the_run() {
        let llm = Arc::new(ScriptedLanguageModel::new([SPEC_JSON]));
        llm.push_error(LlmServiceError::Exhausted {
            attempts: 3,
            last: "status 503".to_string(),
        });
        let orchestrator = orchestrator(llm, Arc::new(ScriptedSandbox::new(vec![])), None, Arc::new(InMemoryResultStore::new()));

        let run = orchestrator.execute(request(), CancelSignal::never()).await.unwrap();
        assert_eq!(run.status(), RunStatus::Error);
        assert!(run.error().unwrap().contains("after 3 attempts"));
    }

    #[tokio::test]
    async fn test_prefetched_series_reaches_the_sandbox() {
        let candles = (0..5)
            .map(|i| Candle {
                timestamp: 1_700_000_000_000 + i * 86_400_000,
                open: dec!(100),
                high: dec!(101),
                low: dec!(99),
                close: dec!(100.5),
                volume: dec!(1000),
            })
            .collect();
        let provider = InMemoryMarketData::new().with_series(OhlcvSeries::new(
            "SPY",
            crate::domain::market::timeframe::Timeframe::OneDay,
            candles,
        ));
        let llm = Arc::new(ScriptedLanguageModel::new([SPEC_JSON]).with_fallback(VALID));
        let sandbox = Arc::new(ScriptedSandbox::new(vec![ScriptedSandbox::exited_ok(stats(12.0))]));
        let orchestrator = orchestrator(llm, sandbox.clone(), Some(Arc::new(provider)), Arc::new(InMemoryResultStore::new()));

        let run = orchestrator.execute(request(), CancelSignal::never()).await.unwrap();
        assert_eq!(run.status(), RunStatus::Success);
        let requests = sandbox.requests();
        assert_eq!(requests[0].market_data.as_ref().map(|s| s.len()), Some(5));
    }

    #[tokio::test]
    async fn test_cancellation_mid_execution() {
        let llm = Arc::new(ScriptedLanguageModel::new([SPEC_JSON]).with_fallback(VALID));
        let sandbox = Arc::new(ScriptedSandbox::new(vec![]).with_delay(Duration::from_secs(60)));
        let store = Arc::new(InMemoryResultStore::new());
        let orchestrator = orchestrator(llm, sandbox, None, store.clone());
        let (handle, cancel) = cancellation_pair();

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            handle.cancel();
        });
        let run = orchestrator.execute(request(), cancel).await.unwrap();
        canceller.await.unwrap();

        assert_eq!(run.status(), RunStatus::Cancelled);
        assert_eq!(run.attempts().last().unwrap().outcome, AttemptOutcome::Cancelled);
        assert!(store.get_run(run.id()).await.unwrap().is_some());
    }
}
