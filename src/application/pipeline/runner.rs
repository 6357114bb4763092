use crate::application::pipeline::orchestrator::{PipelineOrchestrator, RunRequest};
use crate::domain::cancellation::CancelSignal;
use crate::domain::pipeline::PipelineRun;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Runs independent pipeline runs concurrently, at most `max_concurrent` at a time.
///
/// Each run owns its own `PipelineRun`; the result store is the only shared state.
pub struct PipelineRunner {
    orchestrator: Arc<PipelineOrchestrator>,
    permits: Arc<Semaphore>,
}

impl PipelineRunner {
    pub fn new(orchestrator: Arc<PipelineOrchestrator>, max_concurrent: usize) -> Self {
        Self {
            orchestrator,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Starts one run on its own task; it waits for a permit before doing any work
    pub fn spawn(&self, request: RunRequest, cancel: CancelSignal) -> JoinHandle<Result<PipelineRun>> {
        let orchestrator = self.orchestrator.clone();
        let permits = self.permits.clone();
        tokio::spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .context("Pipeline runner semaphore closed")?;
            debug!("PipelineRunner: permit acquired for {:?} idea", request.idea.origin());
            orchestrator.execute(request, cancel).await
        })
    }

    /// Runs every request and returns results in request order
    pub async fn run_all(&self, requests: Vec<RunRequest>, cancel: CancelSignal) -> Vec<Result<PipelineRun>> {
        info!("PipelineRunner: starting {} run(s)", requests.len());
        let handles: Vec<_> = requests
            .into_iter()
            .map(|request| self.spawn(request, cancel.clone()))
            .collect();

        futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.context("Pipeline run task panicked")?)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::metrics_parser::render_block;
    use crate::application::pipeline::orchestrator::{PipelineConfig, PipelineServices};
    use crate::domain::performance::PerformanceMetrics;
    use crate::domain::pipeline::{RunFilter, RunStatus};
    use crate::domain::repositories::ResultStore;
    use crate::domain::strategy::{IdeaOrigin, StrategyIdea};
    use crate::infrastructure::mock::{ScriptedLanguageModel, ScriptedSandbox};
    use crate::infrastructure::observability::Metrics;
    use crate::infrastructure::persistence::InMemoryResultStore;
    use std::collections::HashSet;

    const SPEC_JSON: &str = r#"{"name": "Gap fill", "ticker": "DIA", "timeframe": "1h", "history_window": "90d",
        "entry_rules": ["gap down over 1%"], "exit_rules": ["gap filled"]}"#;

    const VALID: &str = "```python
position_size = 0.25
entry_price = 50.0
stop_loss = entry_price - 1.5
take_profit = entry_price + 3.0

for bar in bars:
    if bar.gap < -0.01:
        buy(size=position_size, sl=stop_loss, tp=take_profit)
    elif bar.filled:
        position.close()
```";

    #[tokio::test]
    async fn test_concurrent_runs_get_distinct_ids() {
        let llm = Arc::new(ScriptedLanguageModel::new(Vec::<String>::new()).with_fallback(
            // Research and synthesis both accept this reply: the JSON object for
            // research, the fenced block for synthesis.
            format!("{}\n{}", SPEC_JSON, VALID),
        ));
        let stats = render_block(&PerformanceMetrics {
            return_pct: Some(20.0),
            trade_count: Some(8),
            ..Default::default()
        });
        let sandbox = Arc::new(ScriptedSandbox::new(vec![]).with_fallback(ScriptedSandbox::exited_ok(stats)));
        let store = Arc::new(InMemoryResultStore::new());
        let orchestrator = Arc::new(PipelineOrchestrator::new(
            PipelineServices {
                llm,
                sandbox,
                market_data: None,
                store: store.clone(),
            },
            PipelineConfig::default(),
            Metrics::new().unwrap(),
        ));
        let runner = PipelineRunner::new(orchestrator, 2);

        let requests = (0..5)
            .map(|i| RunRequest::new(StrategyIdea::new(format!("gap fill idea {}", i), IdeaOrigin::Text)))
            .collect();
        let results = runner.run_all(requests, CancelSignal::never()).await;

        let runs: Vec<PipelineRun> = results.into_iter().map(|r| r.unwrap()).collect();
        assert!(runs.iter().all(|r| r.status() == RunStatus::Success));
        let ids: HashSet<String> = runs.iter().map(|r| r.id().to_string()).collect();
        assert_eq!(ids.len(), 5);
        assert_eq!(store.list_runs(&RunFilter::default()).await.unwrap().len(), 5);
    }
}
