//! Result store implementations
//!
//! All three persist the same strict JSON body; the run is sanitized again
//! on the way in so a non-finite number can never be written.

pub mod database;
pub mod in_memory;
pub mod json_file;
pub mod sqlite;

pub use database::Database;
pub use in_memory::InMemoryResultStore;
pub use json_file::JsonFileResultStore;
pub use sqlite::SqliteResultStore;

use crate::domain::performance::Sanitize;
use crate::domain::pipeline::PipelineRun;
use anyhow::{Context, Result};

/// Sanitized copy of `run` as strict JSON
pub(crate) fn encode_run(run: &PipelineRun) -> Result<String> {
    let mut clean = run.clone();
    clean.sanitize();
    serde_json::to_string_pretty(&clean).with_context(|| format!("Failed to serialize run {}", run.id()))
}

pub(crate) fn decode_run(body: &str) -> Result<PipelineRun> {
    serde_json::from_str(body).context("Failed to parse stored run JSON")
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::domain::market::timeframe::{HistoryWindow, Timeframe};
    use crate::domain::optimization::OptimizationAttempt;
    use crate::domain::performance::PerformanceMetrics;
    use crate::domain::pipeline::{PipelineRun, RunOutcome, RunStatus, Termination};
    use crate::domain::strategy::{IdeaOrigin, StrategyIdea, StrategySpec, TradeDirection};
    use rust_decimal_macros::dec;

    pub fn spec(ticker: &str) -> StrategySpec {
        StrategySpec {
            name: "Gap fade".to_string(),
            strategy_type: "gap-fade".to_string(),
            entry_rules: vec!["Open gaps up more than 2%".to_string()],
            exit_rules: vec!["Gap fills".to_string()],
            ticker: ticker.to_string(),
            timeframe: Timeframe::OneDay,
            history_window: HistoryWindow::Days(365),
            direction: TradeDirection::Short,
            initial_capital: dec!(25000),
            target_return_pct: 8.0,
            parameters: StrategySpec::default_parameters(),
        }
    }

    /// A successful run whose best attempt carries a NaN Sharpe and zero trades
    pub fn finished_run(ticker: &str, status: RunStatus) -> PipelineRun {
        let mut run = PipelineRun::new(StrategyIdea::new("fade opening gaps", IdeaOrigin::Note));
        run.attach_spec(spec(ticker)).unwrap();
        let metrics = PerformanceMetrics {
            return_pct: Some(0.0),
            sharpe: Some(f64::NAN),
            trade_count: Some(0),
            ..Default::default()
        };
        let attempt = OptimizationAttempt {
            iteration: 1,
            artifact_version: 1,
            parameters: StrategySpec::default_parameters(),
            metrics,
            reward: None,
        };
        run.record_optimization(attempt.clone()).unwrap();
        let outcome = (status == RunStatus::Success)
            .then(|| RunOutcome::from_best(&attempt, 8.0, Termination::IterationsExhausted));
        run.finish(status, outcome, None).unwrap();
        run
    }
}
