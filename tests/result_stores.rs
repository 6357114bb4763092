mod common;

use common::*;
use std::sync::Arc;
use stratforge::application::pipeline::PipelineConfig;
use stratforge::domain::cancellation::CancelSignal;
use stratforge::domain::pipeline::{PipelineRun, RunFilter, RunId, RunStatus};
use stratforge::domain::repositories::ResultStore;
use stratforge::infrastructure::mock::{ScriptedLanguageModel, ScriptedSandbox};
use stratforge::infrastructure::persistence::{Database, InMemoryResultStore, JsonFileResultStore, SqliteResultStore};

/// A finished run whose only attempt reported zero trades
async fn zero_trade_run() -> PipelineRun {
    let zero_trades = "=== PERFORMANCE ===\nreturn_pct: 0.0\nsharpe: nan\nwin_rate: nan\nmax_drawdown: 0.0\ntrade_count: 0\nprofit_factor: nan\n=== END PERFORMANCE ===\n";
    let llm = Arc::new(ScriptedLanguageModel::new([SPEC_JSON]).with_fallback(VALID));
    let sandbox = Arc::new(ScriptedSandbox::new(vec![]).with_fallback(ScriptedSandbox::exited_ok(zero_trades)));
    let config = PipelineConfig {
        optimization: stratforge::application::optimization::OptimizationConfig {
            max_iterations: 2,
            ..Default::default()
        },
        ..Default::default()
    };
    orchestrator(llm, sandbox, None, Arc::new(InMemoryResultStore::new()), config)
        .execute(request(10.0), CancelSignal::never())
        .await
        .unwrap()
}

async fn exercise(store: &dyn ResultStore) {
    let run = zero_trade_run().await;
    assert_eq!(run.status(), RunStatus::Success);

    store.save(&run).await.unwrap();
    store.save(&run).await.unwrap();

    let loaded = store.get_run(run.id()).await.unwrap().unwrap();
    assert_eq!(loaded.id(), run.id());
    assert_eq!(loaded.status(), run.status());
    assert_eq!(loaded.attempts().len(), run.attempts().len());
    assert_eq!(loaded.optimization().len(), run.optimization().len());
    assert_eq!(loaded.created_at(), run.created_at());
    let best = loaded.outcome().unwrap();
    assert_eq!(best.metrics.trade_count, Some(0));
    assert_eq!(best.metrics.sharpe, None);
    assert_eq!(best.reward, None);

    let json = serde_json::to_string(&loaded).unwrap();
    assert!(json.contains("\"sharpe\":null"));
    assert!(!json.contains("NaN"));

    let listed = store.list_runs(&RunFilter::default()).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, *run.id());
    assert!(store.get_run(&RunId::from("SPY-unknown")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_in_memory_store() {
    exercise(&InMemoryResultStore::new()).await;
}

#[tokio::test]
async fn test_json_file_store() {
    let dir = tempfile::tempdir().unwrap();
    exercise(&JsonFileResultStore::new(dir.path()).await.unwrap()).await;
}

#[tokio::test]
async fn test_sqlite_store() {
    let db = Database::in_memory().await.unwrap();
    exercise(&SqliteResultStore::new(db.pool.clone())).await;
}

#[test]
fn test_json_store_creates_nested_directory() {
    let dir = tempfile::tempdir().unwrap();
    let nested = dir.path().join("a/b/results");
    let store = tokio_test::block_on(JsonFileResultStore::new(&nested)).unwrap();
    assert!(store.dir().is_dir());
    assert!(tokio_test::block_on(store.list_runs(&RunFilter::default())).unwrap().is_empty());
}
