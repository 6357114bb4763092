#![allow(dead_code)]

use rust_decimal_macros::dec;
use std::sync::Arc;
use stratforge::application::metrics_parser::render_block;
use stratforge::application::pipeline::{PipelineConfig, PipelineOrchestrator, PipelineServices, RunRequest};
use stratforge::domain::market::candle::{Candle, OhlcvSeries};
use stratforge::domain::market::timeframe::Timeframe;
use stratforge::domain::performance::PerformanceMetrics;
use stratforge::domain::ports::{LanguageModelService, MarketDataProvider, SandboxEnvironment};
use stratforge::domain::repositories::ResultStore;
use stratforge::domain::strategy::{IdeaOrigin, StrategyIdea};
use stratforge::infrastructure::observability::Metrics;

pub const SPEC_JSON: &str = r#"{"name": "Dip buyer", "ticker": "spy", "timeframe": "1d",
    "history_window": "1y", "entry_rules": ["RSI below 30"], "exit_rules": ["RSI above 55"]}"#;

/// Passes every static rule
pub const VALID: &str = "```python
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

/// Long trade with the stop above the entry
pub const INVERTED_STOP: &str = "```python
position_size = 0.4
entry_price = 100
stop_loss = 101
take_profit = 105

for bar in bars:
    if bar.signal > 0:
        buy(size=position_size, sl=stop_loss, tp=take_profit)
    elif bar.signal < 0:
        position.close()
```";

pub fn stats(return_pct: f64, sharpe: f64, win_rate: f64) -> String {
    render_block(&PerformanceMetrics {
        return_pct: Some(return_pct),
        sharpe: Some(sharpe),
        win_rate: Some(win_rate),
        max_drawdown: Some(-5.0),
        trade_count: Some(25),
        profit_factor: Some(1.3),
        ..Default::default()
    })
}

pub fn request(target_return_pct: f64) -> RunRequest {
    RunRequest::new(StrategyIdea::new(
        "Buy SPY when the daily RSI dips below 30 and sell when it recovers above 55",
        IdeaOrigin::Text,
    ))
    .with_target(target_return_pct)
}

pub fn daily_series(ticker: &str, bars: i64) -> OhlcvSeries {
    let candles = (0..bars)
        .map(|i| Candle {
            timestamp: 1_704_067_200_000 + i * 86_400_000,
            open: dec!(470),
            high: dec!(474.5),
            low: dec!(468),
            close: dec!(472.25),
            volume: dec!(80000000),
        })
        .collect();
    OhlcvSeries::new(ticker, Timeframe::OneDay, candles)
}

pub fn orchestrator(
    llm: Arc<dyn LanguageModelService>,
    sandbox: Arc<dyn SandboxEnvironment>,
    market_data: Option<Arc<dyn MarketDataProvider>>,
    store: Arc<dyn ResultStore>,
    config: PipelineConfig,
) -> PipelineOrchestrator {
    PipelineOrchestrator::new(
        PipelineServices {
            llm,
            sandbox,
            market_data,
            store,
        },
        config,
        Metrics::new().unwrap(),
    )
}
