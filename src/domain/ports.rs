use crate::domain::cancellation::CancelSignal;
use crate::domain::errors::{DataUnavailableError, LlmServiceError, SandboxError};
use crate::domain::execution::{ExecutionRequest, ExecutionResult};
use crate::domain::market::candle::OhlcvSeries;
use crate::domain::market::timeframe::{HistoryWindow, Timeframe};
use async_trait::async_trait;

/// Historical OHLCV source with per-granularity history limits
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_series(
        &self,
        ticker: &str,
        timeframe: Timeframe,
        window: HistoryWindow,
    ) -> Result<OhlcvSeries, DataUnavailableError>;
}

/// Text completion service used for research and code synthesis
#[async_trait]
pub trait LanguageModelService: Send + Sync {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmServiceError>;
}

/// Isolated, time-bounded runner for candidate artifacts.
///
/// A failing candidate is reported inside the `ExecutionResult`; `SandboxError`
/// is reserved for failures of the environment itself and for cancellation.
#[async_trait]
pub trait SandboxEnvironment: Send + Sync {
    async fn run(&self, request: ExecutionRequest, cancel: &CancelSignal) -> Result<ExecutionResult, SandboxError>;
}
