use crate::domain::errors::DataUnavailableError;
use crate::domain::market::candle::OhlcvSeries;
use crate::domain::market::timeframe::{HistoryWindow, Timeframe, WindowCheck, check_window};
use crate::domain::ports::MarketDataProvider;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// Refuses requests the upstream provider is guaranteed to reject.
///
/// Shares the limit table with the static validator, so a spec that passed
/// validation is never refused here.
pub struct LimitEnforcingProvider {
    inner: Arc<dyn MarketDataProvider>,
}

impl LimitEnforcingProvider {
    pub fn new(inner: Arc<dyn MarketDataProvider>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl MarketDataProvider for LimitEnforcingProvider {
    async fn get_series(
        &self,
        ticker: &str,
        timeframe: Timeframe,
        window: HistoryWindow,
    ) -> Result<OhlcvSeries, DataUnavailableError> {
        match check_window(timeframe, window) {
            WindowCheck::Exceeds {
                requested_days,
                max_days,
            } => {
                return Err(DataUnavailableError::WindowExceedsLimit {
                    timeframe,
                    requested_days,
                    max_days,
                });
            }
            WindowCheck::NearLimit {
                requested_days,
                max_days,
            } => warn!(
                "LimitEnforcingProvider: {} {} requests {} of {} available days; oldest bars may be missing",
                ticker, timeframe, requested_days, max_days
            ),
            WindowCheck::Within => {}
        }
        self.inner.get_series(ticker, timeframe, window).await
    }
}
