use crate::domain::errors::DataUnavailableError;
use crate::domain::market::candle::OhlcvSeries;
use crate::domain::market::timeframe::{HistoryWindow, Timeframe};
use crate::domain::ports::MarketDataProvider;
use crate::infrastructure::market_data::trim_to_window;
use async_trait::async_trait;
use std::collections::HashMap;

/// Fixed series keyed by ticker and timeframe
#[derive(Debug, Clone, Default)]
pub struct InMemoryMarketData {
    series: HashMap<(String, Timeframe), OhlcvSeries>,
}

impl InMemoryMarketData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, series: OhlcvSeries) -> Self {
        self.series
            .insert((series.ticker.to_uppercase(), series.timeframe), series);
        self
    }
}

#[async_trait]
impl MarketDataProvider for InMemoryMarketData {
    async fn get_series(
        &self,
        ticker: &str,
        timeframe: Timeframe,
        window: HistoryWindow,
    ) -> Result<OhlcvSeries, DataUnavailableError> {
        let mut series = self
            .series
            .get(&(ticker.trim().to_uppercase(), timeframe))
            .cloned()
            .ok_or_else(|| DataUnavailableError::Unavailable {
                ticker: ticker.to_string(),
                reason: format!("no {} series loaded", timeframe),
            })?;
        trim_to_window(&mut series, window);
        Ok(series)
    }
}
