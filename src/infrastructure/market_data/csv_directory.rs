use crate::domain::errors::DataUnavailableError;
use crate::domain::market::candle::{Candle, OhlcvSeries};
use crate::domain::market::timeframe::{HistoryWindow, Timeframe};
use crate::domain::ports::MarketDataProvider;
use crate::infrastructure::market_data::trim_to_window;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Reads `<dir>/<TICKER>_<interval>.csv` files with a
/// `timestamp,open,high,low,close,volume` header, timestamps in Unix milliseconds.
pub struct CsvDirectoryProvider {
    root: PathBuf,
}

impl CsvDirectoryProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn file_for(&self, ticker: &str, timeframe: Timeframe) -> PathBuf {
        self.root
            .join(format!("{}_{}.csv", ticker.trim().to_uppercase(), timeframe.as_interval()))
    }
}

fn parse_candles(path: &Path, ticker: &str, bytes: &[u8]) -> Result<Vec<Candle>, DataUnavailableError> {
    let mut reader = csv::Reader::from_reader(bytes);
    let mut candles = Vec::new();
    for (row, record) in reader.deserialize::<Candle>().enumerate() {
        let candle = record.map_err(|e| DataUnavailableError::Unavailable {
            ticker: ticker.to_string(),
            reason: format!("{} row {}: {}", path.display(), row + 1, e),
        })?;
        candles.push(candle);
    }
    Ok(candles)
}

#[async_trait]
impl MarketDataProvider for CsvDirectoryProvider {
    async fn get_series(
        &self,
        ticker: &str,
        timeframe: Timeframe,
        window: HistoryWindow,
    ) -> Result<OhlcvSeries, DataUnavailableError> {
        let path = self.file_for(ticker, timeframe);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| DataUnavailableError::Unavailable {
                ticker: ticker.to_string(),
                reason: format!("{}: {}", path.display(), e),
            })?;

        let candles = parse_candles(&path, ticker, &bytes)?;
        let mut series = OhlcvSeries::new(ticker.trim().to_uppercase(), timeframe, candles);
        series.candles.sort_by_key(|c| c.timestamp);
        trim_to_window(&mut series, window);
        debug!(
            "CsvDirectoryProvider: {} {} bars for {} from {}",
            series.len(),
            timeframe,
            series.ticker,
            path.display()
        );
        Ok(series)
    }
}
