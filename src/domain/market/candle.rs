use crate::domain::market::timeframe::Timeframe;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Candle {
    /// Bar open time, Unix milliseconds
    pub timestamp: i64,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
}

/// OHLCV table returned by the market data provider
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OhlcvSeries {
    pub ticker: String,
    pub timeframe: Timeframe,
    pub candles: Vec<Candle>,
}

impl OhlcvSeries {
    pub fn new(ticker: impl Into<String>, timeframe: Timeframe, candles: Vec<Candle>) -> Self {
        Self {
            ticker: ticker.into(),
            timeframe,
            candles,
        }
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }
}
