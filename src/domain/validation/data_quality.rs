use crate::domain::market::candle::{Candle, OhlcvSeries};
use rust_decimal::Decimal;
use tracing::warn;

/// Validator for provider-supplied OHLCV data.
///
/// Rejects bars that are physically impossible before they are handed to a sandboxed run.
pub struct StrictCandleValidator;

impl StrictCandleValidator {
    /// Validates a Candle.
    pub fn validate_candle(ticker: &str, candle: &Candle) -> bool {
        if candle.open <= Decimal::ZERO
            || candle.high <= Decimal::ZERO
            || candle.low <= Decimal::ZERO
            || candle.close <= Decimal::ZERO
        {
            warn!(
                "Validation FAILED: Candle for {} at {} has non-positive price component(s)",
                ticker, candle.timestamp
            );
            return false;
        }

        if candle.low > candle.high {
            warn!(
                "Validation FAILED: Candle for {} has low {} > high {}",
                ticker, candle.low, candle.high
            );
            return false;
        }

        if candle.volume < Decimal::ZERO {
            warn!(
                "Validation FAILED: Candle for {} has negative volume: {}",
                ticker, candle.volume
            );
            return false;
        }

        true
    }

    /// Drops invalid and out-of-order bars, returning how many were removed.
    pub fn sanitize_series(series: &mut OhlcvSeries) -> usize {
        let before = series.candles.len();
        let ticker = series.ticker.clone();
        let mut last_timestamp = i64::MIN;
        series.candles.retain(|candle| {
            if candle.timestamp <= last_timestamp {
                warn!(
                    "Validation FAILED: Candle for {} at {} is not after {}",
                    ticker, candle.timestamp, last_timestamp
                );
                return false;
            }
            if !Self::validate_candle(&ticker, candle) {
                return false;
            }
            last_timestamp = candle.timestamp;
            true
        });
        before - series.candles.len()
    }
}
