//! Historical OHLCV providers
//!
//! Every provider serves the bars inside the requested window, measured back
//! from the newest bar it holds so the answer never depends on the wall clock.
//! `LimitEnforcingProvider` applies the per-granularity history limits in front
//! of any of them.

pub mod csv_directory;
pub mod in_memory;
pub mod limits;

pub use csv_directory::CsvDirectoryProvider;
pub use in_memory::InMemoryMarketData;
pub use limits::LimitEnforcingProvider;

use crate::domain::market::candle::OhlcvSeries;
use crate::domain::market::timeframe::HistoryWindow;
use chrono::{DateTime, Datelike, NaiveDate};

const MILLIS_PER_DAY: i64 = 86_400_000;

/// Drops bars older than the window, anchored at the newest bar
pub fn trim_to_window(series: &mut OhlcvSeries, window: HistoryWindow) {
    let Some(newest) = series.candles.iter().map(|c| c.timestamp).max() else {
        return;
    };
    let cutoff = match window {
        HistoryWindow::Max => return,
        HistoryWindow::Days(days) => newest.saturating_sub(i64::from(days).saturating_mul(MILLIS_PER_DAY)),
        HistoryWindow::YearToDate => match start_of_year(newest) {
            Some(cutoff) => cutoff,
            None => return,
        },
    };
    series.candles.retain(|c| c.timestamp >= cutoff);
}

fn start_of_year(timestamp_ms: i64) -> Option<i64> {
    let year = DateTime::from_timestamp_millis(timestamp_ms)?.year();
    let start = NaiveDate::from_ymd_opt(year, 1, 1)?.and_hms_opt(0, 0, 0)?;
    Some(start.and_utc().timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market::candle::Candle;
    use crate::domain::market::timeframe::Timeframe;
    use rust_decimal_macros::dec;

    fn daily(days: i64) -> OhlcvSeries {
        // 2024-01-01T00:00:00Z
        let start = 1_704_067_200_000;
        let candles = (0..days)
            .map(|i| Candle {
                timestamp: start + i * MILLIS_PER_DAY,
                open: dec!(10),
                high: dec!(11),
                low: dec!(9),
                close: dec!(10.5),
                volume: dec!(100),
            })
            .collect();
        OhlcvSeries::new("SPY", Timeframe::OneDay, candles)
    }

    #[test]
    fn test_days_window_is_anchored_at_newest_bar() {
        let mut series = daily(100);
        trim_to_window(&mut series, HistoryWindow::Days(10));
        assert_eq!(series.len(), 11);
        assert_eq!(series.candles.last().map(|c| c.timestamp), daily(100).candles.last().map(|c| c.timestamp));
    }

    #[test]
    fn test_max_window_keeps_everything() {
        let mut series = daily(40);
        trim_to_window(&mut series, HistoryWindow::Max);
        assert_eq!(series.len(), 40);
    }

    #[test]
    fn test_year_to_date_window() {
        // 400 daily bars starting 2024-01-01 end in early February 2025
        let mut series = daily(400);
        trim_to_window(&mut series, HistoryWindow::YearToDate);
        assert_eq!(series.len(), 400 - 366);
    }
}
