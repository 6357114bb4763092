use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Candle granularity accepted by the market data provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    OneMin,
    TwoMin,
    FiveMin,
    FifteenMin,
    ThirtyMin,
    OneHour,
    NinetyMin,
    FourHour,
    OneDay,
    OneWeek,
    OneMonth,
}

impl Timeframe {
    /// Interval string understood by the provider and by generated sources
    pub fn as_interval(&self) -> &'static str {
        match self {
            Timeframe::OneMin => "1m",
            Timeframe::TwoMin => "2m",
            Timeframe::FiveMin => "5m",
            Timeframe::FifteenMin => "15m",
            Timeframe::ThirtyMin => "30m",
            Timeframe::OneHour => "1h",
            Timeframe::NinetyMin => "90m",
            Timeframe::FourHour => "4h",
            Timeframe::OneDay => "1d",
            Timeframe::OneWeek => "1wk",
            Timeframe::OneMonth => "1mo",
        }
    }

    /// Maximum lookback in days documented by the provider.
    ///
    /// `None` means the provider serves the full history for this granularity.
    /// The static validator's data-window rule reads this table directly, so
    /// any change here changes what generated code is allowed to request.
    pub fn max_lookback_days(&self) -> Option<u32> {
        match self {
            Timeframe::OneMin => Some(7),
            Timeframe::TwoMin
            | Timeframe::FiveMin
            | Timeframe::FifteenMin
            | Timeframe::ThirtyMin => Some(60),
            Timeframe::OneHour | Timeframe::NinetyMin | Timeframe::FourHour => Some(730),
            Timeframe::OneDay | Timeframe::OneWeek | Timeframe::OneMonth => None,
        }
    }

    /// Returns all available timeframes in ascending order
    pub fn all() -> Vec<Timeframe> {
        vec![
            Timeframe::OneMin,
            Timeframe::TwoMin,
            Timeframe::FiveMin,
            Timeframe::FifteenMin,
            Timeframe::ThirtyMin,
            Timeframe::OneHour,
            Timeframe::NinetyMin,
            Timeframe::FourHour,
            Timeframe::OneDay,
            Timeframe::OneWeek,
            Timeframe::OneMonth,
        ]
    }
}

impl FromStr for Timeframe {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "1m" | "1min" | "onemin" => Ok(Timeframe::OneMin),
            "2m" | "2min" => Ok(Timeframe::TwoMin),
            "5m" | "5min" | "fivemin" => Ok(Timeframe::FiveMin),
            "15m" | "15min" | "fifteenmin" => Ok(Timeframe::FifteenMin),
            "30m" | "30min" => Ok(Timeframe::ThirtyMin),
            "1h" | "60m" | "1hour" | "onehour" => Ok(Timeframe::OneHour),
            "90m" => Ok(Timeframe::NinetyMin),
            "4h" | "4hour" | "fourhour" => Ok(Timeframe::FourHour),
            "1d" | "1day" | "oneday" | "daily" => Ok(Timeframe::OneDay),
            "1wk" | "1w" | "weekly" => Ok(Timeframe::OneWeek),
            "1mo" | "monthly" => Ok(Timeframe::OneMonth),
            _ => {
                let valid: Vec<&str> = Timeframe::all().iter().map(Timeframe::as_interval).collect();
                Err(anyhow!("Invalid timeframe: '{}'. Valid options: {}", s, valid.join(", ")))
            }
        }
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_interval())
    }
}

/// Amount of history a request asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum HistoryWindow {
    Days(u32),
    YearToDate,
    Max,
}

impl HistoryWindow {
    /// Upper bound of the window in days; `None` for the full history.
    ///
    /// Year-to-date is bounded by 366 so the answer never depends on today's date.
    pub fn upper_bound_days(&self) -> Option<u32> {
        match self {
            HistoryWindow::Days(days) => Some(*days),
            HistoryWindow::YearToDate => Some(366),
            HistoryWindow::Max => None,
        }
    }

    pub fn between(start: NaiveDate, end: NaiveDate) -> Self {
        let days = (end - start).num_days().max(0);
        HistoryWindow::Days(u32::try_from(days).unwrap_or(u32::MAX))
    }
}

impl Default for HistoryWindow {
    fn default() -> Self {
        HistoryWindow::Days(365)
    }
}

impl FromStr for HistoryWindow {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.trim().to_lowercase();
        match raw.as_str() {
            "max" => return Ok(HistoryWindow::Max),
            "ytd" => return Ok(HistoryWindow::YearToDate),
            _ => {}
        }

        let split = raw
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| anyhow!("History window '{}' is missing a unit", s))?;
        let (amount, unit) = raw.split_at(split);
        let amount: u32 = amount
            .parse()
            .map_err(|_| anyhow!("History window '{}' has no numeric amount", s))?;
        let days_per_unit = match unit {
            "d" | "day" | "days" => 1,
            "wk" | "w" | "week" | "weeks" => 7,
            "mo" | "month" | "months" => 30,
            "y" | "yr" | "year" | "years" => 365,
            _ => return Err(anyhow!("History window '{}' has unknown unit '{}'", s, unit)),
        };
        Ok(HistoryWindow::Days(amount.saturating_mul(days_per_unit)))
    }
}

impl fmt::Display for HistoryWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HistoryWindow::Days(days) => write!(f, "{}d", days),
            HistoryWindow::YearToDate => write!(f, "ytd"),
            HistoryWindow::Max => write!(f, "max"),
        }
    }
}

impl From<HistoryWindow> for String {
    fn from(window: HistoryWindow) -> Self {
        window.to_string()
    }
}

impl TryFrom<String> for HistoryWindow {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

/// Outcome of checking a (timeframe, window) request against the limit table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowCheck {
    Within,
    /// Inside the limit but within 10% of it; providers often trim the oldest bars
    NearLimit { requested_days: u32, max_days: u32 },
    /// Guaranteed to fail; `requested_days` is `None` for a full-history request
    Exceeds {
        requested_days: Option<u32>,
        max_days: u32,
    },
}

pub fn check_window(timeframe: Timeframe, window: HistoryWindow) -> WindowCheck {
    let Some(max_days) = timeframe.max_lookback_days() else {
        return WindowCheck::Within;
    };

    match window.upper_bound_days() {
        None => WindowCheck::Exceeds {
            requested_days: None,
            max_days,
        },
        Some(requested) if requested > max_days => WindowCheck::Exceeds {
            requested_days: Some(requested),
            max_days,
        },
        Some(requested) if u64::from(requested) * 10 > u64::from(max_days) * 9 => {
            WindowCheck::NearLimit {
                requested_days: requested,
                max_days,
            }
        }
        Some(_) => WindowCheck::Within,
    }
}
