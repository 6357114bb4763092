use super::{ValidationRule, sort_by_line};
use crate::application::validation::source::SourceModel;
use crate::domain::market::timeframe::{HistoryWindow, Timeframe, WindowCheck, check_window};
use crate::domain::validation::{FindingCategory, ValidationFinding};
use chrono::NaiveDate;
use regex::Regex;
use std::str::FromStr;
use std::sync::LazyLock;

static INTERVAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\b(?:interval|timeframe)\s*=\s*["']([^"']+)["']"#).expect("interval pattern is valid")
});
static PERIOD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bperiod\s*=\s*["']([^"']+)["']"#).expect("period pattern is valid"));
static START: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\bstart\s*=\s*["'](\d{4}-\d{2}-\d{2})["']"#).expect("start pattern is valid")
});
static END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bend\s*=\s*["'](\d{4}-\d{2}-\d{2})["']"#).expect("end pattern is valid"));

/// Checks a (timeframe, window) request against the provider's history limits.
///
/// Returns `None` when the request is safely inside the limit.
pub fn check_request(timeframe: Timeframe, window: HistoryWindow, line: Option<usize>) -> Option<ValidationFinding> {
    match check_window(timeframe, window) {
        WindowCheck::Within => None,
        WindowCheck::NearLimit {
            requested_days,
            max_days,
        } => Some(ValidationFinding::warning(
            FindingCategory::DataWindow,
            format!(
                "{} data requested for {} days is within 10% of the {}-day provider limit; the oldest bars may be missing",
                timeframe, requested_days, max_days
            ),
            line,
        )),
        WindowCheck::Exceeds {
            requested_days,
            max_days,
        } => Some(ValidationFinding::error(
            FindingCategory::DataWindow,
            format!(
                "{} data is limited to {} days by the provider, but {} was requested",
                timeframe,
                max_days,
                requested_days.map_or_else(|| "the full history".to_string(), |d| format!("{} days", d))
            ),
            line,
        )),
    }
}

/// Requested history must fit the provider's per-granularity limits
pub struct DataWindowRule;

impl DataWindowRule {
    fn requested_window(text: &str, line: usize) -> Result<Option<HistoryWindow>, ValidationFinding> {
        if let Some(caps) = PERIOD.captures(text) {
            return HistoryWindow::from_str(&caps[1]).map(Some).map_err(|_| {
                ValidationFinding::warning(
                    FindingCategory::DataWindow,
                    format!("history period '{}' is not recognized", &caps[1]),
                    Some(line),
                )
            });
        }

        let start = START
            .captures(text)
            .and_then(|c| NaiveDate::parse_from_str(&c[1], "%Y-%m-%d").ok());
        let end = END
            .captures(text)
            .and_then(|c| NaiveDate::parse_from_str(&c[1], "%Y-%m-%d").ok());
        match (start, end) {
            (Some(start), Some(end)) => Ok(Some(HistoryWindow::between(start, end))),
            // Open-ended ranges depend on today's date and are left to the provider
            _ => Ok(None),
        }
    }
}

impl ValidationRule for DataWindowRule {
    fn name(&self) -> &str {
        "data-window"
    }

    fn priority(&self) -> u8 {
        30
    }

    fn check(&self, source: &SourceModel) -> Vec<ValidationFinding> {
        let mut findings = Vec::new();

        for line in source.lines() {
            let Some(caps) = INTERVAL.captures(&line.text) else {
                continue;
            };
            let interval = &caps[1];
            let Ok(timeframe) = Timeframe::from_str(interval) else {
                findings.push(ValidationFinding::warning(
                    FindingCategory::DataWindow,
                    format!("interval '{}' is not a known provider granularity", interval),
                    Some(line.number),
                ));
                continue;
            };

            match Self::requested_window(&line.text, line.number) {
                Ok(Some(window)) => findings.extend(check_request(timeframe, window, Some(line.number))),
                Ok(None) => {}
                Err(finding) => findings.push(finding),
            }
        }

        sort_by_line(&mut findings);
        findings
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::validation::Severity;

    fn check(source: &str) -> Vec<ValidationFinding> {
        DataWindowRule.check(&SourceModel::parse(source))
    }

    #[test]
    fn test_fine_granularity_multi_year_is_error() {
        let findings = check("df = yf.download('AAPL', period='3y', interval='5m')\n");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Error);
        assert!(findings[0].message.contains("60 days"));
    }

    #[test]
    fn test_daily_max_is_fine() {
        assert!(check("df = yf.download('AAPL', period='max', interval='1d')\n").is_empty());
        assert!(check("df = yf.download('AAPL', period='ytd', interval='1wk')\n").is_empty());
    }

    #[test]
    fn test_near_limit_is_warning() {
        let findings = check("df = yf.download(\n    'AAPL',\n    period='58d',\n    interval='15m',\n)\n");
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Warning);
        assert_eq!(findings[0].line, Some(1));
    }

    #[test]
    fn test_explicit_date_range() {
        let findings = check("df = yf.download('SPY', start='2020-01-01', end='2024-01-01', interval='1h')\n");
        assert_eq!(findings[0].severity, Severity::Error);
        assert!(check("df = yf.download('SPY', start='2024-01-01', end='2024-01-05', interval='1m')\n").is_empty());
    }

    #[test]
    fn test_unknown_interval_is_warning() {
        let findings = check("df = load(interval='7m', period='5d')\n");
        assert_eq!(findings[0].severity, Severity::Warning);
    }

    #[test]
    fn test_check_request_is_exposed_for_specs() {
        assert!(check_request(Timeframe::OneMin, HistoryWindow::Days(30), None).is_some_and(|f| f.is_error()));
        assert!(check_request(Timeframe::OneDay, HistoryWindow::Max, None).is_none());
    }
}
