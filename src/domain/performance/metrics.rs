use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Performance statistics reported by one executed artifact
///
/// Every field is optional: a statistic that is missing from the report, or
/// that is mathematically undefined (Sharpe of a zero-trade run), is `None`
/// and serializes as an explicit `null`. Zero is never used as a stand-in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub return_pct: Option<f64>,
    pub sharpe: Option<f64>,
    pub win_rate: Option<f64>,
    pub max_drawdown: Option<f64>,
    pub trade_count: Option<u64>,
    pub profit_factor: Option<f64>,
    /// Additional named statistics found in the report
    #[serde(default)]
    pub extra: BTreeMap<String, Option<f64>>,
}

impl PerformanceMetrics {
    /// All-null metrics, used when a report could not be parsed at all
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn is_unavailable(&self) -> bool {
        self.return_pct.is_none()
            && self.sharpe.is_none()
            && self.win_rate.is_none()
            && self.max_drawdown.is_none()
            && self.trade_count.is_none()
            && self.profit_factor.is_none()
    }

    /// A run with zero trades has no defined ratios, whatever the report printed
    pub fn apply_zero_trade_rule(&mut self) {
        if self.trade_count == Some(0) {
            self.return_pct = None;
            self.sharpe = None;
            self.win_rate = None;
            self.max_drawdown = None;
            self.profit_factor = None;
        }
    }

    pub fn meets_target(&self, target_return_pct: f64) -> bool {
        self.return_pct.is_some_and(|r| r >= target_return_pct)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_trade_run_serializes_explicit_nulls() {
        let mut metrics = PerformanceMetrics {
            return_pct: Some(0.0),
            sharpe: Some(f64::NAN),
            win_rate: Some(0.0),
            max_drawdown: Some(0.0),
            trade_count: Some(0),
            profit_factor: Some(f64::INFINITY),
            extra: BTreeMap::new(),
        };
        metrics.apply_zero_trade_rule();

        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "return_pct": null,
                "sharpe": null,
                "win_rate": null,
                "max_drawdown": null,
                "trade_count": 0,
                "profit_factor": null,
                "extra": {}
            })
        );

        let text = serde_json::to_string(&metrics).unwrap();
        let back: PerformanceMetrics = serde_json::from_str(&text).unwrap();
        assert_eq!(back, metrics);
    }

    #[test]
    fn test_meets_target_requires_defined_return() {
        let mut metrics = PerformanceMetrics::unavailable();
        assert!(!metrics.meets_target(0.0));
        metrics.return_pct = Some(12.0);
        assert!(metrics.meets_target(10.0));
        assert!(!metrics.meets_target(15.0));
    }
}
