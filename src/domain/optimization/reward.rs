use crate::domain::performance::PerformanceMetrics;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Weights of the scalar reward used to rank optimization attempts.
///
/// Return and win rate are percentages and are scaled to fractions before
/// weighting so the three components share a similar magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardWeights {
    pub return_weight: f64,
    pub sharpe_weight: f64,
    pub win_rate_weight: f64,
}

impl Default for RewardWeights {
    fn default() -> Self {
        Self {
            return_weight: 0.5,
            sharpe_weight: 0.3,
            win_rate_weight: 0.2,
        }
    }
}

impl RewardWeights {
    /// `None` when the run reported no usable return; missing Sharpe or win
    /// rate contribute nothing.
    pub fn reward(&self, metrics: &PerformanceMetrics) -> Option<f64> {
        let return_pct = metrics.return_pct.filter(|v| v.is_finite())?;
        let sharpe = metrics.sharpe.filter(|v| v.is_finite()).unwrap_or(0.0);
        let win_rate = metrics.win_rate.filter(|v| v.is_finite()).unwrap_or(0.0);

        let score = (return_pct / 100.0) * self.return_weight
            + sharpe * self.sharpe_weight
            + (win_rate / 100.0) * self.win_rate_weight;

        score.is_finite().then_some(score)
    }
}

/// Orders nullable values with null below any number
pub fn cmp_nullable(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}
