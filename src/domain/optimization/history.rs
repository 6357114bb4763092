use crate::domain::errors::HistoryOrderError;
use crate::domain::optimization::reward::cmp_nullable;
use crate::domain::performance::{PerformanceMetrics, Sanitize};
use crate::domain::strategy::ParameterSet;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One evaluated parameter set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationAttempt {
    pub iteration: u32,
    pub artifact_version: u32,
    pub parameters: ParameterSet,
    pub metrics: PerformanceMetrics,
    pub reward: Option<f64>,
}

impl OptimizationAttempt {
    /// Ranks by reward, then Sharpe, then return; nulls rank lowest
    pub fn rank_cmp(&self, other: &OptimizationAttempt) -> Ordering {
        cmp_nullable(self.reward, other.reward)
            .then_with(|| cmp_nullable(self.metrics.sharpe, other.metrics.sharpe))
            .then_with(|| cmp_nullable(self.metrics.return_pct, other.metrics.return_pct))
    }
}

impl Sanitize for OptimizationAttempt {
    fn sanitize(&mut self) {
        self.parameters.sanitize();
        self.metrics.sanitize();
        self.reward = self.reward.filter(|r| r.is_finite());
    }
}

/// Append-only attempt log with a running best pointer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OptimizationHistory {
    attempts: Vec<OptimizationAttempt>,
    best_index: Option<usize>,
}

impl OptimizationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an attempt and returns whether it became the new best.
    ///
    /// The best pointer only moves on a strictly better attempt, so among
    /// equally ranked attempts the earliest one is kept.
    pub fn record(&mut self, attempt: OptimizationAttempt) -> Result<bool, HistoryOrderError> {
        if let Some(last) = self.attempts.last()
            && attempt.iteration <= last.iteration
        {
            return Err(HistoryOrderError {
                iteration: attempt.iteration,
                last: last.iteration,
            });
        }

        let improves = match self.best() {
            None => true,
            Some(best) => attempt.rank_cmp(best) == Ordering::Greater,
        };

        self.attempts.push(attempt);
        if improves {
            self.best_index = Some(self.attempts.len() - 1);
        }
        Ok(improves)
    }

    pub fn best(&self) -> Option<&OptimizationAttempt> {
        self.best_index.and_then(|i| self.attempts.get(i))
    }

    pub fn latest(&self) -> Option<&OptimizationAttempt> {
        self.attempts.last()
    }

    pub fn attempts(&self) -> &[OptimizationAttempt] {
        &self.attempts
    }

    pub fn len(&self) -> usize {
        self.attempts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attempts.is_empty()
    }

    pub fn next_iteration(&self) -> u32 {
        self.attempts.last().map_or(1, |a| a.iteration + 1)
    }
}

impl Sanitize for OptimizationHistory {
    fn sanitize(&mut self) {
        self.attempts.sanitize();
    }
}
