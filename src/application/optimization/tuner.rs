use crate::application::optimization::search_space::SearchSpace;
use crate::domain::performance::PerformanceMetrics;
use crate::domain::strategy::ParameterSet;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    fn sign(self) -> f64 {
        match self {
            Direction::Up => 1.0,
            Direction::Down => -1.0,
        }
    }

    fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        }
    }
}

/// One coordinate move away from the current best parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterDelta {
    pub parameter: String,
    pub from: f64,
    pub to: f64,
    pub direction: Direction,
    pub multiplier: u32,
}

impl fmt::Display for ParameterDelta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} -> {} (x{})", self.parameter, self.from, self.to, self.multiplier)
    }
}

/// Deterministic coordinate search over a `SearchSpace`.
///
/// Each proposal changes exactly one parameter of the current best set by a
/// multiple of its step. Smaller multipliers are tried first; within one
/// multiplier the latest metrics decide which parameters move first and in
/// which direction. Signatures already evaluated are never proposed again.
pub struct CoordinateTuner {
    space: SearchSpace,
    multipliers: Vec<u32>,
    tried: HashSet<String>,
}

impl CoordinateTuner {
    pub fn new(space: SearchSpace) -> Self {
        Self::with_multipliers(space, vec![1, 2, 4])
    }

    pub fn with_multipliers(space: SearchSpace, multipliers: Vec<u32>) -> Self {
        Self {
            space,
            multipliers,
            tried: HashSet::new(),
        }
    }

    /// Marks a parameter set as evaluated
    pub fn mark_tried(&mut self, parameters: &ParameterSet) {
        self.tried.insert(parameters.signature());
    }

    pub fn tried_count(&self) -> usize {
        self.tried.len()
    }

    /// Next untried neighbour of `best`, or `None` when the space is exhausted
    pub fn propose(
        &mut self,
        best: &ParameterSet,
        latest: &PerformanceMetrics,
    ) -> Option<(ParameterSet, ParameterDelta)> {
        self.mark_tried(best);
        let moves = Self::ordered_moves(best, &self.space, latest);

        for &multiplier in &self.multipliers {
            for (name, first) in &moves {
                let (Some(range), Some(current)) = (self.space.range(name), best.get(name)) else {
                    continue;
                };
                for direction in [*first, first.opposite()] {
                    let raw = current + direction.sign() * range.step * f64::from(multiplier);
                    let candidate = round_to_grid(range.clamp(raw));
                    if (candidate - current).abs() < 1e-12 {
                        continue;
                    }
                    let proposal = best.clone().with(name.as_str(), candidate);
                    if self.tried.insert(proposal.signature()) {
                        let delta = ParameterDelta {
                            parameter: name.clone(),
                            from: current,
                            to: candidate,
                            direction,
                            multiplier,
                        };
                        debug!("CoordinateTuner: proposing {}", delta);
                        return Some((proposal, delta));
                    }
                }
            }
        }
        debug!(
            "CoordinateTuner: search space exhausted after {} signatures",
            self.tried.len()
        );
        None
    }

    /// Parameters hinted by the metrics come first, in hint order; the rest
    /// follow alphabetically and move up first.
    fn ordered_moves(
        best: &ParameterSet,
        space: &SearchSpace,
        latest: &PerformanceMetrics,
    ) -> Vec<(String, Direction)> {
        let mut moves: Vec<(String, Direction)> = Vec::new();
        for (name, direction) in metric_hints(latest) {
            if best.get(name).is_some()
                && space.range(name).is_some()
                && !moves.iter().any(|(n, _)| n == name)
            {
                moves.push((name.to_string(), direction));
            }
        }
        for name in best.names() {
            if space.range(name).is_some() && !moves.iter().any(|(n, _)| n == name) {
                moves.push((name.clone(), Direction::Up));
            }
        }
        moves
    }
}

fn metric_hints(metrics: &PerformanceMetrics) -> Vec<(&'static str, Direction)> {
    let mut hints = Vec::new();

    if metrics.trade_count.is_none_or(|count| count < 5) {
        // Too few trades to judge anything: loosen the entry
        hints.push(("entry_threshold", Direction::Down));
    }
    if metrics.max_drawdown.is_some_and(|dd| dd < -20.0) {
        hints.push(("stop_loss_pct", Direction::Down));
        hints.push(("position_size", Direction::Down));
    }
    if metrics.win_rate.is_some_and(|wr| wr < 40.0) {
        hints.push(("take_profit_pct", Direction::Down));
        hints.push(("entry_threshold", Direction::Up));
    }
    match metrics.return_pct {
        Some(ret) if ret < 0.0 => hints.push(("position_size", Direction::Down)),
        Some(_) => {
            hints.push(("take_profit_pct", Direction::Up));
            hints.push(("position_size", Direction::Up));
        }
        None => {}
    }
    hints
}

fn round_to_grid(value: f64) -> f64 {
    (value * 1e9).round() / 1e9
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::optimization::search_space::ParameterRange;

    fn metrics(return_pct: f64, win_rate: f64, trades: u64) -> PerformanceMetrics {
        PerformanceMetrics {
            return_pct: Some(return_pct),
            sharpe: Some(0.5),
            win_rate: Some(win_rate),
            max_drawdown: Some(-5.0),
            trade_count: Some(trades),
            ..Default::default()
        }
    }

    #[test]
    fn test_proposals_are_deterministic() {
        let best = ParameterSet::new().with("stop_loss_pct", 0.02).with("take_profit_pct", 0.04);
        let latest = metrics(3.0, 55.0, 20);

        let mut a = CoordinateTuner::new(SearchSpace::standard());
        let mut b = CoordinateTuner::new(SearchSpace::standard());
        for _ in 0..5 {
            assert_eq!(a.propose(&best, &latest), b.propose(&best, &latest));
        }
    }

    #[test]
    fn test_metric_guided_direction() {
        let best = ParameterSet::new().with("position_size", 0.5).with("stop_loss_pct", 0.02);
        let mut tuner = CoordinateTuner::new(SearchSpace::standard());

        let (params, delta) = tuner.propose(&best, &metrics(-4.0, 55.0, 20)).unwrap();
        assert_eq!(delta.parameter, "position_size");
        assert_eq!(delta.direction, Direction::Down);
        assert_eq!(params.get("position_size"), Some(0.4));
        assert_eq!(params.get("stop_loss_pct"), Some(0.02));
    }

    #[test]
    fn test_few_trades_loosens_entry() {
        let best = crate::domain::strategy::StrategySpec::default_parameters();
        let mut tuner = CoordinateTuner::new(SearchSpace::standard());
        let (_, delta) = tuner.propose(&best, &metrics(1.0, 50.0, 2)).unwrap();
        assert_eq!(delta.parameter, "entry_threshold");
        assert_eq!(delta.to, 0.75);
    }

    #[test]
    fn test_never_repeats_a_signature_and_exhausts() {
        let space = SearchSpace::new().with("x", ParameterRange::new(0.0, 0.2, 0.1));
        let best = ParameterSet::new().with("x", 0.1);
        let latest = PerformanceMetrics::unavailable();
        let mut tuner = CoordinateTuner::with_multipliers(space, vec![1]);

        let mut seen = Vec::new();
        while let Some((params, _)) = tuner.propose(&best, &latest) {
            seen.push(params.signature());
        }
        assert_eq!(seen, vec!["x=0.200000".to_string(), "x=0.000000".to_string()]);
        assert!(tuner.propose(&best, &latest).is_none());
    }

    #[test]
    fn test_clamped_move_at_bound_is_skipped() {
        let space = SearchSpace::new().with("x", ParameterRange::new(0.0, 1.0, 0.5));
        let best = ParameterSet::new().with("x", 1.0);
        let mut tuner = CoordinateTuner::with_multipliers(space, vec![1]);

        let (params, delta) = tuner.propose(&best, &metrics(5.0, 60.0, 30)).unwrap();
        assert_eq!(delta.direction, Direction::Down);
        assert_eq!(params.get("x"), Some(0.5));
    }
}
