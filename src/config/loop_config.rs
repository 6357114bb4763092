//! Repair and optimization bounds parsing from environment variables.

use crate::application::optimization::{OptimizationConfig, SearchSpace};
use crate::application::pipeline::RepairLoopConfig;
use crate::config::{optional_var, parse_var};
use crate::domain::optimization::RewardWeights;
use anyhow::{Context, Result, bail};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct LoopEnvConfig {
    pub repair_max_attempts: u32,
    pub repair_output_tail_lines: usize,
    pub optimization_max_iterations: u32,
    pub weights: RewardWeights,
    pub search_space_file: Option<PathBuf>,
    pub max_concurrent_runs: usize,
}

impl LoopEnvConfig {
    pub fn from_lookup<F>(get: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let repair_max_attempts: u32 = parse_var(get, "REPAIR_MAX_ATTEMPTS", 3)?;
        let optimization_max_iterations: u32 = parse_var(get, "OPTIMIZATION_MAX_ITERATIONS", 10)?;
        if repair_max_attempts == 0 || optimization_max_iterations == 0 {
            bail!("REPAIR_MAX_ATTEMPTS and OPTIMIZATION_MAX_ITERATIONS must be at least 1");
        }

        let defaults = RewardWeights::default();
        Ok(Self {
            repair_max_attempts,
            repair_output_tail_lines: parse_var(get, "REPAIR_OUTPUT_TAIL_LINES", 40)?,
            optimization_max_iterations,
            weights: RewardWeights {
                return_weight: parse_var(get, "REWARD_RETURN_WEIGHT", defaults.return_weight)?,
                sharpe_weight: parse_var(get, "REWARD_SHARPE_WEIGHT", defaults.sharpe_weight)?,
                win_rate_weight: parse_var(get, "REWARD_WIN_RATE_WEIGHT", defaults.win_rate_weight)?,
            },
            search_space_file: optional_var(get, "SEARCH_SPACE_FILE").map(PathBuf::from),
            max_concurrent_runs: parse_var(get, "MAX_CONCURRENT_RUNS", 4)?,
        })
    }

    pub fn repair_config(&self, sandbox_timeout: Duration) -> RepairLoopConfig {
        RepairLoopConfig {
            max_attempts: self.repair_max_attempts,
            sandbox_timeout,
            output_tail_lines: self.repair_output_tail_lines,
        }
    }

    pub fn optimization_config(&self) -> Result<OptimizationConfig> {
        let mut search_space = SearchSpace::standard();
        if let Some(path) = &self.search_space_file {
            let overrides = SearchSpace::load(path)
                .with_context(|| format!("Failed to load SEARCH_SPACE_FILE {:?}", path))?;
            search_space = search_space.merge(overrides);
        }
        Ok(OptimizationConfig {
            max_iterations: self.optimization_max_iterations,
            weights: self.weights,
            search_space,
            ..OptimizationConfig::default()
        })
    }
}
