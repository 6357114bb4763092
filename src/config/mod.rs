//! Configuration module for stratforge.
//!
//! Structured configuration loaded from environment variables, organized by
//! concern: LLM, Sandbox, Loop bounds, and Storage. Components receive the
//! resulting plain structs and never read the environment themselves.

mod llm_config;
mod loop_config;
mod sandbox_config;
mod store_config;

pub use llm_config::LlmEnvConfig;
pub use loop_config::LoopEnvConfig;
pub use sandbox_config::SandboxEnvConfig;
pub use store_config::{StoreBackend, StoreEnvConfig};

use crate::application::pipeline::PipelineConfig;
use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Parses `name` with `FromStr`, falling back to `default` when unset or blank
pub(crate) fn parse_var<T, F>(get: &F, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
    F: Fn(&str) -> Option<String>,
{
    match get(name).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Failed to parse {}='{}'", name, raw)),
        None => Ok(default),
    }
}

pub(crate) fn optional_var<F>(get: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    get(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmEnvConfig,
    pub sandbox: SandboxEnvConfig,
    pub loops: LoopEnvConfig,
    pub store: StoreEnvConfig,
    /// Directory of `<TICKER>_<interval>.csv` files; runs without data when unset
    pub market_data_dir: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            llm: LlmEnvConfig::from_lookup(&get).context("Invalid LLM configuration")?,
            sandbox: SandboxEnvConfig::from_lookup(&get).context("Invalid sandbox configuration")?,
            loops: LoopEnvConfig::from_lookup(&get).context("Invalid loop configuration")?,
            store: StoreEnvConfig::from_lookup(&get).context("Invalid store configuration")?,
            market_data_dir: optional_var(&get, "MARKET_DATA_DIR").map(PathBuf::from),
        })
    }

    /// Repair and optimization settings, loading the search space file if one is configured
    pub fn pipeline_config(&self) -> Result<PipelineConfig> {
        Ok(PipelineConfig {
            repair: self.loops.repair_config(self.sandbox.timeout),
            optimization: self.loops.optimization_config()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.loops.repair_max_attempts, 3);
        assert_eq!(config.loops.optimization_max_iterations, 10);
        assert_eq!(config.sandbox.interpreter, "python3");
        assert_eq!(config.store.backend, StoreBackend::JsonFiles);
        assert!(config.market_data_dir.is_none());

        let pipeline = config.pipeline_config().unwrap();
        assert_eq!(pipeline.repair.max_attempts, 3);
        assert_eq!(pipeline.repair.sandbox_timeout, config.sandbox.timeout);
        assert_eq!(pipeline.optimization.max_iterations, 10);
    }

    #[test]
    fn test_invalid_number_names_the_variable() {
        let err = Config::from_lookup(lookup(&[("REPAIR_MAX_ATTEMPTS", "three")])).unwrap_err();
        assert!(format!("{:#}", err).contains("REPAIR_MAX_ATTEMPTS"));
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let config = Config::from_lookup(lookup(&[("SANDBOX_TIMEOUT_SECS", "  "), ("MARKET_DATA_DIR", "")])).unwrap();
        assert_eq!(config.sandbox.timeout.as_secs(), 120);
        assert!(config.market_data_dir.is_none());
    }

    #[test]
    fn test_search_space_file_overrides_standard_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("space.toml");
        std::fs::write(&path, "[stop_loss_pct]\nmin = 0.01\nmax = 0.05\nstep = 0.01\n").unwrap();

        let config = Config::from_lookup(lookup(&[("SEARCH_SPACE_FILE", path.to_str().unwrap())])).unwrap();
        let space = config.pipeline_config().unwrap().optimization.search_space;
        let range = space.range("stop_loss_pct").unwrap();
        assert_eq!((range.min, range.max, range.step), (0.01, 0.05, 0.01));
        assert!(space.range("take_profit_pct").is_some());
    }
}
