//! Result store configuration parsing from environment variables.

use crate::config::optional_var;
use anyhow::{Result, bail};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    JsonFiles,
    Sqlite,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "json" => Ok(StoreBackend::JsonFiles),
            "sqlite" => Ok(StoreBackend::Sqlite),
            "memory" => Ok(StoreBackend::Memory),
            _ => bail!("Invalid RESULT_STORE: {}. Must be 'json', 'sqlite' or 'memory'", s),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoreEnvConfig {
    pub backend: StoreBackend,
    pub results_dir: PathBuf,
    pub database_url: String,
}

impl StoreEnvConfig {
    pub fn from_lookup<F>(get: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let backend = match optional_var(get, "RESULT_STORE") {
            Some(raw) => raw.parse()?,
            None => StoreBackend::JsonFiles,
        };
        Ok(Self {
            backend,
            results_dir: optional_var(get, "RESULTS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("results")),
            database_url: optional_var(get, "DATABASE_URL").unwrap_or_else(|| "sqlite://data/stratforge.db".to_string()),
        })
    }
}
