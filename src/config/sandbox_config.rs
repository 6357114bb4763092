//! Sandbox configuration parsing from environment variables.

use crate::config::{optional_var, parse_var};
use crate::infrastructure::sandbox::SandboxConfig;
use anyhow::{Result, bail};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SandboxEnvConfig {
    pub interpreter: String,
    pub interpreter_args: Vec<String>,
    pub timeout: Duration,
    pub max_output_bytes: usize,
    pub path: String,
    pub env_allowlist: Vec<String>,
}

impl SandboxEnvConfig {
    pub fn from_lookup<F>(get: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = SandboxConfig::default();
        let timeout_secs: u64 = parse_var(get, "SANDBOX_TIMEOUT_SECS", 120)?;
        if timeout_secs == 0 {
            bail!("SANDBOX_TIMEOUT_SECS must be at least 1");
        }

        Ok(Self {
            interpreter: optional_var(get, "SANDBOX_INTERPRETER").unwrap_or(defaults.interpreter),
            interpreter_args: match get("SANDBOX_INTERPRETER_ARGS") {
                Some(raw) => raw.split_whitespace().map(str::to_string).collect(),
                None => defaults.interpreter_args,
            },
            timeout: Duration::from_secs(timeout_secs),
            max_output_bytes: parse_var(get, "SANDBOX_MAX_OUTPUT_BYTES", defaults.max_output_bytes)?,
            path: optional_var(get, "SANDBOX_PATH").unwrap_or(defaults.path),
            env_allowlist: optional_var(get, "SANDBOX_ENV_ALLOWLIST")
                .map(|raw| {
                    raw.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    pub fn sandbox_config(&self) -> SandboxConfig {
        SandboxConfig {
            interpreter: self.interpreter.clone(),
            interpreter_args: self.interpreter_args.clone(),
            path: self.path.clone(),
            env_allowlist: self.env_allowlist.clone(),
            max_output_bytes: self.max_output_bytes,
            ..SandboxConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allowlist_and_args() {
        let get = |name: &str| match name {
            "SANDBOX_ENV_ALLOWLIST" => Some("LANG, TZ,,".to_string()),
            "SANDBOX_INTERPRETER_ARGS" => Some("".to_string()),
            _ => None,
        };
        let config = SandboxEnvConfig::from_lookup(&get).unwrap();
        assert_eq!(config.env_allowlist, vec!["LANG".to_string(), "TZ".to_string()]);
        assert!(config.interpreter_args.is_empty());
        assert_eq!(config.sandbox_config().script_name, "strategy.py");
    }
}
