//! Language-model client configuration parsing from environment variables.

use crate::config::{optional_var, parse_var};
use crate::infrastructure::llm::{OpenAiConfig, RetryPolicy};
use anyhow::{Result, bail};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct LlmEnvConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub request_timeout: Duration,
    pub transport_retries: u32,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl LlmEnvConfig {
    pub fn from_lookup<F>(get: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let temperature: f32 = parse_var(get, "LLM_TEMPERATURE", 0.2)?;
        if !(0.0..=2.0).contains(&temperature) {
            bail!("LLM_TEMPERATURE must be between 0 and 2, got {}", temperature);
        }
        let max_attempts: u32 = parse_var(get, "LLM_MAX_ATTEMPTS", 3)?;
        if max_attempts == 0 {
            bail!("LLM_MAX_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            base_url: optional_var(get, "LLM_BASE_URL").unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            api_key: optional_var(get, "LLM_API_KEY").or_else(|| optional_var(get, "OPENAI_API_KEY")),
            model: optional_var(get, "LLM_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string()),
            temperature,
            max_tokens: optional_var(get, "LLM_MAX_TOKENS")
                .map(|_| parse_var(get, "LLM_MAX_TOKENS", 0u32))
                .transpose()?,
            request_timeout: Duration::from_secs(parse_var(get, "LLM_REQUEST_TIMEOUT_SECS", 90)?),
            transport_retries: parse_var(get, "LLM_TRANSPORT_RETRIES", 1)?,
            max_attempts,
            backoff_base: Duration::from_millis(parse_var(get, "LLM_BACKOFF_BASE_MS", 500)?),
            backoff_max: Duration::from_millis(parse_var(get, "LLM_BACKOFF_MAX_MS", 8000)?),
        })
    }

    pub fn client_config(&self) -> OpenAiConfig {
        OpenAiConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            request_timeout: self.request_timeout,
            transport_retries: self.transport_retries,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: self.backoff_base,
            max_delay: self.backoff_max,
            call_timeout: self.request_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_defaults_and_fallback_key() {
        let get = |name: &str| (name == "OPENAI_API_KEY").then(|| "sk-test".to_string());
        let config = LlmEnvConfig::from_lookup(&get).unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.max_tokens, None);
        assert_eq!(config.retry_policy().max_attempts, 3);
        assert_eq!(config.retry_policy().base_delay, Duration::from_millis(500));
        assert_eq!(config.client_config().model, "gpt-4o-mini");
    }

    #[test]
    fn test_llm_rejects_zero_attempts() {
        let get = |name: &str| (name == "LLM_MAX_ATTEMPTS").then(|| "0".to_string());
        assert!(LlmEnvConfig::from_lookup(&get).is_err());
    }
}
