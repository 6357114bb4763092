use crate::domain::errors::LlmServiceError;
use crate::domain::ports::LanguageModelService;
use crate::infrastructure::llm::http_client::{HttpClientFactory, join_url};
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub request_timeout: Duration,
    pub transport_retries: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

/// Chat-completions client for any OpenAI-compatible endpoint
pub struct OpenAiCompatibleClient {
    client: ClientWithMiddleware,
    config: OpenAiConfig,
}

impl OpenAiCompatibleClient {
    pub fn new(config: OpenAiConfig) -> Self {
        let client = HttpClientFactory::create_client(config.request_timeout, config.transport_retries);
        Self { client, config }
    }

    fn request_body(&self, system_prompt: &str, user_prompt: &str) -> Result<Vec<u8>, LlmServiceError> {
        let request = ChatRequest {
            model: &self.config.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };
        serde_json::to_vec(&request).map_err(|e| LlmServiceError::InvalidResponse(format!("request encoding: {}", e)))
    }
}

/// Content of the first choice of a chat-completions response body
pub fn parse_chat_response(body: &str) -> Result<String, LlmServiceError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| LlmServiceError::InvalidResponse(e.to_string()))?;
    response
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or_else(|| LlmServiceError::InvalidResponse("response has no message content".to_string()))
}

#[async_trait]
impl LanguageModelService for OpenAiCompatibleClient {
    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, LlmServiceError> {
        let url = join_url(&self.config.base_url, "chat/completions");
        let body = self.request_body(system_prompt, user_prompt)?;

        let mut request = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .body(body);
        if let Some(key) = &self.config.api_key {
            request = request.header("Authorization", format!("Bearer {}", key));
        }

        let response = request.send().await.map_err(|e| {
            if let reqwest_middleware::Error::Reqwest(inner) = &e
                && inner.is_timeout()
            {
                return LlmServiceError::Timeout {
                    after: self.config.request_timeout,
                };
            }
            LlmServiceError::Transport(e.to_string())
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| LlmServiceError::Transport(e.to_string()))?;
        if !status.is_success() {
            return Err(LlmServiceError::Api {
                status: status.as_u16(),
                message: text.chars().take(300).collect(),
            });
        }

        debug!("OpenAiCompatibleClient: {} returned {} bytes", self.config.model, text.len());
        parse_chat_response(&text)
    }
}
