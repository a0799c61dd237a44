//! OpenAI-compatible chat completion provider
//!
//! DeepSeek, Moonshot and OpenAI all accept the same `/chat/completions`
//! request shape, so one client covers them, configured per provider.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::num::NonZeroU32;
use std::time::Duration;
use symloc_common::config::ProviderConfig;
use symloc_common::models::Prediction;

use super::prompt::{build_prompt, SYSTEM_PROMPT};
use super::response_parser::parse_prediction;
use super::{PredictionProvider, PredictionRequest, ProviderError};

const USER_AGENT: &str = "symloc/0.1.0";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

pub struct OpenAiCompatibleProvider {
    name: String,
    endpoint: String,
    model: String,
    api_key: String,
    max_tokens: u32,
    temperature: f64,
    client: reqwest::Client,
    rate_limiter: governor::DefaultDirectRateLimiter,
}

impl OpenAiCompatibleProvider {
    /// Build a provider, reading the API key from the configured env var
    pub fn from_config(config: &ProviderConfig) -> Result<Self, ProviderError> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            ProviderError::Permanent(format!(
                "provider {}: environment variable {} is not set",
                config.name, config.api_key_env
            ))
        })?;
        Self::with_api_key(config, api_key)
    }

    pub fn with_api_key(config: &ProviderConfig, api_key: String) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ProviderError::Permanent(format!("failed to build HTTP client: {}", e)))?;

        let per_minute = NonZeroU32::new(config.requests_per_minute).ok_or_else(|| {
            ProviderError::Permanent(format!("provider {}: requests_per_minute must be non-zero", config.name))
        })?;
        let rate_limiter = governor::RateLimiter::direct(governor::Quota::per_minute(per_minute));

        Ok(Self {
            name: config.name.clone(),
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            api_key,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            client,
            rate_limiter,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// Map an HTTP status onto the retry classification
fn classify_status(status: reqwest::StatusCode, body: &str) -> ProviderError {
    let message = format!("HTTP {}: {}", status.as_u16(), body.chars().take(200).collect::<String>());
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        ProviderError::Transient(message)
    } else {
        ProviderError::Permanent(message)
    }
}

fn classify_transport(err: &reqwest::Error) -> ProviderError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        ProviderError::Transient(format!("transport error: {}", err))
    } else {
        ProviderError::Permanent(format!("transport error: {}", err))
    }
}

#[async_trait]
impl PredictionProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn predict(&self, request: &PredictionRequest) -> Result<Option<Prediction>, ProviderError> {
        self.rate_limiter.until_ready().await;

        let prompt = build_prompt(request);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt,
                },
            ],
            max_tokens: self.max_tokens,
            temperature: self.temperature,
        };

        tracing::debug!(
            provider = %self.name,
            model = %self.model,
            with_knowledge = request.knowledge.is_some(),
            "Sending prediction request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_transport(&e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(classify_status(status, &error_text));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Permanent(format!("unexpected response schema: {}", e)))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        parse_prediction(&content)
    }
}
