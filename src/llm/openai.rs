//! OpenAI chat-completions backend.
//!
//! The request/response translation here is shared with the gateway backend,
//! which speaks the same wire format.

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::LlmError;
use crate::llm::costs::model_cost;
use crate::llm::http::{check_status, transport_error};
use crate::llm::provider::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider, TokenUsage};
use crate::llm::{LlmBackend, ProviderConfig};

/// OpenAI provider. The API key is a server-side secret.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: SecretString,
    config: ProviderConfig,
}

impl OpenAiProvider {
    pub fn new(client: reqwest::Client, api_key: SecretString, config: ProviderConfig) -> Self {
        Self {
            client,
            api_key,
            config,
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn backend(&self) -> LlmBackend {
        LlmBackend::OpenAi
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        model_cost(&self.config.model)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let provider = LlmBackend::OpenAi.as_str();
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = chat_completion_body(&self.config, &request);

        debug!(provider, model = %self.config.model, messages = request.messages.len(), "Sending completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(provider, e))?;

        let response = check_status(provider, response).await?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| transport_error(provider, e))?;

        parse_chat_completion(provider, &value)
    }
}

/// Build an OpenAI-format chat-completions body, filling unset sampling parameters
/// from the backend defaults.
pub(crate) fn chat_completion_body(config: &ProviderConfig, request: &CompletionRequest) -> Value {
    let messages: Vec<Value> = request
        .messages
        .iter()
        .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
        .collect();

    json!({
        "model": config.model,
        "messages": messages,
        "temperature": request.temperature.unwrap_or(config.default_temperature),
        "max_tokens": request.max_tokens.unwrap_or(config.default_max_tokens),
    })
}

/// Parse an OpenAI-format chat-completions response.
pub(crate) fn parse_chat_completion(provider: &str, value: &Value) -> Result<CompletionResponse, LlmError> {
    let choice = value
        .get("choices")
        .and_then(|c| c.get(0))
        .ok_or_else(|| LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason: "response has no choices".to_string(),
        })?;

    let content = choice
        .pointer("/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| LlmError::InvalidResponse {
            provider: provider.to_string(),
            reason: "choice has no message content".to_string(),
        })?
        .to_string();

    let finish_reason = FinishReason::from_wire(choice.get("finish_reason").and_then(Value::as_str));

    let usage = value.get("usage").map(|u| {
        let prompt = u.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
        let completion = u.get("completion_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
        TokenUsage::new(prompt, completion)
    });

    Ok(CompletionResponse {
        content,
        usage,
        finish_reason,
    })
}
