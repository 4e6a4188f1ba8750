//! Anthropic messages-API backend.

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Value, json};
use tracing::debug;

use crate::error::LlmError;
use crate::llm::costs::model_cost;
use crate::llm::http::{check_status, transport_error};
use crate::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider, Role, TokenUsage,
};
use crate::llm::{LlmBackend, ProviderConfig};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic provider. The API key is a server-side secret.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: SecretString,
    config: ProviderConfig,
}

impl AnthropicProvider {
    pub fn new(client: reqwest::Client, api_key: SecretString, config: ProviderConfig) -> Self {
        Self {
            client,
            api_key,
            config,
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    fn backend(&self) -> LlmBackend {
        LlmBackend::Anthropic
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        model_cost(&self.config.model)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let provider = LlmBackend::Anthropic.as_str();
        let url = format!("{}/messages", self.config.base_url.trim_end_matches('/'));
        let body = messages_body(&self.config, &request);

        debug!(provider, model = %self.config.model, "Sending messages request");

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(provider, e))?;

        let response = check_status(provider, response).await?;
        let value: Value = response
            .json()
            .await
            .map_err(|e| transport_error(provider, e))?;

        parse_messages_response(&value)
    }
}

/// Build a messages-API body. System messages are hoisted into the top-level
/// `system` parameter; the API only accepts user/assistant turns.
fn messages_body(config: &ProviderConfig, request: &CompletionRequest) -> Value {
    let system: Vec<&str> = request
        .messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();

    let messages: Vec<Value> = request
        .messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| json!({ "role": m.role.as_str(), "content": m.content }))
        .collect();

    let mut body = json!({
        "model": config.model,
        "messages": messages,
        "max_tokens": request.max_tokens.unwrap_or(config.default_max_tokens),
        "temperature": request.temperature.unwrap_or(config.default_temperature),
    });
    if !system.is_empty() {
        body["system"] = Value::String(system.join("\n\n"));
    }
    body
}

fn parse_messages_response(value: &Value) -> Result<CompletionResponse, LlmError> {
    let blocks = value
        .get("content")
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::InvalidResponse {
            provider: LlmBackend::Anthropic.as_str().to_string(),
            reason: "response has no content blocks".to_string(),
        })?;

    let content: String = blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("");

    let usage = value.get("usage").map(|u| {
        let input = u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
        let output = u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
        TokenUsage::new(input, output)
    });

    Ok(CompletionResponse {
        content,
        usage,
        finish_reason: FinishReason::from_wire(value.get("stop_reason").and_then(Value::as_str)),
    })
}
