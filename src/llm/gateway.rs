//! Managed AI gateway backend (OpenAI-compatible wire format).
//!
//! Unlike the direct backends, the gateway accepts a token supplied by the
//! calling user, so no server secret is required when one is present.

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::debug;

use crate::error::LlmError;
use crate::llm::costs::model_cost;
use crate::llm::http::{check_status, transport_error};
use crate::llm::openai::{chat_completion_body, parse_chat_completion};
use crate::llm::provider::{CompletionRequest, CompletionResponse, LlmProvider};
use crate::llm::{LlmBackend, ProviderConfig};

/// Gateway provider bound to one bearer token.
pub struct GatewayProvider {
    client: reqwest::Client,
    token: SecretString,
    config: ProviderConfig,
}

impl GatewayProvider {
    pub fn new(client: reqwest::Client, token: SecretString, config: ProviderConfig) -> Self {
        Self {
            client,
            token,
            config,
        }
    }
}

#[async_trait]
impl LlmProvider for GatewayProvider {
    fn backend(&self) -> LlmBackend {
        LlmBackend::Gateway
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn cost_per_token(&self) -> (Decimal, Decimal) {
        model_cost(&self.config.model)
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let provider = LlmBackend::Gateway.as_str();
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let body = chat_completion_body(&self.config, &request);

        debug!(provider, model = %self.config.model, "Sending gateway completion request");

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.token.expose_secret())
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
