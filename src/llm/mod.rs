//! LLM integration for the outreach engine.
//!
//! Supports three interchangeable backends behind [`LlmProvider`]:
//! - **OpenAI**: direct chat-completions API, server-side key
//! - **Anthropic**: direct messages API, server-side key
//! - **Gateway**: managed OpenAI-compatible gateway, caller-supplied or server token
//!
//! Callers go through [`ProviderRegistry::call`] and never see wire differences.

pub mod anthropic;
mod costs;
pub mod gateway;
pub mod http;
pub mod openai;
pub mod provider;

pub use anthropic::AnthropicProvider;
pub use costs::model_cost;
pub use gateway::GatewayProvider;
pub use openai::OpenAiProvider;
pub use provider::*;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmBackend {
    OpenAi,
    Anthropic,
    Gateway,
}

impl LlmBackend {
    pub const ALL: [LlmBackend; 3] = [LlmBackend::OpenAi, LlmBackend::Anthropic, LlmBackend::Gateway];

    pub fn as_str(&self) -> &'static str {
        match self {
            LlmBackend::OpenAi => "openai",
            LlmBackend::Anthropic => "anthropic",
            LlmBackend::Gateway => "gateway",
        }
    }
}

impl fmt::Display for LlmBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(LlmBackend::OpenAi),
            "anthropic" | "claude" => Ok(LlmBackend::Anthropic),
            "gateway" => Ok(LlmBackend::Gateway),
            other => Err(format!("unknown provider '{other}'")),
        }
    }
}

/// Static per-backend configuration. Only `model` may be overridden at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub backend: LlmBackend,
    pub model: String,
    pub base_url: String,
    pub default_temperature: f32,
    pub default_max_tokens: u32,
}

impl ProviderConfig {
    pub fn defaults_for(backend: LlmBackend) -> Self {
        let (model, base_url) = match backend {
            LlmBackend::OpenAi => ("gpt-4o-mini", "https://api.openai.com/v1"),
            LlmBackend::Anthropic => ("claude-3-5-haiku-latest", "https://api.anthropic.com/v1"),
            LlmBackend::Gateway => ("google/gemini-2.5-flash", "https://ai.gateway.lovable.dev/v1"),
        };
        Self {
            backend,
            model: model.to_string(),
            base_url: base_url.to_string(),
            default_temperature: 0.7,
            default_max_tokens: 500,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Backend configs plus server-side credentials.
#[derive(Debug, Clone)]
pub struct LlmSettings {
    pub openai: ProviderConfig,
    pub anthropic: ProviderConfig,
    pub gateway: ProviderConfig,
    pub openai_api_key: Option<SecretString>,
    pub anthropic_api_key: Option<SecretString>,
    /// Server fallback for the gateway when the caller supplies no token.
    pub gateway_token: Option<SecretString>,
    /// HTTP-level timeout for every upstream request.
    pub request_timeout: Duration,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            openai: ProviderConfig::defaults_for(LlmBackend::OpenAi),
            anthropic: ProviderConfig::defaults_for(LlmBackend::Anthropic),
            gateway: ProviderConfig::defaults_for(LlmBackend::Gateway),
            openai_api_key: None,
            anthropic_api_key: None,
            gateway_token: None,
            request_timeout: Duration::from_secs(60),
        }
    }
}

impl LlmSettings {
    pub fn config(&self, backend: LlmBackend) -> &ProviderConfig {
        match backend {
            LlmBackend::OpenAi => &self.openai,
            LlmBackend::Anthropic => &self.anthropic,
            LlmBackend::Gateway => &self.gateway,
        }
    }

    fn server_credential(&self, backend: LlmBackend) -> Option<&SecretString> {
        match backend {
            LlmBackend::OpenAi => self.openai_api_key.as_ref(),
            LlmBackend::Anthropic => self.anthropic_api_key.as_ref(),
            LlmBackend::Gateway => self.gateway_token.as_ref(),
        }
    }
}

/// Per-call scope: who is calling and which model they asked for.
#[derive(Debug, Clone, Default)]
pub struct CallScope {
    /// Token supplied by the calling user. Honoured by the gateway only.
    pub caller_token: Option<SecretString>,
    /// Model override for this call.
    pub model: Option<String>,
}

impl CallScope {
    pub fn with_caller_token(mut self, token: SecretString) -> Self {
        self.caller_token = Some(token);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// Create a provider for one backend with an explicit credential.
pub fn create_provider(
    client: reqwest::Client,
    config: ProviderConfig,
    credential: SecretString,
) -> Arc<dyn LlmProvider> {
    info!(provider = %config.backend, model = %config.model, "Creating LLM provider");
    match config.backend {
        LlmBackend::OpenAi => Arc::new(OpenAiProvider::new(client, credential, config)),
        LlmBackend::Anthropic => Arc::new(AnthropicProvider::new(client, credential, config)),
        LlmBackend::Gateway => Arc::new(GatewayProvider::new(client, credential, config)),
    }
}

/// Routes calls to the configured backends.
pub struct ProviderRegistry {
    client: Option<reqwest::Client>,
    settings: Option<LlmSettings>,
    providers: HashMap<LlmBackend, Arc<dyn LlmProvider>>,
}

impl ProviderRegistry {
    /// Empty registry; providers are added with [`ProviderRegistry::register`].
    pub fn new() -> Self {
        Self {
            client: None,
            settings: None,
            providers: HashMap::new(),
        }
    }

    /// Build providers for every backend that has a server-side credential.
    /// A gateway without a server token is still reachable with a caller token.
    pub fn from_settings(settings: LlmSettings) -> Result<Self, LlmError> {
        let client = http::build_client(settings.request_timeout)?;
        let mut providers = HashMap::new();
        for backend in LlmBackend::ALL {
            if let Some(credential) = settings.server_credential(backend) {
                let provider = create_provider(
                    client.clone(),
                    settings.config(backend).clone(),
                    credential.clone(),
                );
                providers.insert(backend, provider);
            } else {
                debug!(provider = %backend, "No server credential, backend not pre-registered");
            }
        }
        Ok(Self {
            client: Some(client),
            settings: Some(settings),
            providers,
        })
    }

    /// Register (or replace) the provider for its backend.
    pub fn register(&mut self, provider: Arc<dyn LlmProvider>) {
        self.providers.insert(provider.backend(), provider);
    }

    pub fn is_available(&self, backend: LlmBackend) -> bool {
        self.providers.contains_key(&backend)
            || (backend == LlmBackend::Gateway && self.settings.is_some())
    }

    /// Resolve the provider that should serve a call in `scope`.
    pub fn resolve(&self, backend: LlmBackend, scope: &CallScope) -> Result<Arc<dyn LlmProvider>, LlmError> {
        if let (Some(client), Some(settings)) = (&self.client, &self.settings) {
            let mut config = settings.config(backend).clone();
            if let Some(model) = &scope.model {
                config = config.with_model(model.clone());
            }

            // Direct backends never see a caller token; their keys stay server-side.
            let credential = match backend {
                LlmBackend::Gateway => scope
                    .caller_token
                    .as_ref()
                    .or_else(|| settings.server_credential(backend)),
                _ => settings.server_credential(backend),
            };

            let needs_fresh = scope.model.is_some()
                || (backend == LlmBackend::Gateway && scope.caller_token.is_some());
            if needs_fresh && let Some(credential) = credential {
                return Ok(create_provider(client.clone(), config, credential.clone()));
            }
        }

        self.providers
            .get(&backend)
            .cloned()
            .ok_or_else(|| LlmError::NotConfigured {
                provider: backend.to_string(),
                hint: missing_credential_hint(backend).to_string(),
            })
    }

    /// The single provider operation: send `request` to `backend`.
    pub async fn call(
        &self,
        backend: LlmBackend,
        request: CompletionRequest,
        scope: &CallScope,
    ) -> Result<CompletionResponse, LlmError> {
        let provider = self.resolve(backend, scope)?;
        provider.complete(request).await
    }

    /// Pricing for the model that would serve `backend` by default.
    pub fn cost_per_token(&self, backend: LlmBackend) -> Option<(rust_decimal::Decimal, rust_decimal::Decimal)> {
        if let Some(provider) = self.providers.get(&backend) {
            return Some(provider.cost_per_token());
        }
        self.settings
            .as_ref()
            .map(|s| model_cost(&s.config(backend).model))
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn missing_credential_hint(backend: LlmBackend) -> &'static str {
    match backend {
        LlmBackend::OpenAi => "set OPENAI_API_KEY on the server",
        LlmBackend::Anthropic => "set ANTHROPIC_API_KEY on the server",
        LlmBackend::Gateway => "supply a caller token or set OUTREACH_GATEWAY_TOKEN",
    }
}
