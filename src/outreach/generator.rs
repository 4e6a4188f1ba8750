//! Email generation service.
//!
//! Flow for one email:
//! 1. Build system + user prompts (pure)
//! 2. Call the selected provider under a deadline
//! 3. Parse the raw output (never fails)
//! 4. Validate, when requested
//!
//! Only provider-layer errors propagate. Malformed model output is absorbed by
//! the parser.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::LlmError;
use crate::llm::{ChatMessage, CompletionRequest, CompletionResponse, LlmBackend, ProviderRegistry};
use crate::outreach::limiter::CallLimiter;
use crate::outreach::parser::parse_email_response;
use crate::outreach::prompts::{build_system_prompt, build_user_prompt};
use crate::outreach::types::{
    CostEstimate, GenerationOptions, GenerationResult, PromptContext, RegenerateChanges,
};
use crate::outreach::validator::validate_email;

/// Fixed completion-size assumption used by the offline estimate.
pub const ESTIMATED_COMPLETION_TOKENS: u32 = 250;

/// Rough characters-per-token ratio for English prose.
const CHARS_PER_TOKEN: usize = 4;

/// Configuration for the generator.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Deadline for one provider call when the options carry none.
    pub call_timeout: Duration,
    /// Minimum spacing between provider calls inside a batch.
    pub batch_interval: Duration,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(60),
            batch_interval: Duration::from_millis(1000),
        }
    }
}

/// Generates personalized outreach emails.
pub struct EmailGenerator {
    registry: Arc<ProviderRegistry>,
    limiter: Arc<CallLimiter>,
    config: GeneratorConfig,
}

impl EmailGenerator {
    /// Create a generator whose batch limiter spaces calls by `config.batch_interval`.
    pub fn new(registry: Arc<ProviderRegistry>, config: GeneratorConfig) -> Self {
        let limiter = Arc::new(CallLimiter::spaced(config.batch_interval));
        Self {
            registry,
            limiter,
            config,
        }
    }

    /// Use an externally owned limiter (e.g. shared across generators).
    pub fn with_limiter(mut self, limiter: Arc<CallLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// Generate one email for `context`.
    pub async fn generate_email(
        &self,
        context: &PromptContext,
        options: &GenerationOptions,
    ) -> Result<GenerationResult, LlmError> {
        self.generate_inner(context, options, None).await
    }

    /// Generate emails for every context, one at a time.
    ///
    /// Items whose provider call fails are logged and omitted; the rest keep
    /// their input order.
    pub async fn generate_batch(
        &self,
        contexts: &[PromptContext],
        options: &GenerationOptions,
    ) -> Vec<GenerationResult> {
        self.generate_batch_with_cancel(contexts, options, &CancellationToken::new())
            .await
    }

    /// Like [`EmailGenerator::generate_batch`], stopping early once `cancel` fires.
    /// Results gathered before cancellation are returned.
    pub async fn generate_batch_with_cancel(
        &self,
        contexts: &[PromptContext],
        options: &GenerationOptions,
        cancel: &CancellationToken,
    ) -> Vec<GenerationResult> {
        let total = contexts.len();
        info!(total, provider = %options.provider, "Generating email batch");

        let mut results = Vec::with_capacity(total);
        for (index, context) in contexts.iter().enumerate() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    warn!(index, total, "Batch cancelled");
                    break;
                }
                _ = self.limiter.acquire() => {}
            }

            match self.generate_inner(context, options, Some(cancel)).await {
                Ok(result) => results.push(result),
                Err(LlmError::Cancelled { .. }) => {
                    warn!(index, total, "Batch cancelled mid-call");
                    break;
                }
                Err(e) => {
                    error!(
                        index,
                        lead = %context.lead_name,
                        kind = ?e.kind(),
                        error = %e,
                        "Failed to generate email in batch, skipping"
                    );
                }
            }
        }

        info!(generated = results.len(), total, "Batch generation complete");
        results
    }

    /// Generate again with changes merged over the previous context and options.
    /// The provider defaults to the previous result's; every other option not named
    /// in `changes` falls back to its default. Output is always validated.
    pub async fn regenerate_email(
        &self,
        context: &PromptContext,
        previous: &GenerationResult,
        changes: RegenerateChanges,
    ) -> Result<GenerationResult, LlmError> {
        let mut merged = context.clone();
        if let Some(tone) = changes.tone {
            merged.tone = tone;
        }
        if let Some(requirement) = changes.lead_requirement {
            merged.lead_requirement = requirement;
        }
        if let Some(info) = changes.company_info {
            merged.company_info = Some(info);
        }
        if let Some(campaign) = changes.campaign_context {
            merged.campaign_context = Some(campaign);
        }

        let defaults = GenerationOptions::default();
        let options = GenerationOptions {
            provider: changes.provider.unwrap_or(previous.provider),
            temperature: changes.temperature.unwrap_or(defaults.temperature),
            validate_output: true,
            max_tokens: changes.max_tokens,
            model: changes.model,
            caller_token: changes.caller_token,
            timeout: changes.timeout,
            ..defaults
        };

        debug!(provider = %options.provider, "Regenerating email");
        self.generate_inner(&merged, &options, None).await
    }

    /// Offline token estimate for generating an email for `context`.
    ///
    /// Token counts depend only on the context; `provider` affects the dollar
    /// figure alone.
    pub fn estimate_cost(&self, context: &PromptContext, provider: LlmBackend) -> CostEstimate {
        let mut estimate = estimate_tokens(context, provider);
        estimate.estimated_cost_usd = self.registry.cost_per_token(provider).map(|(input, output)| {
            input * Decimal::from(estimate.estimated_prompt_tokens)
                + output * Decimal::from(estimate.estimated_completion_tokens)
        });
        estimate
    }

    async fn generate_inner(
        &self,
        context: &PromptContext,
        options: &GenerationOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<GenerationResult, LlmError> {
        info!(
            provider = %options.provider,
            lead = %context.lead_name,
            tone = %context.tone,
            "Generating outreach email"
        );

        let mut request = CompletionRequest::new(vec![
            ChatMessage::system(build_system_prompt(context.company_info.as_ref())),
            ChatMessage::user(build_user_prompt(context)),
        ])
        .with_temperature(options.temperature);
        if let Some(max_tokens) = options.max_tokens {
            request = request.with_max_tokens(max_tokens);
        }

        let response = self.call_with_deadline(options, request, cancel).await?;
        let email = parse_email_response(&response.content);
        let validation = options.validate_output.then(|| validate_email(&email));

        if let Some(v) = &validation
            && !v.is_valid
        {
            warn!(
                provider = %options.provider,
                errors = ?v.errors,
                "Generated email failed validation"
            );
        }

        Ok(GenerationResult {
            email,
            validation,
            usage: response.usage,
            provider: options.provider,
        })
    }

    async fn call_with_deadline(
        &self,
        options: &GenerationOptions,
        request: CompletionRequest,
        cancel: Option<&CancellationToken>,
    ) -> Result<CompletionResponse, LlmError> {
        let deadline = options.timeout.unwrap_or(self.config.call_timeout);
        let scope = options.call_scope();
        let call = tokio::time::timeout(deadline, self.registry.call(options.provider, request, &scope));

        let outcome = match cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => {
                    return Err(LlmError::Cancelled { provider: options.provider.to_string() });
                }
                outcome = call => outcome,
            },
            None => call.await,
        };

        outcome.map_err(|_| LlmError::Timeout {
            provider: options.provider.to_string(),
            after: deadline,
        })?
    }
}

/// Token estimate: ceil(prompt characters / 4) plus a fixed completion size.
pub fn estimate_tokens(context: &PromptContext, provider: LlmBackend) -> CostEstimate {
    let system = build_system_prompt(context.company_info.as_ref());
    let user = build_user_prompt(context);
    let chars = system.chars().count() + user.chars().count();
    let prompt_tokens = chars.div_ceil(CHARS_PER_TOKEN) as u32;

    CostEstimate {
        estimated_prompt_tokens: prompt_tokens,
        estimated_completion_tokens: ESTIMATED_COMPLETION_TOKENS,
        estimated_total_tokens: prompt_tokens + ESTIMATED_COMPLETION_TOKENS,
        provider,
        estimated_cost_usd: None,
    }
}
