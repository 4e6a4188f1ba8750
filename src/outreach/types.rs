//! Shared types for email generation.

use std::fmt;
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::campaign::{Lead, PersonaInsights};
use crate::llm::{CallScope, LlmBackend, TokenUsage};

// ── Prompt context ──────────────────────────────────────────────────

/// Writing tone requested for a generated email.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    #[default]
    Professional,
    Casual,
    Friendly,
    Direct,
}

impl Tone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tone::Professional => "professional",
            Tone::Casual => "casual",
            Tone::Friendly => "friendly",
            Tone::Direct => "direct",
        }
    }
}

impl fmt::Display for Tone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The sender's company, injected into the system prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyInfo {
    /// Absent means "no company block" in the system prompt.
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub value_proposition: String,
    #[serde(default)]
    pub target_audience: String,
    #[serde(default)]
    pub key_benefits: String,
}

/// Everything the prompt builder needs for one lead. Built per call, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptContext {
    pub lead_name: String,
    pub lead_position: String,
    #[serde(default)]
    pub lead_company: Option<String>,
    pub lead_requirement: String,
    #[serde(default, rename = "leadLinkedIn")]
    pub lead_linkedin: Option<String>,
    #[serde(default)]
    pub lead_website: Option<String>,
    #[serde(default)]
    pub tone: Tone,
    #[serde(default)]
    pub company_info: Option<CompanyInfo>,
    /// Step name and step prompt when generating for a sequence step.
    #[serde(default)]
    pub campaign_context: Option<String>,
    #[serde(default)]
    pub persona: Option<PersonaInsights>,
}

impl PromptContext {
    /// Context carrying the lead's profile and stored persona. Tone and
    /// campaign context are left at their defaults.
    pub fn from_lead(lead: &Lead) -> Self {
        Self {
            lead_name: lead.name.clone(),
            lead_position: lead.position.clone(),
            lead_company: lead.company.clone(),
            lead_requirement: lead.requirement.clone(),
            lead_linkedin: lead.founder_linkedin.clone(),
            lead_website: lead.website_url.clone(),
            persona: lead.persona_insights.clone(),
            ..Default::default()
        }
    }
}

// ── Generated output ────────────────────────────────────────────────

/// A parsed email. Always well-formed, even when the model output was not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedEmail {
    pub subject: String,
    pub body: String,
}

/// Outcome of running the content rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub is_valid: bool,
    pub errors: Vec<String>,
}

// ── Options and results ─────────────────────────────────────────────

/// Per-call generation options. The provider choice is explicit on every call.
#[derive(Debug, Clone)]
pub struct GenerationOptions {
    pub provider: LlmBackend,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
    pub validate_output: bool,
    /// Model override for this call.
    pub model: Option<String>,
    /// Token supplied by the calling user (gateway only).
    pub caller_token: Option<SecretString>,
    /// Deadline for a single provider call; `None` uses the generator default.
    pub timeout: Option<Duration>,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            provider: LlmBackend::Gateway,
            temperature: 0.7,
            max_tokens: None,
            validate_output: true,
            model: None,
            caller_token: None,
            timeout: None,
        }
    }
}

impl GenerationOptions {
    pub fn for_provider(provider: LlmBackend) -> Self {
        Self {
            provider,
            ..Default::default()
        }
    }

    pub(crate) fn call_scope(&self) -> CallScope {
        CallScope {
            caller_token: self.caller_token.clone(),
            model: self.model.clone(),
        }
    }
}

/// Result of a single generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub email: GeneratedEmail,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    pub provider: LlmBackend,
}

/// Changes applied on top of a previous generation.
#[derive(Debug, Clone, Default)]
pub struct RegenerateChanges {
    pub tone: Option<Tone>,
    pub lead_requirement: Option<String>,
    pub company_info: Option<CompanyInfo>,
    pub campaign_context: Option<String>,
    pub provider: Option<LlmBackend>,
    pub temperature: Option<f32>,
    pub model: Option<String>,
    pub caller_token: Option<SecretString>,
    pub max_tokens: Option<u32>,
    /// Deadline for the regenerated call; `None` uses the generator default.
    pub timeout: Option<Duration>,
}

/// Offline token estimate for one generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostEstimate {
    pub estimated_prompt_tokens: u32,
    pub estimated_completion_tokens: u32,
    pub estimated_total_tokens: u32,
    pub provider: LlmBackend,
    /// Dollar estimate from the provider's pricing, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost_usd: Option<Decimal>,
}
