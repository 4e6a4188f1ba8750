//! Cold-outreach email generation: prompts, parsing, validation, and the
//! generator service that ties them to an LLM provider.

pub mod generator;
pub mod limiter;
pub mod parser;
pub mod prompts;
pub mod types;
pub mod validator;

pub use generator::{EmailGenerator, GeneratorConfig, estimate_tokens};
pub use limiter::CallLimiter;
pub use parser::parse_email_response;
pub use prompts::{build_system_prompt, build_user_prompt};
pub use types::{
    CompanyInfo, CostEstimate, GeneratedEmail, GenerationOptions, GenerationResult, PromptContext,
    RegenerateChanges, Tone, ValidationResult,
};
pub use validator::validate_email;
