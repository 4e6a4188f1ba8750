//! Error types for the outreach engine.

use std::time::Duration;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Sequence error: {0}")]
    Sequence(#[from] SequenceError),

    #[error("Warmup error: {0}")]
    Warmup(#[from] WarmupError),

    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Missing required configuration: {key}. {hint}")]
    MissingRequired { key: String, hint: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    #[error("Version conflict on {entity} {id}: expected {expected}, found {found}")]
    VersionConflict {
        entity: String,
        id: String,
        expected: u64,
        found: u64,
    },

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid sequence: {0}")]
    InvalidSequence(#[from] SequenceError),
}

/// Coarse classification of provider failures, for callers that branch on kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmErrorKind {
    /// Backend credential or endpoint missing. Fatal, no retry.
    Configuration,
    /// Upstream 429. Try again shortly.
    RateLimit,
    /// Upstream 402 / credits exhausted. Requires account action.
    Quota,
    /// Call exceeded its deadline or was cancelled.
    Timeout,
    /// Any other upstream or transport failure.
    Upstream,
}

/// LLM provider errors.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Provider {provider} is not configured: {hint}")]
    NotConfigured { provider: String, hint: String },

    #[error("Provider {provider} rate limited, retry after {retry_after:?}")]
    RateLimited {
        provider: String,
        retry_after: Option<Duration>,
    },

    #[error("Provider {provider} quota exhausted: {reason}")]
    QuotaExceeded { provider: String, reason: String },

    #[error("Provider {provider} request failed (status {status:?}): {reason}")]
    RequestFailed {
        provider: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("Provider {provider} did not respond within {after:?}")]
    Timeout { provider: String, after: Duration },

    #[error("Call to provider {provider} was cancelled")]
    Cancelled { provider: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LlmError {
    pub fn kind(&self) -> LlmErrorKind {
        match self {
            LlmError::NotConfigured { .. } => LlmErrorKind::Configuration,
            LlmError::RateLimited { .. } => LlmErrorKind::RateLimit,
            LlmError::QuotaExceeded { .. } => LlmErrorKind::Quota,
            LlmError::Timeout { .. } | LlmError::Cancelled { .. } => LlmErrorKind::Timeout,
            LlmError::RequestFailed { .. } | LlmError::InvalidResponse { .. } | LlmError::Json(_) => {
                LlmErrorKind::Upstream
            }
        }
    }

    /// Whether trying the same call again later can succeed without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.kind(),
            LlmErrorKind::RateLimit | LlmErrorKind::Timeout | LlmErrorKind::Upstream
        )
    }
}

/// Sequence editing errors.
#[derive(Debug, thiserror::Error)]
pub enum SequenceError {
    #[error("Step {id} not found")]
    StepNotFound { id: String },

    #[error("Duplicate step id: {id}")]
    DuplicateStepId { id: String },

    #[error("Step id must not be empty (position {position})")]
    EmptyStepId { position: usize },

    #[error("Move target {index} out of range for {len} steps")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Invalid step update: {0}")]
    InvalidUpdate(String),

    #[error("Delay of {days} days exceeds the {max}-day maximum")]
    DelayTooLong { days: u32, max: u32 },
}

/// Warmup policy errors.
#[derive(Debug, thiserror::Error)]
pub enum WarmupError {
    #[error("Invalid warmup settings: {0}")]
    InvalidSettings(String),

    #[error("Unknown timezone: {0}")]
    UnknownTimezone(String),

    #[error("Invalid ramp schedule: {0}")]
    InvalidSchedule(String),

    #[error("Send counter unavailable: {0}")]
    Counter(#[from] DatabaseError),
}

/// Delivery hand-off errors.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Delivery channel closed")]
    ChannelClosed,

    #[error("Delivery rejected: {0}")]
    Rejected(String),
}

/// Errors from resolving and executing a sequence step.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("Sequence error: {0}")]
    Sequence(#[from] SequenceError),

    #[error("Step {id} is a delay step and has no content to send")]
    NotSendable { id: String },

    #[error("Lead {lead_id} has no email address")]
    MissingRecipient { lead_id: String },

    #[error("Generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("Warmup gate failed: {0}")]
    Warmup(#[from] WarmupError),

    #[error("Delivery failed: {0}")]
    Delivery(#[from] DeliveryError),

    #[error("Log persistence failed: {0}")]
    Database(#[from] DatabaseError),
}

/// Malformed collaborator records rejected at the system boundary.
#[derive(Debug, thiserror::Error)]
pub enum SchemaError {
    #[error("Invalid {record}: {reason}")]
    Invalid { record: String, reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn reserve(limit: u32) -> Result<u32> {
        if limit == 0 {
            Err(WarmupError::InvalidSettings("zero limit".into()))?;
        }
        Ok(limit)
    }

    #[test]
    fn component_errors_lift_into_engine_error() {
        let err = reserve(0).unwrap_err();
        assert!(matches!(err, Error::Warmup(_)));
        assert_eq!(err.to_string(), "Warmup error: Invalid warmup settings: zero limit");
        assert_eq!(reserve(3).unwrap(), 3);
    }

    #[test]
    fn timeouts_and_cancellation_share_a_kind() {
        let timeout = LlmError::Timeout {
            provider: "openai".into(),
            after: Duration::from_secs(60),
        };
        let cancelled = LlmError::Cancelled {
            provider: "openai".into(),
        };
        assert_eq!(timeout.kind(), LlmErrorKind::Timeout);
        assert_eq!(cancelled.kind(), timeout.kind());
        assert!(timeout.is_transient());
    }

    #[test]
    fn configuration_errors_are_not_transient() {
        let err = LlmError::NotConfigured {
            provider: "anthropic".into(),
            hint: "set ANTHROPIC_API_KEY on the server".into(),
        };
        assert!(!err.is_transient());
        let lifted: Error = err.into();
        assert!(lifted.to_string().starts_with("LLM error: Provider anthropic"));
    }
}
