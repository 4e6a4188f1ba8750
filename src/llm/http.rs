//! Shared HTTP plumbing: client construction and upstream status classification.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::warn;

use crate::error::LlmError;

/// Max characters of an upstream error body kept in error messages.
const ERROR_BODY_LIMIT: usize = 500;

/// Build the HTTP client shared by all backends.
pub fn build_client(timeout: Duration) -> Result<reqwest::Client, LlmError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LlmError::RequestFailed {
            provider: "http".to_string(),
            status: None,
            reason: format!("Failed to build HTTP client: {e}"),
        })
}

/// Pass successful responses through; turn failures into typed errors.
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.text().await.unwrap_or_default();

    let err = classify_status(provider, status, retry_after.as_deref(), &body);
    warn!(provider, status = status.as_u16(), error = %err, "Upstream call failed");
    Err(err)
}

/// Map an upstream failure status to the error taxonomy.
///
/// 429 → rate limit, 402 or a credit/quota body → quota, everything else → request failed.
pub fn classify_status(
    provider: &str,
    status: StatusCode,
    retry_after: Option<&str>,
    body: &str,
) -> LlmError {
    let reason = truncate(body.trim(), ERROR_BODY_LIMIT);

    if status == StatusCode::TOO_MANY_REQUESTS {
        // OpenAI reports exhausted credit as a 429 with this code.
        if body.contains("insufficient_quota") {
            return LlmError::QuotaExceeded {
                provider: provider.to_string(),
                reason,
            };
        }
        return LlmError::RateLimited {
            provider: provider.to_string(),
            retry_after: retry_after
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs),
        };
    }

    let lower = body.to_lowercase();
    if status == StatusCode::PAYMENT_REQUIRED
        || lower.contains("insufficient_quota")
        || lower.contains("credit balance")
    {
        return LlmError::QuotaExceeded {
            provider: provider.to_string(),
            reason,
        };
    }

    LlmError::RequestFailed {
        provider: provider.to_string(),
        status: Some(status.as_u16()),
        reason,
    }
}

/// Map a transport-level reqwest failure.
pub(crate) fn transport_error(provider: &str, err: reqwest::Error) -> LlmError {
    LlmError::RequestFailed {
        provider: provider.to_string(),
        status: err.status().map(|s| s.as_u16()),
        reason: err.to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}...", &s[..end])
    }
}
