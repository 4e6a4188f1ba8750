//! Configuration types.
//!
//! Everything is read once from the environment at startup and then passed
//! explicitly; nothing below consults the environment at call time.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmSettings};
use crate::outreach::{GenerationOptions, GeneratorConfig};

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Provider configs and server-side credentials.
    pub llm: LlmSettings,
    /// Provider used when a caller does not pick one.
    pub default_provider: LlmBackend,
    /// Model override applied to every call, if set.
    pub model: Option<String>,
    pub temperature: f32,
    /// Minimum spacing between provider calls in a batch.
    pub batch_delay: Duration,
    /// Deadline for a single provider call.
    pub call_timeout: Duration,
    pub db_path: PathBuf,
    /// Sending account whose warmup counters gate step execution.
    pub account_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            llm: LlmSettings::default(),
            default_provider: LlmBackend::Gateway,
            model: None,
            temperature: 0.7,
            batch_delay: Duration::from_millis(1000),
            call_timeout: Duration::from_secs(60),
            db_path: PathBuf::from("./data/outreach.db"),
            account_id: "default".to_string(),
        }
    }
}

impl EngineConfig {
    /// Build config from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from any key lookup. `from_env` uses the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let default_provider = match var("OUTREACH_PROVIDER") {
            Some(raw) => raw.parse::<LlmBackend>().map_err(|_| ConfigError::InvalidValue {
                key: "OUTREACH_PROVIDER".into(),
                message: format!("'{raw}' is not one of openai, anthropic, gateway"),
            })?,
            None => defaults.default_provider,
        };

        let temperature = match var("OUTREACH_TEMPERATURE") {
            Some(raw) => {
                let t: f32 = raw.parse().map_err(|_| ConfigError::InvalidValue {
                    key: "OUTREACH_TEMPERATURE".into(),
                    message: format!("'{raw}' is not a number"),
                })?;
                if !(0.0..=2.0).contains(&t) {
                    return Err(ConfigError::InvalidValue {
                        key: "OUTREACH_TEMPERATURE".into(),
                        message: format!("{t} is outside 0.0-2.0"),
                    });
                }
                t
            }
            None => defaults.temperature,
        };

        let batch_delay = var("OUTREACH_BATCH_DELAY_MS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.batch_delay);

        let call_timeout = var("OUTREACH_CALL_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .filter(|secs: &u64| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(defaults.call_timeout);

        let db_path = var("OUTREACH_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let mut llm = LlmSettings {
            openai_api_key: var("OPENAI_API_KEY").map(SecretString::from),
            anthropic_api_key: var("ANTHROPIC_API_KEY").map(SecretString::from),
            gateway_token: var("OUTREACH_GATEWAY_TOKEN").map(SecretString::from),
            request_timeout: call_timeout,
            ..LlmSettings::default()
        };
        if let Some(url) = var("OUTREACH_GATEWAY_URL") {
            llm.gateway = llm.gateway.with_base_url(url.trim_end_matches('/'));
        }

        Ok(Self {
            llm,
            default_provider,
            model: var("OUTREACH_MODEL"),
            temperature,
            batch_delay,
            call_timeout,
            db_path,
            account_id: var("OUTREACH_ACCOUNT_ID").unwrap_or(defaults.account_id),
        })
    }

    /// Fail fast when the default provider has no server-side credential.
    ///
    /// The gateway is exempt: callers may bring their own token.
    pub fn require_default_credential(&self) -> Result<(), ConfigError> {
        let (key, present) = match self.default_provider {
            LlmBackend::OpenAi => ("OPENAI_API_KEY", self.llm.openai_api_key.is_some()),
            LlmBackend::Anthropic => ("ANTHROPIC_API_KEY", self.llm.anthropic_api_key.is_some()),
            LlmBackend::Gateway => return Ok(()),
        };
        if present {
            Ok(())
        } else {
            Err(ConfigError::MissingRequired {
                key: key.into(),
                hint: format!("Set {key} or choose another OUTREACH_PROVIDER."),
            })
        }
    }

    /// Generation options for the default provider.
    pub fn generation_options(&self) -> GenerationOptions {
        GenerationOptions {
            provider: self.default_provider,
            temperature: self.temperature,
            model: self.model.clone(),
            timeout: Some(self.call_timeout),
            ..Default::default()
        }
    }

    pub fn generator_config(&self) -> GeneratorConfig {
        GeneratorConfig {
            call_timeout: self.call_timeout,
            batch_interval: self.batch_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<EngineConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        EngineConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.default_provider, LlmBackend::Gateway);
        assert_eq!(config.batch_delay, Duration::from_millis(1000));
        assert_eq!(config.call_timeout, Duration::from_secs(60));
        assert!(config.model.is_none());
        assert!(config.llm.openai_api_key.is_none());
    }

    #[test]
    fn reads_provider_and_keys() {
        let config = config_from(&[
            ("OUTREACH_PROVIDER", "anthropic"),
            ("ANTHROPIC_API_KEY", "sk-ant-test"),
            ("OUTREACH_MODEL", "claude-3-5-sonnet-latest"),
            ("OUTREACH_BATCH_DELAY_MS", "250"),
        ])
        .unwrap();
        assert_eq!(config.default_provider, LlmBackend::Anthropic);
        assert_eq!(
            config.llm.anthropic_api_key.as_ref().unwrap().expose_secret(),
            "sk-ant-test"
        );
        assert_eq!(config.batch_delay, Duration::from_millis(250));
        assert_eq!(
            config.generation_options().model.as_deref(),
            Some("claude-3-5-sonnet-latest")
        );
        config.require_default_credential().unwrap();
    }

    #[test]
    fn unknown_provider_is_invalid() {
        let err = config_from(&[("OUTREACH_PROVIDER", "bard")]).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn out_of_range_temperature_is_invalid() {
        assert!(config_from(&[("OUTREACH_TEMPERATURE", "3.5")]).is_err());
        assert!(config_from(&[("OUTREACH_TEMPERATURE", "warm")]).is_err());
        let config = config_from(&[("OUTREACH_TEMPERATURE", "0.2")]).unwrap();
        assert_eq!(config.generation_options().temperature, 0.2);
    }

    #[test]
    fn missing_direct_key_fails_fast() {
        let config = config_from(&[("OUTREACH_PROVIDER", "openai")]).unwrap();
        let err = config.require_default_credential().unwrap_err();
        assert!(err.to_string().contains("OPENAI_API_KEY"));
    }

    #[test]
    fn gateway_needs_no_server_token() {
        let config = config_from(&[]).unwrap();
        config.require_default_credential().unwrap();
    }

    #[test]
    fn gateway_url_override_drops_trailing_slash() {
        let config = config_from(&[("OUTREACH_GATEWAY_URL", "http://localhost:9000/v1/")]).unwrap();
        assert_eq!(config.llm.gateway.base_url, "http://localhost:9000/v1");
    }

    #[test]
    fn unparseable_numbers_fall_back() {
        let config = config_from(&[
            ("OUTREACH_BATCH_DELAY_MS", "soon"),
            ("OUTREACH_CALL_TIMEOUT_SECS", "0"),
        ])
        .unwrap();
        assert_eq!(config.batch_delay, Duration::from_millis(1000));
        assert_eq!(config.call_timeout, Duration::from_secs(60));
    }
}
