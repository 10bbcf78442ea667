//! Environment-driven configuration
//!
//! Binaries call `dotenv::dotenv().ok()` first, then [`PipelineConfig::from_env`].

use crate::collaborators::groq::DEFAULT_GROQ_MODEL;
use crate::error::{PipelineError, Result};
use crate::models::AdviceFormat;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LlmProvider {
    #[default]
    Groq,
    Gemini,
}

/// Knobs the pipeline itself consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub news_lookback_days: u32,
    pub news_limit: usize,
    pub collaborator_timeout: Duration,
    pub advice_format: AdviceFormat,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            news_lookback_days: 7,
            news_limit: 5,
            collaborator_timeout: Duration::from_secs(30),
            advice_format: AdviceFormat::Narrative,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub provider: LlmProvider,
    pub groq_api_key: Option<String>,
    pub groq_model: String,
    pub gemini_api_key: Option<String>,
    pub finnhub_api_key: Option<String>,
    pub settings: PipelineSettings,
    pub port: u16,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Groq,
            groq_api_key: None,
            groq_model: DEFAULT_GROQ_MODEL.to_string(),
            gemini_api_key: None,
            finnhub_api_key: None,
            settings: PipelineSettings::default(),
            port: 8080,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        let provider = match get("LLM_PROVIDER").map(|v| v.to_ascii_lowercase()).as_deref() {
            None | Some("groq") => LlmProvider::Groq,
            Some("gemini") => LlmProvider::Gemini,
            Some(other) => {
                return Err(PipelineError::Config(format!(
                    "LLM_PROVIDER must be 'groq' or 'gemini', got '{}'",
                    other
                )))
            }
        };

        let advice_format = match get("ADVICE_FORMAT") {
            None => defaults.settings.advice_format,
            Some(raw) => AdviceFormat::parse(&raw).ok_or_else(|| {
                PipelineError::Config(format!(
                    "ADVICE_FORMAT must be 'narrative' or 'forecast', got '{}'",
                    raw
                ))
            })?,
        };

        let settings = PipelineSettings {
            news_lookback_days: parse_or(get("NEWS_LOOKBACK_DAYS"), "NEWS_LOOKBACK_DAYS", defaults.settings.news_lookback_days)?,
            news_limit: parse_or(get("NEWS_LIMIT"), "NEWS_LIMIT", defaults.settings.news_limit)?,
            collaborator_timeout: Duration::from_secs(parse_or(
                get("COLLABORATOR_TIMEOUT_SECS"),
                "COLLABORATOR_TIMEOUT_SECS",
                defaults.settings.collaborator_timeout.as_secs(),
            )?),
            advice_format,
        };

        if settings.collaborator_timeout.is_zero() {
            return Err(PipelineError::Config(
                "COLLABORATOR_TIMEOUT_SECS must be greater than zero".to_string(),
            ));
        }

        let port = parse_or(get("PORT").or_else(|| get("API_PORT")), "PORT", defaults.port)?;

        Ok(Self {
            provider,
            groq_api_key: get("GROQ_API_KEY"),
            groq_model: get("GROQ_MODEL").unwrap_or(defaults.groq_model),
            gemini_api_key: get("GEMINI_API_KEY"),
            finnhub_api_key: get("FINNHUB_API"),
            settings,
            port,
        })
    }

    /// True when the selected provider and Finnhub both have keys.
    pub fn has_credentials(&self) -> bool {
        let model_key = match self.provider {
            LlmProvider::Groq => self.groq_api_key.is_some(),
            LlmProvider::Gemini => self.gemini_api_key.is_some(),
        };
        model_key && self.finnhub_api_key.is_some()
    }
}

fn parse_or<T: std::str::FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .parse()
            .map_err(|_| PipelineError::Config(format!("{} has an invalid value '{}'", key, value))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<PipelineConfig> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PipelineConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.settings.news_lookback_days, 7);
        assert_eq!(config.settings.news_limit, 5);
        assert!(!config.has_credentials());
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("LLM_PROVIDER", "Gemini"),
            ("GEMINI_API_KEY", "g-key"),
            ("FINNHUB_API", "f-key"),
            ("NEWS_LIMIT", "3"),
            ("COLLABORATOR_TIMEOUT_SECS", "5"),
            ("ADVICE_FORMAT", "forecast"),
            ("API_PORT", "9090"),
        ])
        .unwrap();

        assert_eq!(config.provider, LlmProvider::Gemini);
        assert_eq!(config.settings.news_limit, 3);
        assert_eq!(config.settings.collaborator_timeout, Duration::from_secs(5));
        assert_eq!(config.settings.advice_format, AdviceFormat::Forecast);
        assert_eq!(config.port, 9090);
        assert!(config.has_credentials());
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            config_from(&[("NEWS_LIMIT", "many")]),
            Err(PipelineError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("LLM_PROVIDER", "openai")]),
            Err(PipelineError::Config(_))
        ));
        assert!(matches!(
            config_from(&[("COLLABORATOR_TIMEOUT_SECS", "0")]),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_blank_keys_are_unset() {
        let config = config_from(&[("GROQ_API_KEY", "  ")]).unwrap();
        assert_eq!(config.groq_api_key, None);
    }
}
