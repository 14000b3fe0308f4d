use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use quill_core::ai::{GeminiConfig, DEFAULT_GEMINI_MODEL};
use quill_core::config::{
    optional_trimmed, parse_flag, parse_in_range, value_or_default, ConfigError,
};

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub rate_limit_window: Duration,
    pub ai_rate_limit_per_window: u32,
    /// Key rate limits on `X-Forwarded-For`; only safe behind a proxy that sets it
    pub trust_forwarded_for: bool,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("gemini_model", &self.gemini_model)
            .field("rate_limit_window", &self.rate_limit_window)
            .field("ai_rate_limit_per_window", &self.ai_rate_limit_per_window)
            .field("trust_forwarded_for", &self.trust_forwarded_for)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "QUILL_API_BIND_ADDR", "127.0.0.1:8080");
        let rate_limit_window_secs =
            parse_in_range(&lookup, "AI_RATE_LIMIT_WINDOW_SECS", 60_u64, 10..=3_600)?;
        let ai_rate_limit_per_window =
            parse_in_range(&lookup, "AI_RATE_LIMIT_PER_WINDOW", 30_u32, 1..=5_000)?;

        Ok(Self {
            bind_addr,
            gemini_api_key: optional_trimmed(&lookup, "GEMINI_API_KEY"),
            gemini_model: value_or_default(&lookup, "GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
            rate_limit_window: Duration::from_secs(rate_limit_window_secs),
            ai_rate_limit_per_window,
            trust_forwarded_for: parse_flag(&lookup, "QUILL_API_TRUST_FORWARDED_FOR", false)?,
        })
    }

    /// Gemini settings, or `None` when the AI endpoints are disabled.
    pub fn gemini_config(&self) -> Option<GeminiConfig> {
        self.gemini_api_key.as_ref().map(|key| {
            let mut config = GeminiConfig::new(key.clone());
            config.model.clone_from(&self.gemini_model);
            config
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn config_defaults_without_gemini_key() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.rate_limit_window, Duration::from_secs(60));
        assert_eq!(config.ai_rate_limit_per_window, 30);
        assert!(config.gemini_config().is_none());
        assert!(!config.trust_forwarded_for);
    }

    #[test]
    fn forwarded_for_trust_is_opt_in() {
        let config = config_from(&[("QUILL_API_TRUST_FORWARDED_FOR", "true")]).unwrap();
        assert!(config.trust_forwarded_for);
        assert!(config_from(&[("QUILL_API_TRUST_FORWARDED_FOR", "maybe")]).is_err());
    }

    #[test]
    fn config_rejects_out_of_range_limits() {
        let err = config_from(&[("AI_RATE_LIMIT_PER_WINDOW", "0")]).unwrap_err();
        assert!(err.to_string().contains("AI_RATE_LIMIT_PER_WINDOW"));
        assert!(config_from(&[("AI_RATE_LIMIT_WINDOW_SECS", "5")]).is_err());
    }

    #[test]
    fn config_redacts_sensitive_debug_fields() {
        let config = config_from(&[
            ("GEMINI_API_KEY", "sensitive-gemini-key"),
            ("GEMINI_MODEL", "gemini-1.5-pro"),
        ])
        .unwrap();

        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("sensitive-gemini-key"));
        assert!(debug_output.contains("[REDACTED]"));
        assert_eq!(config.gemini_config().unwrap().model, "gemini-1.5-pro");
    }
}
