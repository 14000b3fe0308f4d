//! Environment-driven client configuration.
//!
//! Every binary reads its settings through a `from_lookup` function so tests
//! can feed a map instead of the process environment.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::ai::{GeminiConfig, DEFAULT_GEMINI_MODEL};
use crate::collab::SessionConfig;
use crate::models::LocalUser;
use crate::realtime::RealtimeConfig;
use crate::store::SupabaseStoreConfig;
use crate::util::is_http_url;

pub const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 2_000;
pub const SAVE_DEBOUNCE_RANGE_MS: RangeInclusive<u64> = 100..=60_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub supabase_access_token: Option<String>,
    pub user_id: Option<String>,
    pub user_email: Option<String>,
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub save_debounce: Duration,
    pub flush_on_close: bool,
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ClientConfig")
            .field("supabase_url", &self.supabase_url)
            .field("supabase_anon_key", &self.supabase_anon_key)
            .field(
                "supabase_access_token",
                &self.supabase_access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("user_id", &self.user_id)
            .field("user_email", &self.user_email)
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("gemini_model", &self.gemini_model)
            .field("save_debounce", &self.save_debounce)
            .field("flush_on_close", &self.flush_on_close)
            .finish()
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let supabase_url =
            optional_trimmed(&lookup, "SUPABASE_URL").map(|url| url.trim_end_matches('/').to_string());
        if let Some(url) = supabase_url.as_deref() {
            if !is_http_url(url) {
                return Err(ConfigError::Invalid(
                    "SUPABASE_URL must start with http:// or https://".to_string(),
                ));
            }
        }

        let save_debounce_ms = parse_in_range(
            &lookup,
            "QUILL_SAVE_DEBOUNCE_MS",
            DEFAULT_SAVE_DEBOUNCE_MS,
            SAVE_DEBOUNCE_RANGE_MS,
        )?;

        Ok(Self {
            supabase_url,
            supabase_anon_key: optional_trimmed(&lookup, "SUPABASE_ANON_KEY"),
            supabase_access_token: optional_trimmed(&lookup, "SUPABASE_ACCESS_TOKEN"),
            user_id: optional_trimmed(&lookup, "QUILL_USER_ID"),
            user_email: optional_trimmed(&lookup, "QUILL_USER_EMAIL"),
            gemini_api_key: optional_trimmed(&lookup, "GEMINI_API_KEY"),
            gemini_model: value_or_default(&lookup, "GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
            save_debounce: Duration::from_millis(save_debounce_ms),
            flush_on_close: parse_flag(&lookup, "QUILL_FLUSH_ON_CLOSE", false)?,
        })
    }

    /// Settings for the hosted note table.
    pub fn store_config(&self) -> Result<SupabaseStoreConfig, ConfigError> {
        Ok(SupabaseStoreConfig {
            url: self.require_supabase_url()?,
            anon_key: self.require_anon_key()?,
            access_token: self.supabase_access_token.clone(),
        })
    }

    pub fn realtime_config(&self) -> Result<RealtimeConfig, ConfigError> {
        let mut config = RealtimeConfig::new(self.require_supabase_url()?, self.require_anon_key()?);
        config.access_token.clone_from(&self.supabase_access_token);
        Ok(config)
    }

    pub fn gemini_config(&self) -> Result<GeminiConfig, ConfigError> {
        let api_key = self
            .gemini_api_key
            .clone()
            .ok_or(ConfigError::MissingVar("GEMINI_API_KEY"))?;
        let mut config = GeminiConfig::new(api_key);
        config.model.clone_from(&self.gemini_model);
        Ok(config)
    }

    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            quiet_period: self.save_debounce,
            flush_on_close: self.flush_on_close,
        }
    }

    /// The editing user; a random id stands in when none is configured.
    #[must_use]
    pub fn local_user(&self) -> LocalUser {
        let id = self
            .user_id
            .clone()
            .unwrap_or_else(|| format!("guest-{}", Uuid::new_v4()));
        LocalUser::from_email(id, self.user_email.as_deref())
    }

    fn require_supabase_url(&self) -> Result<String, ConfigError> {
        self.supabase_url
            .clone()
            .ok_or(ConfigError::MissingVar("SUPABASE_URL"))
    }

    fn require_anon_key(&self) -> Result<String, ConfigError> {
        self.supabase_anon_key
            .clone()
            .ok_or(ConfigError::MissingVar("SUPABASE_ANON_KEY"))
    }
}

pub fn value_or_default(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

pub fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

pub fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Parse an integer variable, falling back to `default` and enforcing `range`.
pub fn parse_in_range<T>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + fmt::Display + Copy,
{
    let invalid = || {
        ConfigError::Invalid(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    };
    let value = match optional_trimmed(&lookup, name) {
        Some(raw) => raw.parse::<T>().map_err(|_| invalid())?,
        None => default,
    };
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(invalid())
    }
}

pub fn parse_flag(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid(format!("{name} must be true or false"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<ClientConfig, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        ClientConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.save_debounce, Duration::from_millis(2_000));
        assert!(!config.flush_on_close);
        assert_eq!(config.gemini_model, "gemini-1.5-flash");
        assert!(matches!(
            config.store_config(),
            Err(ConfigError::MissingVar("SUPABASE_URL"))
        ));
        assert!(matches!(
            config.gemini_config(),
            Err(ConfigError::MissingVar("GEMINI_API_KEY"))
        ));
    }

    #[test]
    fn debounce_must_be_in_range() {
        assert!(config_from(&[("QUILL_SAVE_DEBOUNCE_MS", "50")]).is_err());
        assert!(config_from(&[("QUILL_SAVE_DEBOUNCE_MS", "soon")]).is_err());
        let config = config_from(&[("QUILL_SAVE_DEBOUNCE_MS", " 500 ")]).unwrap();
        assert_eq!(config.session_config().quiet_period, Duration::from_millis(500));
    }

    #[test]
    fn flush_flag_accepts_common_spellings() {
        assert!(config_from(&[("QUILL_FLUSH_ON_CLOSE", "YES")]).unwrap().flush_on_close);
        assert!(!config_from(&[("QUILL_FLUSH_ON_CLOSE", "0")]).unwrap().flush_on_close);
        assert!(config_from(&[("QUILL_FLUSH_ON_CLOSE", "maybe")]).is_err());
    }

    #[test]
    fn supabase_url_must_be_http() {
        assert!(config_from(&[("SUPABASE_URL", "project.supabase.co")]).is_err());
        let config = config_from(&[
            ("SUPABASE_URL", "https://project.supabase.co/"),
            ("SUPABASE_ANON_KEY", "anon"),
        ])
        .unwrap();
        assert_eq!(config.store_config().unwrap().url, "https://project.supabase.co");
        assert_eq!(config.realtime_config().unwrap().anon_key, "anon");
    }

    #[test]
    fn local_user_uses_email_prefix() {
        let config = config_from(&[
            ("QUILL_USER_ID", "user-1"),
            ("QUILL_USER_EMAIL", "ada@example.com"),
        ])
        .unwrap();
        let user = config.local_user();
        assert_eq!(user.id.as_str(), "user-1");
        assert_eq!(user.display_name, "ada");

        let guest = config_from(&[]).unwrap().local_user();
        assert!(guest.id.as_str().starts_with("guest-"));
        assert_eq!(guest.display_name, "Anonymous");
    }

    #[test]
    fn debug_redacts_secrets() {
        let config = config_from(&[
            ("SUPABASE_ACCESS_TOKEN", "sensitive-jwt"),
            ("GEMINI_API_KEY", "sensitive-gemini"),
        ])
        .unwrap();
        let debug = format!("{config:?}");
        assert!(!debug.contains("sensitive-jwt"));
        assert!(!debug.contains("sensitive-gemini"));
        assert!(debug.contains("[REDACTED]"));
    }
}
