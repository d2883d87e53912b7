use std::time::Duration;

use anyhow::{Context, Result};

use crate::models::document::DraftId;
use crate::sync::{RetryPolicy, SyncConfig};
use crate::validation::ValidationMode;
use crate::wizard::session::SessionConfig;

/// Application configuration loaded from environment variables.
/// Fails at startup if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub draft_api_url: String,
    pub port: u16,
    pub rust_log: String,
    pub save_debounce: Duration,
    pub save_max_attempts: u32,
    pub save_backoff_base: Duration,
    pub request_timeout: Duration,
    pub validation_mode: ValidationMode,
    /// Continue editing this draft instead of starting a new one.
    pub resume_draft_id: Option<DraftId>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let draft_api_url = lookup("DRAFT_API_URL")
            .with_context(|| "Required environment variable 'DRAFT_API_URL' is not set")?;

        Ok(Config {
            draft_api_url,
            port: parse_or(&lookup, "PORT", 8080)?,
            rust_log: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            save_debounce: Duration::from_millis(parse_or(&lookup, "SAVE_DEBOUNCE_MS", 750)?),
            save_max_attempts: parse_or(&lookup, "SAVE_MAX_ATTEMPTS", 3)?,
            save_backoff_base: Duration::from_millis(parse_or(
                &lookup,
                "SAVE_BACKOFF_BASE_MS",
                500,
            )?),
            request_timeout: Duration::from_secs(parse_or(&lookup, "REQUEST_TIMEOUT_SECS", 10)?),
            validation_mode: lookup("VALIDATION_MODE")
                .map(|v| v.parse::<ValidationMode>())
                .transpose()
                .map_err(anyhow::Error::msg)
                .context("VALIDATION_MODE must be 'local' or 'remote'")?
                .unwrap_or(ValidationMode::Local),
            resume_draft_id: lookup("RESUME_DRAFT_ID")
                .filter(|id| !id.trim().is_empty())
                .map(DraftId),
        })
    }

    pub fn session(&self) -> SessionConfig {
        SessionConfig {
            mode: self.validation_mode,
            sync: SyncConfig {
                debounce: self.save_debounce,
                retry: RetryPolicy {
                    max_attempts: self.save_max_attempts,
                    backoff_base: self.save_backoff_base,
                    attempt_timeout: self.request_timeout,
                },
            },
            call_timeout: self.request_timeout,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{key} must be a valid number, got '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("DRAFT_API_URL", "http://drafts.local/api")]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.save_debounce, Duration::from_millis(750));
        assert_eq!(config.save_max_attempts, 3);
        assert_eq!(config.validation_mode, ValidationMode::Local);
        assert!(config.resume_draft_id.is_none());
    }

    #[test]
    fn test_missing_draft_api_url_fails() {
        assert!(load(&[]).is_err());
    }

    #[test]
    fn test_bad_values_fail() {
        assert!(load(&[("DRAFT_API_URL", "x"), ("PORT", "eighty")]).is_err());
        assert!(load(&[("DRAFT_API_URL", "x"), ("VALIDATION_MODE", "both")]).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("DRAFT_API_URL", "x"),
            ("VALIDATION_MODE", "remote"),
            ("RESUME_DRAFT_ID", "42"),
            ("SAVE_DEBOUNCE_MS", "300"),
        ])
        .unwrap();
        assert_eq!(config.validation_mode, ValidationMode::Remote);
        assert_eq!(config.resume_draft_id, Some(DraftId("42".to_string())));
        let session = config.session();
        assert_eq!(session.sync.debounce, Duration::from_millis(300));
        assert_eq!(session.sync.retry.attempt_timeout, Duration::from_secs(10));
    }
}
