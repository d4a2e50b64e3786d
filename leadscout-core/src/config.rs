//! Immutable process-wide configuration (spec §6, §9).
//!
//! `Config` is loaded once at startup and passed by value/`Arc` into every
//! component constructor, following the teacher's `ClientConfig` builder
//! convention. No component reads environment variables directly.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Ordered provider priority list (spec §6 `llm_providers`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Anthropic,
    OpenAi,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmProvider::Anthropic => "anthropic",
            LlmProvider::OpenAi => "openai",
        }
    }
}

/// Process-wide configuration, recognized options as enumerated in spec §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub batch_size: usize,
    pub max_concurrent_leads: usize,
    pub llm_enabled: bool,
    pub llm_providers: Vec<LlmProvider>,
    pub llm_per_provider_rpm: HashMap<String, u32>,
    /// Per-provider in-flight request cap (spec §4.6 `max_concurrent`).
    pub llm_per_provider_max_concurrent: HashMap<String, usize>,
    pub llm_request_timeout_s: u64,
    pub retry_max_attempts: u32,
    pub pattern_deactivation_threshold: f64,
    pub min_applications_for_deactivation: u64,
    pub lock_ttl_s: u64,
    pub force_clear_stale_locks: bool,
    /// SPEC_FULL §B.3: disabled by default; gates the optional
    /// address-conditioned `spatial_marker` pattern type.
    pub enable_spatial_patterns: bool,
}

impl Default for Config {
    fn default() -> Self {
        let mut rpm = HashMap::new();
        rpm.insert("anthropic".to_string(), 60);
        rpm.insert("openai".to_string(), 60);

        let mut max_concurrent = HashMap::new();
        max_concurrent.insert("anthropic".to_string(), 5);
        max_concurrent.insert("openai".to_string(), 5);

        Self {
            batch_size: 100,
            max_concurrent_leads: 10,
            llm_enabled: false,
            llm_providers: vec![LlmProvider::Anthropic],
            llm_per_provider_rpm: rpm,
            llm_per_provider_max_concurrent: max_concurrent,
            llm_request_timeout_s: 30,
            retry_max_attempts: 6,
            pattern_deactivation_threshold: 0.5,
            min_applications_for_deactivation: 20,
            lock_ttl_s: 900,
            force_clear_stale_locks: false,
            enable_spatial_patterns: false,
        }
    }
}

impl Config {
    /// Load configuration from environment variables (optionally after
    /// loading a `.env` file), overriding defaults where present.
    /// `llm_enabled` defaults to `true` only if a provider credential
    /// environment variable is present (spec §6).
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        let mut config = Self::default();

        if let Ok(v) = std::env::var("LEADSCOUT_BATCH_SIZE") {
            config.batch_size = v.parse().map_err(|_| Error::Config("invalid LEADSCOUT_BATCH_SIZE".into()))?;
        }
        if let Ok(v) = std::env::var("LEADSCOUT_MAX_CONCURRENT_LEADS") {
            config.max_concurrent_leads = v
                .parse()
                .map_err(|_| Error::Config("invalid LEADSCOUT_MAX_CONCURRENT_LEADS".into()))?;
        }
        if let Ok(v) = std::env::var("LEADSCOUT_REQUEST_TIMEOUT_S") {
            config.llm_request_timeout_s = v
                .parse()
                .map_err(|_| Error::Config("invalid LEADSCOUT_REQUEST_TIMEOUT_S".into()))?;
        }
        if let Ok(v) = std::env::var("LEADSCOUT_RETRY_MAX_ATTEMPTS") {
            config.retry_max_attempts = v
                .parse()
                .map_err(|_| Error::Config("invalid LEADSCOUT_RETRY_MAX_ATTEMPTS".into()))?;
        }
        if let Ok(v) = std::env::var("LEADSCOUT_LOCK_TTL_S") {
            config.lock_ttl_s = v.parse().map_err(|_| Error::Config("invalid LEADSCOUT_LOCK_TTL_S".into()))?;
        }
        if let Ok(v) = std::env::var("LEADSCOUT_FORCE_CLEAR_STALE_LOCKS") {
            config.force_clear_stale_locks = v == "1" || v.eq_ignore_ascii_case("true");
        }
        if let Ok(v) = std::env::var("LEADSCOUT_ENABLE_SPATIAL_PATTERNS") {
            config.enable_spatial_patterns = v == "1" || v.eq_ignore_ascii_case("true");
        }

        let has_anthropic_key = std::env::var("ANTHROPIC_API_KEY").is_ok();
        let has_openai_key = std::env::var("OPENAI_API_KEY").is_ok();
        config.llm_enabled = has_anthropic_key || has_openai_key;

        let mut providers = Vec::new();
        if has_anthropic_key {
            providers.push(LlmProvider::Anthropic);
        }
        if has_openai_key {
            providers.push(LlmProvider::OpenAi);
        }
        if !providers.is_empty() {
            config.llm_providers = providers;
        }

        Ok(config)
    }

    pub fn llm_request_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_request_timeout_s)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = Config::default();
        assert_eq!(c.batch_size, 100);
        assert_eq!(c.max_concurrent_leads, 10);
        assert_eq!(c.retry_max_attempts, 6);
        assert_eq!(c.lock_ttl_s, 900);
        assert!(!c.force_clear_stale_locks);
        assert!(!c.enable_spatial_patterns);
    }
}
