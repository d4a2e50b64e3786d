//! LLM adapter request/response types (spec §4.5).

use leadscout_core::Ethnicity;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A bounded list of prior `(name, ethnicity)` exemplars retrieved from
/// the Learning Store and injected into the LLM request (spec §4.5).
pub type Exemplars = Vec<(String, Ethnicity)>;

/// Typed errors the LLM Adapter can raise (spec §4.5).
///
/// `SchemaViolation` and `ContentFiltered` are terminal for a name; the
/// rest are retriable subject to the Rate Limiter's policy (spec §7).
#[derive(Debug, Clone, Error)]
pub enum LLMError {
    #[error("authentication failed for provider {0}")]
    Auth(String),
    #[error("rate limited by provider {0}")]
    RateLimited(String),
    #[error("request to provider {0} timed out")]
    Timeout(String),
    #[error("response from provider {0} violated the output schema: {1}")]
    SchemaViolation(String, String),
    #[error("provider {0} unavailable")]
    ProviderUnavailable(String),
    #[error("content filtered by provider {0}")]
    ContentFiltered(String),
    #[error("unknown error from provider {0}: {1}")]
    Unknown(String, String),
}

impl LLMError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, LLMError::SchemaViolation(..) | LLMError::ContentFiltered(..) | LLMError::Auth(_))
    }

    pub fn provider(&self) -> &str {
        match self {
            LLMError::Auth(p)
            | LLMError::RateLimited(p)
            | LLMError::Timeout(p)
            | LLMError::SchemaViolation(p, _)
            | LLMError::ProviderUnavailable(p)
            | LLMError::ContentFiltered(p)
            | LLMError::Unknown(p, _) => p,
        }
    }
}

/// The strict output schema an LLM response must conform to. Any
/// provider response that doesn't parse into this shape is rejected as
/// `LLMError::SchemaViolation` (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMClassificationOutput {
    pub ethnicity: String,
    pub confidence: f64,
}

impl LLMClassificationOutput {
    pub fn parse_ethnicity(&self) -> Option<Ethnicity> {
        Ethnicity::parse(&self.ethnicity.to_lowercase())
    }
}
