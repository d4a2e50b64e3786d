//! The closed classification-method enumeration (spec §3).

use serde::{Deserialize, Serialize};

/// Provenance tag recording which layer of the cascade produced a
/// `Classification`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Method {
    RuleBased,
    Phonetic,
    Learned,
    Llm,
    Cache,
    CompoundPattern,
}

impl Method {
    /// The confidence range this method's `Classification`s must fall
    /// within (spec §3 Confidence invariant). `Llm` and `Cache` carry the
    /// upstream LLM confidence, so their lower bound is 0.0 to permit the
    /// `llm_unavailable` terminal outcome (confidence 0.0, method `llm`).
    pub fn confidence_range(&self) -> (f64, f64) {
        match self {
            Method::RuleBased => (0.8, 1.0),
            Method::Phonetic => (0.5, 0.95),
            Method::Learned => (0.6, 0.95),
            Method::Llm => (0.0, 0.99),
            Method::Cache => (0.0, 0.99),
            Method::CompoundPattern => (0.6, 0.95),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::RuleBased => "rule_based",
            Method::Phonetic => "phonetic",
            Method::Learned => "learned",
            Method::Llm => "llm",
            Method::Cache => "cache",
            Method::CompoundPattern => "compound_pattern",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rule_based" => Some(Method::RuleBased),
            "phonetic" => Some(Method::Phonetic),
            "learned" => Some(Method::Learned),
            "llm" => Some(Method::Llm),
            "cache" => Some(Method::Cache),
            "compound_pattern" => Some(Method::CompoundPattern),
            _ => None,
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
