//! `Classification`: the immutable result of classifying one name (spec §3).

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ethnicity::Ethnicity;
use crate::method::Method;

/// The immutable result of classifying a single name.
///
/// Constructed only through [`Classification::new`], which enforces the
/// per-method confidence invariant from spec §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classification {
    pub original_name: String,
    pub normalized_name: String,
    pub ethnicity: Ethnicity,
    pub confidence: f64,
    pub method: Method,
    pub processing_ms: u64,
    pub provider: Option<String>,
    pub cost: Option<f64>,
}

impl Classification {
    /// Construct a `Classification`, validating that `confidence` falls
    /// within the range `method` allows.
    pub fn new(
        original_name: impl Into<String>,
        normalized_name: impl Into<String>,
        ethnicity: Ethnicity,
        confidence: f64,
        method: Method,
        processing_ms: u64,
    ) -> Result<Self> {
        let (min, max) = method.confidence_range();
        if !(min..=max).contains(&confidence) {
            return Err(Error::ConfidenceOutOfRange {
                confidence,
                min,
                max,
                method,
            });
        }
        Ok(Self {
            original_name: original_name.into(),
            normalized_name: normalized_name.into(),
            ethnicity,
            confidence,
            method,
            processing_ms,
            provider: None,
            cost: None,
        })
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost = Some(cost);
        self
    }

    /// Build the single terminal `llm_unavailable` outcome (spec §4.6,
    /// §7): ethnicity `unknown`, confidence 0.0, method `llm`. This is the
    /// one case where `Method::Llm`'s confidence floor of 0.0 is used.
    pub fn llm_unavailable(original_name: impl Into<String>, normalized_name: impl Into<String>) -> Self {
        Self {
            original_name: original_name.into(),
            normalized_name: normalized_name.into(),
            ethnicity: Ethnicity::Unknown,
            confidence: 0.0,
            method: Method::Llm,
            processing_ms: 0,
            provider: None,
            cost: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_confidence_below_method_floor() {
        let result = Classification::new("Bongani", "bongani", Ethnicity::African, 0.4, Method::RuleBased, 1);
        assert!(matches!(result, Err(Error::ConfidenceOutOfRange { .. })));
    }

    #[test]
    fn accepts_confidence_within_range() {
        let c = Classification::new("Bongani", "bongani", Ethnicity::African, 0.9, Method::RuleBased, 1).unwrap();
        assert_eq!(c.confidence, 0.9);
    }

    #[test]
    fn llm_unavailable_is_always_valid() {
        let c = Classification::llm_unavailable("Xx", "xx");
        assert_eq!(c.confidence, 0.0);
        assert_eq!(c.method, Method::Llm);
        assert_eq!(c.ethnicity, Ethnicity::Unknown);
    }
}
