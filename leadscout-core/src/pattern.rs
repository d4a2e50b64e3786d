//! `LearnedPattern` (spec §3).

use serde::{Deserialize, Serialize};

use crate::ethnicity::Ethnicity;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternType {
    Prefix2,
    Prefix3,
    Suffix2,
    Suffix3,
    PhoneticFamily,
    LinguisticMarker,
    CompoundSurname,
    /// Address-conditioned pattern (spec §9 Open Questions; SPEC_FULL §B.3).
    /// Never produced or consulted unless `Config::enable_spatial_patterns`
    /// is set.
    SpatialMarker,
}

impl PatternType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PatternType::Prefix2 => "prefix2",
            PatternType::Prefix3 => "prefix3",
            PatternType::Suffix2 => "suffix2",
            PatternType::Suffix3 => "suffix3",
            PatternType::PhoneticFamily => "phonetic_family",
            PatternType::LinguisticMarker => "linguistic_marker",
            PatternType::CompoundSurname => "compound_surname",
            PatternType::SpatialMarker => "spatial_marker",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "prefix2" => Some(PatternType::Prefix2),
            "prefix3" => Some(PatternType::Prefix3),
            "suffix2" => Some(PatternType::Suffix2),
            "suffix3" => Some(PatternType::Suffix3),
            "phonetic_family" => Some(PatternType::PhoneticFamily),
            "linguistic_marker" => Some(PatternType::LinguisticMarker),
            "compound_surname" => Some(PatternType::CompoundSurname),
            "spatial_marker" => Some(PatternType::SpatialMarker),
            _ => None,
        }
    }
}

/// Minimum applications before a pattern becomes eligible for automatic
/// deactivation (spec §3; overridable via `Config::min_applications_for_deactivation`).
pub const DEFAULT_MIN_APPLICATIONS_FOR_DEACTIVATION: u64 = 20;
/// Success-rate floor below which an eligible pattern is deactivated.
pub const DEFAULT_DEACTIVATION_THRESHOLD: f64 = 0.5;

/// A durable, reusable rule derived from one or more verified
/// classifications (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnedPattern {
    pub id: String,
    pub pattern_type: PatternType,
    pub pattern_value: String,
    pub target_ethnicity: Ethnicity,
    pub confidence: f64,
    pub evidence_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub active: bool,
}

impl LearnedPattern {
    pub fn applications_count(&self) -> u64 {
        self.success_count + self.failure_count
    }

    pub fn success_rate(&self) -> f64 {
        self.success_count as f64 / self.applications_count().max(1) as f64
    }

    /// `confidence * success_rate`, the score `lookup_patterns` ranks by
    /// (spec §4.4).
    pub fn lookup_score(&self) -> f64 {
        self.confidence * self.success_rate()
    }

    /// Apply the deactivation policy (spec §3): a pattern with
    /// `success_rate < threshold` and `applications_count >=
    /// min_applications` is automatically deactivated. Returns whether the
    /// pattern was (newly) deactivated.
    pub fn apply_deactivation_policy(&mut self, threshold: f64, min_applications: u64) -> bool {
        if self.active
            && self.applications_count() >= min_applications
            && self.success_rate() < threshold
        {
            self.active = false;
            true
        } else {
            false
        }
    }

    /// Recompute confidence from evidence count using the monotonic,
    /// capped update rule fixed in spec §4.4/§9: `min(0.95, base +
    /// k*ln(evidence_count+1))`. The constants `base`/`k` are fixed here
    /// (spec §9 Open Questions: exact constants are an empirical tuning
    /// decision deferred to a labeled validation set — see DESIGN.md).
    pub fn confidence_from_evidence(base: f64, evidence_count: u64) -> f64 {
        const K: f64 = 0.08;
        (base + K * ((evidence_count as f64) + 1.0).ln()).min(0.95)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(success: u64, failure: u64) -> LearnedPattern {
        LearnedPattern {
            id: "p1".into(),
            pattern_type: PatternType::Prefix2,
            pattern_value: "xi".into(),
            target_ethnicity: Ethnicity::African,
            confidence: 0.8,
            evidence_count: success + failure,
            success_count: success,
            failure_count: failure,
            active: true,
        }
    }

    #[test]
    fn deactivates_below_threshold_with_enough_applications() {
        let mut p = pattern(5, 16); // success_rate = 5/21 < 0.5, applications = 21 >= 20
        assert!(p.apply_deactivation_policy(0.5, 20));
        assert!(!p.active);
    }

    #[test]
    fn does_not_deactivate_with_too_few_applications() {
        let mut p = pattern(1, 3); // low success rate but only 4 applications
        assert!(!p.apply_deactivation_policy(0.5, 20));
        assert!(p.active);
    }

    #[test]
    fn confidence_update_is_capped() {
        let c = LearnedPattern::confidence_from_evidence(0.7, 1_000_000);
        assert!(c <= 0.95);
    }
}
