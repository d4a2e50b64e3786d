//! Phonetic Matcher: classify by proximity to known phonetic families
//! (spec §4.3), scored against families persisted in the Learning Store.

use std::sync::Arc;

use async_trait::async_trait;
use leadscout_core::{phonetic::PhoneticCode, Classification, Method};
use leadscout_learning::LearningStore;

use crate::layer::ClassifierLayer;

/// Confidence ceiling before the compound-key exact-match boost is
/// applied (spec §4.3).
const BASE_CONFIDENCE_CAP: f64 = 0.80;
/// Maximum boost granted when the candidate's family key matches a
/// stored family exactly, i.e. every algorithm present on both sides
/// agrees (spec §4.3).
const EXACT_MATCH_BOOST: f64 = 0.10;

pub struct PhoneticMatcher {
    learning: Arc<LearningStore>,
}

impl PhoneticMatcher {
    pub fn new(learning: Arc<LearningStore>) -> Self {
        Self { learning }
    }

    /// Scores every known family against `codes`, keeping only those
    /// with at least the required cross-algorithm agreement, then picks
    /// the best by `member_count * agreement_fraction`, tie-broken by
    /// larger `member_count` then lexicographic family key (spec §4.3).
    pub fn classify(&self, normalized_name: &str, codes: &PhoneticCode) -> Option<Classification> {
        if codes.is_empty() {
            return None;
        }

        let candidate_key = leadscout_phonetic::family_key(codes);
        let candidate_components: Vec<&str> = candidate_key.split('|').filter(|s| !s.is_empty()).collect();
        if candidate_components.is_empty() {
            return None;
        }

        let families = self.learning.all_phonetic_families();
        let mut best: Option<(f64, bool, &leadscout_core::PhoneticFamily)> = None;

        for family in &families {
            let stored_components: Vec<&str> = family.family_key.split('|').filter(|s| !s.is_empty()).collect();
            let agreement = candidate_components.iter().filter(|c| stored_components.contains(c)).count();
            if agreement < leadscout_phonetic::FAMILY_AGREEMENT_THRESHOLD {
                continue;
            }

            let exact_match = family.family_key == candidate_key;
            let agreement_fraction = agreement as f64 / candidate_components.len().max(stored_components.len()) as f64;
            let score = family.member_count as f64 * agreement_fraction;

            let better = match &best {
                None => true,
                Some((best_score, _, best_family)) => {
                    score > *best_score
                        || (score == *best_score && family.member_count > best_family.member_count)
                        || (score == *best_score
                            && family.member_count == best_family.member_count
                            && family.family_key < best_family.family_key)
                }
            };

            if better {
                best = Some((score, exact_match, family));
            }
        }

        let (_, exact_match, family) = best?;
        let boost = if exact_match { EXACT_MATCH_BOOST } else { 0.0 };
        let confidence = (family.confidence.min(BASE_CONFIDENCE_CAP) + boost).clamp(0.5, 0.95);

        Classification::new(normalized_name, normalized_name, family.ethnicity, confidence, Method::Phonetic, 0).ok()
    }
}

#[async_trait]
impl ClassifierLayer for PhoneticMatcher {
    async fn try_classify(&self, _original_name: &str, normalized_name: &str, codes: &PhoneticCode) -> Option<Classification> {
        self.classify(normalized_name, codes)
    }

    fn layer_name(&self) -> &'static str {
        "phonetic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadscout_core::Ethnicity;

    #[test]
    fn no_match_when_store_is_empty() {
        let learning = Arc::new(LearningStore::in_memory().unwrap());
        let matcher = PhoneticMatcher::new(learning);
        let codes = leadscout_phonetic::codes("bongani");
        assert!(matcher.classify("bongani", &codes).is_none());
    }

    #[test]
    fn matches_family_with_same_codes() {
        let learning = Arc::new(LearningStore::in_memory().unwrap());
        let codes = leadscout_phonetic::codes("bongani");
        let key = leadscout_phonetic::family_key(&codes);
        learning.upsert_phonetic_family(&key, Ethnicity::African, "Bongani", 0.8);

        let matcher = PhoneticMatcher::new(learning);
        let result = matcher.classify("bongani", &codes).expect("should match its own family");
        assert_eq!(result.ethnicity, Ethnicity::African);
        assert_eq!(result.method, Method::Phonetic);
    }

    #[test]
    fn single_character_input_never_matches() {
        let learning = Arc::new(LearningStore::in_memory().unwrap());
        let matcher = PhoneticMatcher::new(learning);
        let codes = leadscout_phonetic::codes("x");
        assert!(matcher.classify("x", &codes).is_none());
    }
}
