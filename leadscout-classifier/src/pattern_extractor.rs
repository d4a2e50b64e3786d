//! Pattern Extractor: turns a successful LLM classification into durable
//! patterns (spec §4.9).

use std::sync::Arc;

use leadscout_core::dictionary_entry::{token_role, TokenRole, COMPOUND_PARTICLE_SEQUENCES};
use leadscout_core::{phonetic::PhoneticCode, Classification, Ethnicity, Method, PatternType};
use leadscout_learning::LearningStore;

/// Minimum LLM confidence required before a classification is mined for
/// patterns at all (spec §4.9).
const MIN_LLM_CONFIDENCE: f64 = 0.8;
/// Starting confidence for newly-inserted structural/linguistic patterns
/// (spec §4.9).
const NEW_PATTERN_CONFIDENCE: f64 = 0.7;

/// Recognizable Nguni/Khoisan click-consonant digraphs. Presence of one
/// of these is treated as a linguistic marker distinct from the
/// dictionary's token-level lookup (spec §4.9).
const CLICK_CONSONANT_MARKERS: &[&str] = &["xh", "qh", "gq", "nq", "hl", "dl"];

pub struct PatternExtractor {
    learning: Arc<LearningStore>,
}

impl PatternExtractor {
    pub fn new(learning: Arc<LearningStore>) -> Self {
        Self { learning }
    }

    /// Derives and persists patterns from `classification`, a no-op
    /// unless it came from the LLM layer at sufficient confidence with a
    /// non-`unknown` ethnicity (spec §4.9).
    pub fn extract(&self, classification: &Classification, codes: &PhoneticCode) {
        if classification.method != Method::Llm {
            return;
        }
        if classification.confidence < MIN_LLM_CONFIDENCE || classification.ethnicity == Ethnicity::Unknown {
            return;
        }

        let normalized = classification.normalized_name.as_str();
        let ethnicity = classification.ethnicity;

        self.extract_structural(normalized, ethnicity);
        self.extract_phonetic(&classification.original_name, codes, ethnicity, classification.confidence);
        self.extract_linguistic_markers(normalized, ethnicity);
        self.extract_compound_surname(normalized, ethnicity);
    }

    fn extract_structural(&self, normalized_name: &str, ethnicity: Ethnicity) {
        for candidate in [normalized_name, most_significant_token(normalized_name).unwrap_or(normalized_name)] {
            insert_affix_patterns(&self.learning, candidate, ethnicity);
        }
    }

    fn extract_phonetic(&self, original_name: &str, codes: &PhoneticCode, ethnicity: Ethnicity, llm_confidence: f64) {
        if codes.is_empty() {
            return;
        }
        let key = leadscout_phonetic::family_key(codes);
        self.learning.upsert_phonetic_family(&key, ethnicity, original_name, llm_confidence);
    }

    fn extract_linguistic_markers(&self, normalized_name: &str, ethnicity: Ethnicity) {
        for marker in CLICK_CONSONANT_MARKERS {
            if normalized_name.contains(marker) {
                self.learning.upsert_pattern(PatternType::LinguisticMarker, marker, ethnicity, NEW_PATTERN_CONFIDENCE);
            }
        }
    }

    fn extract_compound_surname(&self, normalized_name: &str, ethnicity: Ethnicity) {
        let tokens: Vec<&str> = normalized_name.split_whitespace().collect();
        if let Some(anchor) = compound_surname_anchor(&tokens) {
            self.learning.upsert_pattern(PatternType::CompoundSurname, anchor, ethnicity, NEW_PATTERN_CONFIDENCE);
        }
    }
}

fn insert_affix_patterns(learning: &LearningStore, token: &str, ethnicity: Ethnicity) {
    if let Some(p) = leadscout_core::name::prefix(token, 2) {
        learning.upsert_pattern(PatternType::Prefix2, &p, ethnicity, NEW_PATTERN_CONFIDENCE);
    }
    if let Some(s) = leadscout_core::name::suffix(token, 2) {
        learning.upsert_pattern(PatternType::Suffix2, &s, ethnicity, NEW_PATTERN_CONFIDENCE);
    }
    if let Some(p) = leadscout_core::name::prefix(token, 3) {
        learning.upsert_pattern(PatternType::Prefix3, &p, ethnicity, NEW_PATTERN_CONFIDENCE);
    }
    if let Some(s) = leadscout_core::name::suffix(token, 3) {
        learning.upsert_pattern(PatternType::Suffix3, &s, ethnicity, NEW_PATTERN_CONFIDENCE);
    }
}

/// The longest `Significant` token, ties broken by first occurrence —
/// typically the surname in a "forename(s) surname" layout.
fn most_significant_token(normalized_name: &str) -> Option<&str> {
    normalized_name
        .split_whitespace()
        .filter(|t| matches!(token_role(t), TokenRole::Significant))
        .max_by_key(|t| t.len())
}

fn compound_surname_anchor<'a>(tokens: &[&'a str]) -> Option<&'a str> {
    let mut sequences: Vec<&[&str]> = COMPOUND_PARTICLE_SEQUENCES.to_vec();
    sequences.sort_by_key(|s| std::cmp::Reverse(s.len()));

    for sequence in sequences {
        if sequence.is_empty() {
            continue;
        }
        for start in 0..tokens.len() {
            let end = start + sequence.len();
            if end <= tokens.len() && tokens[start..end] == *sequence && end < tokens.len() {
                return Some(tokens[end]);
            }
        }
    }
    None
}
