//! Curated dictionary lookup with particle/compound surname recognition
//! (spec §4.2 Dictionary Store).
//!
//! The dictionary is loaded once from an embedded CSV asset and is
//! immutable for the lifetime of a run; lookups are O(1) lowercased-token
//! hash lookups with no I/O.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use leadscout_core::dictionary_entry::{token_role, TokenRole, COMPOUND_PARTICLE_SEQUENCES};
use leadscout_core::{Classification, Ethnicity, Method};

const TOKENS_CSV: &str = include_str!("data/tokens.csv");

/// Weight at or above which a single significant token is strong enough
/// to drive a rule-based classification on its own (spec §4.2 step 4).
pub const HIGH_WEIGHT_THRESHOLD: f64 = 0.75;

static TOKEN_TABLE: Lazy<HashMap<String, (Ethnicity, f64)>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for line in TOKENS_CSV.lines().skip(1) {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.split(',');
        let (Some(token), Some(ethnicity_str), Some(weight_str)) =
            (parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        let Some(ethnicity) = Ethnicity::parse(ethnicity_str) else {
            continue;
        };
        let Ok(weight) = weight_str.parse::<f64>() else {
            continue;
        };
        map.insert(token.to_string(), (ethnicity, weight));
    }
    map
});

/// A curated, immutable token -> (ethnicity, weight) dictionary.
#[derive(Debug, Default, Clone, Copy)]
pub struct DictionaryStore;

/// The result of scanning a name's tokens for a recognized compound
/// particle sequence (spec §4.2 step 2).
struct CompoundMatch<'a> {
    /// The ethnicity conventionally associated with this particle family,
    /// used only when no significant token classifies (step 6).
    particle_ethnicity: Ethnicity,
    /// Index of the anchor token (the surname immediately following the
    /// particle sequence), if present in bounds.
    anchor_index: Option<usize>,
}

fn particle_family_ethnicity(sequence: &[&str]) -> Ethnicity {
    match sequence.first() {
        Some(&"van") | Some(&"du") | Some(&"von") | Some(&"le") => Ethnicity::White,
        Some(&"de") => Ethnicity::White,
        _ => Ethnicity::Unknown,
    }
}

fn find_compound_match<'a>(tokens: &[&'a str]) -> Option<CompoundMatch<'a>> {
    let mut sequences: Vec<&[&str]> = COMPOUND_PARTICLE_SEQUENCES.to_vec();
    sequences.sort_by_key(|s| std::cmp::Reverse(s.len()));

    for sequence in sequences {
        if sequence.is_empty() {
            continue;
        }
        for start in 0..tokens.len() {
            let end = start + sequence.len();
            if end > tokens.len() {
                continue;
            }
            if tokens[start..end] == *sequence {
                let anchor_index = if end < tokens.len() { Some(end) } else { None };
                return Some(CompoundMatch {
                    particle_ethnicity: particle_family_ethnicity(sequence),
                    anchor_index,
                });
            }
        }
    }
    None
}

impl DictionaryStore {
    pub fn new() -> Self {
        Self
    }

    /// O(1) lookup on a lowercased token (spec §4.2).
    pub fn classify_token(&self, token: &str) -> Option<(Ethnicity, f64)> {
        TOKEN_TABLE.get(&token.to_lowercase()).copied()
    }

    /// Tokenize, categorize, and classify a normalized name following the
    /// decision procedure of spec §4.2. Returns `None` when no rule
    /// applies; never raises.
    pub fn classify_name(&self, normalized_name: &str, original_name: &str) -> Option<Classification> {
        let tokens: Vec<&str> = normalized_name.split_whitespace().collect();
        if tokens.is_empty() {
            return None;
        }

        let compound = find_compound_match(&tokens);

        // Step 1: structural length gate.
        if tokens.len() > 6 && compound.is_none() {
            return None;
        }

        // Step 3: classify significant tokens only.
        let significant_hits: Vec<(usize, Ethnicity, f64)> = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| matches!(token_role(t), TokenRole::Significant))
            .filter_map(|(i, t)| self.classify_token(t).map(|(e, w)| (i, e, w)))
            .collect();

        let high_weight_hits: Vec<&(usize, Ethnicity, f64)> = significant_hits
            .iter()
            .filter(|(_, _, w)| *w >= HIGH_WEIGHT_THRESHOLD)
            .collect();

        if !high_weight_hits.is_empty() {
            let first_ethnicity = high_weight_hits[0].1;
            let all_agree = high_weight_hits.iter().all(|(_, e, _)| *e == first_ethnicity);

            if all_agree {
                // Step 4: confidence scales with agreement count, capped.
                let confidence = (0.85 + 0.03 * (high_weight_hits.len() as f64 - 1.0)).min(0.95);
                return Classification::new(
                    original_name,
                    normalized_name,
                    first_ethnicity,
                    confidence,
                    Method::RuleBased,
                    0,
                )
                .ok();
            }

            // Step 5: significant tokens disagree; prefer the surname anchor.
            if let Some(anchor_idx) = compound.as_ref().and_then(|c| c.anchor_index) {
                if let Some((_, anchor_ethnicity, _)) =
                    high_weight_hits.iter().find(|(i, _, _)| *i == anchor_idx)
                {
                    return Classification::new(
                        original_name,
                        normalized_name,
                        *anchor_ethnicity,
                        0.85,
                        Method::RuleBased,
                        0,
                    )
                    .ok();
                }
            }

            // Still ambiguous: do not guess.
            return Classification::new(
                original_name,
                normalized_name,
                Ethnicity::Unknown,
                0.80,
                Method::RuleBased,
                0,
            )
            .ok();
        }

        // Step 6: no significant token classified, but a compound-particle
        // pattern is present.
        if let Some(c) = compound {
            if c.particle_ethnicity != Ethnicity::Unknown {
                return Classification::new(
                    original_name,
                    normalized_name,
                    c.particle_ethnicity,
                    0.70,
                    Method::CompoundPattern,
                    0,
                )
                .ok();
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compound_surname_rule_hit() {
        let store = DictionaryStore::new();
        let c = store
            .classify_name("andreas petrus van der merwe", "ANDREAS PETRUS VAN DER MERWE")
            .expect("should classify");
        assert_eq!(c.ethnicity, Ethnicity::White);
        assert!(c.confidence >= 0.85);
        assert_eq!(c.method, Method::RuleBased);
    }

    #[test]
    fn traditional_african_rule_hit() {
        let store = DictionaryStore::new();
        let c = store
            .classify_name("nomvuyiseko eunice msindo", "NOMVUYISEKO EUNICE MSINDO")
            .expect("should classify");
        assert_eq!(c.ethnicity, Ethnicity::African);
        assert!(c.confidence >= 0.85);
    }

    #[test]
    fn unknown_tokens_return_none() {
        let store = DictionaryStore::new();
        assert!(store.classify_name("xiluva rirhandzu", "Xiluva Rirhandzu").is_none());
    }

    #[test]
    fn initials_are_ignored() {
        let store = DictionaryStore::new();
        // "j" is a one-letter initial and must not itself drive a lookup.
        let c = store.classify_name("j dlamini", "J Dlamini").expect("should classify");
        assert_eq!(c.ethnicity, Ethnicity::African);
    }

    #[test]
    fn excessive_token_count_without_compound_is_rejected() {
        let store = DictionaryStore::new();
        assert!(store
            .classify_name("a b c d e f g dlamini", "a b c d e f g dlamini")
            .is_none());
    }
}
