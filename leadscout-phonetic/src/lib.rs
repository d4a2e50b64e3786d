//! Pure, side-effect-free computation of multi-algorithm phonetic codes
//! (spec §4.1 Phonetic Coder).
//!
//! Every function here is deterministic and allocation-light; none of them
//! log, read configuration, or touch storage — any I/O belongs in the
//! Learning Store or Job Store instead (spec §9).

#![forbid(unsafe_code)]

use leadscout_core::phonetic::{agreement as core_agreement, family_key as core_family_key, PhoneticCode};
use rphonetic::{DoubleMetaphone, Encoder, MatchRatingApproach, Metaphone, Nysiis, Soundex};

/// Computes all supported phonetic codes for an already-normalized,
/// non-empty name.
///
/// Never fails: for degenerate inputs (all non-alphabetic, or a single
/// character that no algorithm can encode) each field is simply `None`
/// and `PhoneticCode::is_empty()` returns `true`.
pub fn codes(name: &str) -> PhoneticCode {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_alphabetic() || c.is_whitespace())
        .collect();
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        return PhoneticCode {
            normalized_key: String::new(),
            ..Default::default()
        };
    }

    let soundex = encode_or_none(&Soundex::default(), cleaned);
    let metaphone = encode_or_none(&Metaphone::default(), cleaned);
    let nysiis = encode_or_none(&Nysiis::default(), cleaned);
    let match_rating = encode_or_none(&MatchRatingApproach::default(), cleaned);

    let double_metaphone = {
        let encoder = DoubleMetaphone::default();
        let result = encoder.double_metaphone(cleaned);
        let primary = result.primary().to_string();
        if primary.is_empty() {
            None
        } else {
            Some(primary)
        }
    };

    PhoneticCode {
        soundex,
        metaphone,
        double_metaphone,
        nysiis,
        match_rating,
        normalized_key: cleaned.to_lowercase(),
    }
}

fn encode_or_none<E: Encoder>(encoder: &E, input: &str) -> Option<String> {
    let code = encoder.encode(input);
    if code.trim().is_empty() {
        None
    } else {
        Some(code)
    }
}

/// Count of algorithms agreeing between two code sets, in `[0, 5]`.
pub fn agreement(a: &PhoneticCode, b: &PhoneticCode) -> usize {
    core_agreement(a, b)
}

/// A stable key suitable for grouping names likely to belong to the same
/// phonetic family. Ties between equal-ranked codes are canonicalized to
/// lexicographic minimum (spec §4.1).
pub fn family_key(codes: &PhoneticCode) -> String {
    core_family_key(codes)
}

/// Minimum agreeing algorithms required for two names to count as the
/// same phonetic family (spec §4.1, §4.3).
pub const FAMILY_AGREEMENT_THRESHOLD: usize = 2;

/// Whether `a` and `b` meet the family-membership agreement threshold.
pub fn is_family_match(a: &PhoneticCode, b: &PhoneticCode) -> bool {
    !a.is_empty() && !b.is_empty() && agreement(a, b) >= FAMILY_AGREEMENT_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_input_yields_empty_code() {
        let c = codes("7734");
        assert!(c.is_empty());
    }

    #[test]
    fn similar_spellings_agree_on_at_least_two_algorithms() {
        let a = codes("bongani");
        let b = codes("bonganni");
        assert!(is_family_match(&a, &b), "agreement was {}", agreement(&a, &b));
    }

    #[test]
    fn dissimilar_names_do_not_spuriously_match() {
        let a = codes("bongani");
        let b = codes("vorster");
        assert!(!is_family_match(&a, &b));
    }

    #[test]
    fn family_key_is_order_independent_of_algorithm_declaration() {
        let a = codes("sithole");
        let b = codes("sithole");
        assert_eq!(family_key(&a), family_key(&b));
    }
}
