//! Shared phonetic record types (spec §3 `PhoneticCode`, `PhoneticFamily`).
//!
//! These types are kept in `leadscout-core` rather than
//! `leadscout-phonetic` so that the Learning Store (which persists
//! `PhoneticFamily` rows) does not need to depend on the phonetic-coding
//! implementation crate, only on its output shape.

use serde::{Deserialize, Serialize};

use crate::ethnicity::Ethnicity;

/// Multi-algorithm phonetic code set for one normalized name.
///
/// Invariant (spec §4.1): at least four algorithms are represented; an
/// entry counts as a phonetic match against another iff at least two
/// algorithms agree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhoneticCode {
    pub soundex: Option<String>,
    pub metaphone: Option<String>,
    pub double_metaphone: Option<String>,
    pub nysiis: Option<String>,
    pub match_rating: Option<String>,
    /// A normalized key stable enough to group likely-same-family names.
    pub normalized_key: String,
}

impl PhoneticCode {
    /// All per-algorithm codes, in a fixed order, for agreement counting.
    pub fn codes(&self) -> [Option<&str>; 5] {
        [
            self.soundex.as_deref(),
            self.metaphone.as_deref(),
            self.double_metaphone.as_deref(),
            self.nysiis.as_deref(),
            self.match_rating.as_deref(),
        ]
    }

    pub fn is_empty(&self) -> bool {
        self.codes().iter().all(|c| c.is_none())
    }
}

/// Count of algorithms on which two code sets agree, in `[0, 5]`.
pub fn agreement(a: &PhoneticCode, b: &PhoneticCode) -> usize {
    a.codes()
        .iter()
        .zip(b.codes().iter())
        .filter(|(x, y)| matches!((x, y), (Some(x), Some(y)) if x == y))
        .count()
}

/// A stable, opaque key suitable for grouping names into the same
/// phonetic family. Ties between equal-ranked algorithm codes are broken
/// by lexicographic minimum (spec §4.1).
pub fn family_key(codes: &PhoneticCode) -> String {
    let mut present: Vec<&str> = codes.codes().into_iter().flatten().collect();
    present.sort_unstable();
    present.dedup();
    if present.is_empty() {
        codes.normalized_key.clone()
    } else {
        present.join("|")
    }
}

/// A set of names sharing agreeing phonetic codes across multiple
/// algorithms (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneticFamily {
    pub family_key: String,
    pub ethnicity: Ethnicity,
    pub member_count: u64,
    pub confidence: f64,
    pub representative_names: Vec<String>,
}

/// Cap on how many representative names a family retains (spec §4.9).
pub const MAX_REPRESENTATIVE_NAMES: usize = 10;

impl PhoneticFamily {
    /// Confidence is a monotonic function of `member_count` and implicitly
    /// of agreement fraction (callers only call this once a candidate has
    /// already passed the `agreement >= 2` gate), capped at 0.95 to leave
    /// headroom for the Dictionary Store's rule-based ceiling.
    pub fn recompute_confidence(member_count: u64) -> f64 {
        let base = 0.5;
        let growth = (member_count as f64 + 1.0).ln() * 0.12;
        (base + growth).min(0.95)
    }

    pub fn add_member(&mut self, name: &str) {
        self.member_count += 1;
        self.confidence = Self::recompute_confidence(self.member_count);
        if self.representative_names.len() < MAX_REPRESENTATIVE_NAMES
            && !self.representative_names.iter().any(|n| n == name)
        {
            self.representative_names.push(name.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(a: &str, b: &str) -> PhoneticCode {
        PhoneticCode {
            soundex: Some(a.to_string()),
            metaphone: Some(b.to_string()),
            double_metaphone: None,
            nysiis: None,
            match_rating: None,
            normalized_key: format!("{a}{b}"),
        }
    }

    #[test]
    fn agreement_counts_matching_algorithms() {
        let a = code("B525", "PNKN");
        let b = code("B525", "XXXX");
        assert_eq!(agreement(&a, &b), 1);
    }

    #[test]
    fn family_confidence_is_monotonic_in_member_count() {
        let c1 = PhoneticFamily::recompute_confidence(1);
        let c10 = PhoneticFamily::recompute_confidence(10);
        let c100 = PhoneticFamily::recompute_confidence(100);
        assert!(c1 < c10);
        assert!(c10 < c100);
        assert!(c100 <= 0.95);
    }
}
