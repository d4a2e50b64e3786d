//! `DictionaryEntry` (spec §3).

use serde::{Deserialize, Serialize};

use crate::ethnicity::Ethnicity;

/// A curated mapping from a normalized name token to an ethnicity with a
/// dictionary-local prior weight (not a `Classification` confidence).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DictionaryEntry {
    /// Lowercased token.
    pub token: String,
    pub ethnicity: Ethnicity,
    /// Dictionary-local prior in `[0.0, 1.0]`.
    pub weight: f64,
}

/// Classification of a token's structural role within a name, used by the
/// Dictionary Store's decision procedure (spec §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenRole {
    /// A forename, surname, or compound root that carries classification
    /// weight.
    Significant,
    /// A low-weight particle (e.g. "van", "der", "de", "du", "le", "von").
    Particle,
    /// A one- or two-letter initial, ignored by the decision procedure.
    Initial,
}

/// The recognized compound-particle sequences for Afrikaans/Dutch-style
/// compound surnames (spec §4.2, §9 Open Questions: particle set and
/// compound rules are fixed here pending maintainer confirmation against
/// the full dictionary contents).
pub const PARTICLES: &[&str] = &["van", "der", "de", "du", "le", "von", "van't", "ten", "ter"];

/// Ordered particle sequences that form a recognized compound surname
/// prefix, e.g. `["van", "der"]` matches "van der Merwe".
pub const COMPOUND_PARTICLE_SEQUENCES: &[&[&str]] = &[
    &["van", "der"],
    &["van", "de"],
    &["van"],
    &["du"],
    &["de"],
    &["le"],
    &["von"],
];

pub fn is_particle(token: &str) -> bool {
    PARTICLES.contains(&token)
}

pub fn token_role(token: &str) -> TokenRole {
    if is_particle(token) {
        TokenRole::Particle
    } else if token.chars().count() <= 2 {
        TokenRole::Initial
    } else {
        TokenRole::Significant
    }
}
