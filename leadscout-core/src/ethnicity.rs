//! The closed ethnicity enumeration (spec §3).

use serde::{Deserialize, Serialize};

/// Broad ethnicity classification used for demographic targeting.
///
/// This is a probabilistic cluster assignment, not a claim about any
/// individual. `Unknown` is reserved for unclassifiable names and must
/// never be fabricated from a low-confidence signal — callers should
/// prefer returning `None` from a layer over guessing `Unknown` with high
/// confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ethnicity {
    African,
    White,
    Indian,
    CapeMalay,
    Coloured,
    Chinese,
    Unknown,
}

impl Ethnicity {
    /// All non-`Unknown` variants, in a stable order used for iteration
    /// over dictionary/pattern tables.
    pub const ALL: [Ethnicity; 6] = [
        Ethnicity::African,
        Ethnicity::White,
        Ethnicity::Indian,
        Ethnicity::CapeMalay,
        Ethnicity::Coloured,
        Ethnicity::Chinese,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Ethnicity::African => "african",
            Ethnicity::White => "white",
            Ethnicity::Indian => "indian",
            Ethnicity::CapeMalay => "cape_malay",
            Ethnicity::Coloured => "coloured",
            Ethnicity::Chinese => "chinese",
            Ethnicity::Unknown => "unknown",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "african" => Some(Ethnicity::African),
            "white" => Some(Ethnicity::White),
            "indian" => Some(Ethnicity::Indian),
            "cape_malay" => Some(Ethnicity::CapeMalay),
            "coloured" => Some(Ethnicity::Coloured),
            "chinese" => Some(Ethnicity::Chinese),
            "unknown" => Some(Ethnicity::Unknown),
            _ => None,
        }
    }
}

impl std::fmt::Display for Ethnicity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for e in Ethnicity::ALL.iter().copied().chain([Ethnicity::Unknown]) {
            assert_eq!(Ethnicity::parse(e.as_str()), Some(e));
        }
    }

    #[test]
    fn rejects_unknown_strings() {
        assert_eq!(Ethnicity::parse("martian"), None);
    }
}
