//! `LLMRecord` (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ethnicity::Ethnicity;
use crate::phonetic::PhoneticCode;

/// An append-only record of one LLM verdict. Duplicates by
/// `normalized_name` are collapsed with the max-confidence record
/// preferred (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMRecord {
    pub name: String,
    pub normalized_name: String,
    pub ethnicity: Ethnicity,
    pub confidence: f64,
    pub provider: String,
    pub cost: f64,
    pub latency_ms: u64,
    pub phonetic_codes: PhoneticCode,
    pub structural_features: Vec<String>,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}
