//! SQLite-backed Learning Store (spec §4.4).

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use leadscout_core::error::{Error, Result};
use leadscout_core::pattern::{
    DEFAULT_DEACTIVATION_THRESHOLD, DEFAULT_MIN_APPLICATIONS_FOR_DEACTIVATION,
};
use leadscout_core::{Classification, Ethnicity, LLMRecord, LearnedPattern, Method, PatternType, PhoneticCode, PhoneticFamily};

use crate::schema::{initialize_schema, is_initialized};

/// Default score threshold `lookup_patterns` requires before it returns a
/// learned classification (spec §4.4).
pub const DEFAULT_LEARNED_THRESHOLD: f64 = 0.6;

/// Durable, concurrency-safe store of prior LLM verdicts and auto-derived
/// patterns.
///
/// Writes are serialized behind a single mutex-guarded connection,
/// following `SqliteMemoryStore`'s convention; this makes every write
/// atomic with respect to concurrent readers without requiring a
/// multi-connection pool.
pub struct LearningStore {
    conn: Arc<Mutex<Connection>>,
}

impl LearningStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::storage(e.to_string()))?;
        if !is_initialized(&conn) {
            initialize_schema(&conn).map_err(|e| Error::storage(e.to_string()))?;
        }
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::storage(e.to_string()))?;
        initialize_schema(&conn).map_err(|e| Error::storage(e.to_string()))?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::internal(format!("failed to lock learning store connection: {e}")))?;
        f(&conn).map_err(|e| Error::storage(e.to_string()))
    }

    /// Direct cache hit on `normalized_name`. Returns a `Classification`
    /// with method `cache` at the originally-recorded LLM confidence
    /// (never increased). Storage errors downgrade to "not found" (spec
    /// §4.4 failure semantics).
    pub fn lookup_exact(&self, normalized_name: &str) -> Option<Classification> {
        let result = self.with_conn(|conn| {
            conn.query_row(
                "SELECT name, ethnicity, confidence FROM llm_classifications WHERE normalized_name = ?1",
                params![normalized_name],
                |row| {
                    let name: String = row.get(0)?;
                    let ethnicity: String = row.get(1)?;
                    let confidence: f64 = row.get(2)?;
                    Ok((name, ethnicity, confidence))
                },
            )
            .optional()
        });

        match result {
            Ok(Some((name, ethnicity_str, confidence))) => {
                let ethnicity = Ethnicity::parse(&ethnicity_str).unwrap_or(Ethnicity::Unknown);
                Classification::new(&name, normalized_name, ethnicity, confidence.clamp(0.0, 0.99), Method::Cache, 0).ok()
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "lookup_exact failed, falling through");
                None
            }
        }
    }

    /// Evaluate active patterns against `name`/`codes` and return the
    /// highest-scoring one that clears `threshold` (spec §4.4). When
    /// multiple patterns agree, the max confidence wins, not an average.
    pub fn lookup_patterns(&self, normalized_name: &str, codes: &PhoneticCode, threshold: f64) -> Option<Classification> {
        let candidates = self.candidate_patterns(normalized_name, codes);
        let best = candidates
            .into_iter()
            .filter(|p| p.active && p.lookup_score() >= threshold)
            .max_by(|a, b| a.lookup_score().partial_cmp(&b.lookup_score()).unwrap_or(std::cmp::Ordering::Equal))?;

        Classification::new(
            normalized_name,
            normalized_name,
            best.target_ethnicity,
            best.confidence.clamp(0.6, 0.95),
            Method::Learned,
            0,
        )
        .ok()
    }

    fn candidate_patterns(&self, normalized_name: &str, codes: &PhoneticCode) -> Vec<LearnedPattern> {
        let tokens: Vec<&str> = normalized_name.split_whitespace().collect();
        let mut values = Vec::new();
        if let Some(first) = tokens.first() {
            if let Some(p) = leadscout_core::name::prefix(first, 2) {
                values.push((PatternType::Prefix2, p));
            }
            if let Some(p) = leadscout_core::name::prefix(first, 3) {
                values.push((PatternType::Prefix3, p));
            }
            if let Some(s) = leadscout_core::name::suffix(first, 2) {
                values.push((PatternType::Suffix2, s));
            }
            if let Some(s) = leadscout_core::name::suffix(first, 3) {
                values.push((PatternType::Suffix3, s));
            }
        }
        if let Some(last) = tokens.last() {
            values.push((PatternType::CompoundSurname, last.to_string()));
        }
        let family_key = leadscout_core::phonetic::family_key(codes);
        values.push((PatternType::PhoneticFamily, family_key));

        let result = self.with_conn(|conn| {
            let mut out = Vec::new();
            for (pattern_type, value) in &values {
                let mut stmt = conn.prepare(
                    "SELECT id, pattern_type, pattern_value, target_ethnicity, confidence,
                            evidence_count, success_count, failure_count, active
                     FROM learned_patterns
                     WHERE pattern_type = ?1 AND pattern_value = ?2 AND active = 1",
                )?;
                let rows = stmt.query_map(params![pattern_type.as_str(), value], row_to_pattern)?;
                for row in rows {
                    out.push(row?);
                }
            }
            Ok(out)
        });

        match result {
            Ok(patterns) => patterns,
            Err(e) => {
                warn!(error = %e, "lookup_patterns query failed, falling through");
                Vec::new()
            }
        }
    }

    /// Idempotent upsert keyed by `normalized_name`. Retains the
    /// higher-confidence record and increments evidence (spec §4.4).
    pub fn record_llm(&self, record: &LLMRecord) {
        let outcome = self.with_conn(|conn| {
            let existing: Option<f64> = conn
                .query_row(
                    "SELECT confidence FROM llm_classifications WHERE normalized_name = ?1",
                    params![record.normalized_name],
                    |row| row.get(0),
                )
                .optional()?;

            let codes = &record.phonetic_codes;
            let features = serde_json::to_string(&record.structural_features).unwrap_or_else(|_| "[]".to_string());

            match existing {
                Some(prev_confidence) if prev_confidence >= record.confidence => {
                    conn.execute(
                        "UPDATE llm_classifications SET evidence_count = evidence_count + 1 WHERE normalized_name = ?1",
                        params![record.normalized_name],
                    )?;
                }
                _ => {
                    conn.execute(
                        "INSERT INTO llm_classifications (
                            normalized_name, name, ethnicity, confidence, provider, cost, latency_ms,
                            phonetic_soundex, phonetic_metaphone, phonetic_double_metaphone, phonetic_nysiis,
                            phonetic_match_rating, phonetic_normalized_key, structural_features, session_id,
                            timestamp, evidence_count
                        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, 1)
                        ON CONFLICT(normalized_name) DO UPDATE SET
                            name = excluded.name,
                            ethnicity = excluded.ethnicity,
                            confidence = excluded.confidence,
                            provider = excluded.provider,
                            cost = excluded.cost,
                            latency_ms = excluded.latency_ms,
                            evidence_count = llm_classifications.evidence_count + 1",
                        params![
                            record.normalized_name,
                            record.name,
                            record.ethnicity.as_str(),
                            record.confidence,
                            record.provider,
                            record.cost,
                            record.latency_ms as i64,
                            codes.soundex,
                            codes.metaphone,
                            codes.double_metaphone,
                            codes.nysiis,
                            codes.match_rating,
                            codes.normalized_key,
                            features,
                            record.session_id,
                            record.timestamp.to_rfc3339(),
                        ],
                    )?;
                }
            }
            Ok(())
        });

        if let Err(e) = outcome {
            warn!(error = %e, "record_llm failed; classification already returned, write dropped");
        }
    }

    /// Insert-or-merge a pattern by `(pattern_type, pattern_value,
    /// target_ethnicity)` (spec §4.4). On merge, `evidence_count` is
    /// incremented and confidence recomputed with the monotonic, capped
    /// update rule.
    pub fn upsert_pattern(&self, pattern_type: PatternType, pattern_value: &str, target_ethnicity: Ethnicity, base_confidence: f64) {
        let outcome = self.with_conn(|conn| {
            let existing: Option<(String, u64)> = conn
                .query_row(
                    "SELECT id, evidence_count FROM learned_patterns
                     WHERE pattern_type = ?1 AND pattern_value = ?2 AND target_ethnicity = ?3",
                    params![pattern_type.as_str(), pattern_value, target_ethnicity.as_str()],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64)),
                )
                .optional()?;

            match existing {
                Some((id, evidence_count)) => {
                    let new_evidence = evidence_count + 1;
                    let confidence = LearnedPattern::confidence_from_evidence(base_confidence, new_evidence);
                    conn.execute(
                        "UPDATE learned_patterns SET evidence_count = ?1, confidence = ?2 WHERE id = ?3",
                        params![new_evidence as i64, confidence, id],
                    )?;
                }
                None => {
                    let id = uuid::Uuid::new_v4().to_string();
                    conn.execute(
                        "INSERT INTO learned_patterns (
                            id, pattern_type, pattern_value, target_ethnicity, confidence,
                            evidence_count, success_count, failure_count, active
                        ) VALUES (?1, ?2, ?3, ?4, ?5, 1, 0, 0, 1)",
                        params![id, pattern_type.as_str(), pattern_value, target_ethnicity.as_str(), base_confidence],
                    )?;
                }
            }
            Ok(())
        });

        if let Err(e) = outcome {
            warn!(error = %e, "upsert_pattern failed");
        }
    }

    /// Upsert a phonetic family (spec §4.9 Pattern Extractor), bumping
    /// `member_count` and the representative-names list, capped.
    pub fn upsert_phonetic_family(&self, family_key: &str, ethnicity: Ethnicity, name: &str, llm_confidence: f64) {
        let outcome = self.with_conn(|conn| {
            let existing: Option<(u64, String)> = conn
                .query_row(
                    "SELECT member_count, representative_names FROM phonetic_families WHERE family_key = ?1",
                    params![family_key],
                    |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?)),
                )
                .optional()?;

            match existing {
                Some((member_count, reps_json)) => {
                    let mut reps: Vec<String> = serde_json::from_str(&reps_json).unwrap_or_default();
                    let mut family = PhoneticFamily {
                        family_key: family_key.to_string(),
                        ethnicity,
                        member_count,
                        confidence: 0.0,
                        representative_names: std::mem::take(&mut reps),
                    };
                    family.add_member(name);
                    conn.execute(
                        "UPDATE phonetic_families SET member_count = ?1, confidence = ?2, representative_names = ?3 WHERE family_key = ?4",
                        params![
                            family.member_count as i64,
                            family.confidence,
                            serde_json::to_string(&family.representative_names).unwrap_or_else(|_| "[]".into()),
                            family_key,
                        ],
                    )?;
                }
                None => {
                    let mut family = PhoneticFamily {
                        family_key: family_key.to_string(),
                        ethnicity,
                        member_count: 0,
                        confidence: llm_confidence,
                        representative_names: Vec::new(),
                    };
                    family.add_member(name);
                    conn.execute(
                        "INSERT INTO phonetic_families (family_key, ethnicity, member_count, confidence, representative_names)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![
                            family_key,
                            ethnicity.as_str(),
                            family.member_count as i64,
                            family.confidence,
                            serde_json::to_string(&family.representative_names).unwrap_or_else(|_| "[]".into()),
                        ],
                    )?;
                }
            }
            Ok(())
        });

        if let Err(e) = outcome {
            warn!(error = %e, "upsert_phonetic_family failed");
        }
    }

    /// Record the outcome of applying a pattern, updating its
    /// success/failure counters and enforcing the deactivation policy
    /// (spec §4.4, §3).
    pub fn record_application(&self, pattern_id: &str, name: &str, predicted: Ethnicity, actual_if_known: Option<Ethnicity>) {
        self.record_application_with_policy(
            pattern_id,
            name,
            predicted,
            actual_if_known,
            DEFAULT_DEACTIVATION_THRESHOLD,
            DEFAULT_MIN_APPLICATIONS_FOR_DEACTIVATION,
        )
    }

    pub fn record_application_with_policy(
        &self,
        pattern_id: &str,
        name: &str,
        predicted: Ethnicity,
        actual_if_known: Option<Ethnicity>,
        threshold: f64,
        min_applications: u64,
    ) {
        let correct = actual_if_known.map(|actual| actual == predicted);

        let outcome = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO pattern_applications (pattern_id, name, predicted, actual, correct)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    pattern_id,
                    name,
                    predicted.as_str(),
                    actual_if_known.map(|e| e.as_str().to_string()),
                    correct.map(|c| c as i64),
                ],
            )?;

            if let Some(is_correct) = correct {
                if is_correct {
                    conn.execute(
                        "UPDATE learned_patterns SET success_count = success_count + 1 WHERE id = ?1",
                        params![pattern_id],
                    )?;
                } else {
                    conn.execute(
                        "UPDATE learned_patterns SET failure_count = failure_count + 1 WHERE id = ?1",
                        params![pattern_id],
                    )?;
                }

                let row = conn
                    .query_row(
                        "SELECT id, pattern_type, pattern_value, target_ethnicity, confidence,
                                evidence_count, success_count, failure_count, active
                         FROM learned_patterns WHERE id = ?1",
                        params![pattern_id],
                        row_to_pattern,
                    )
                    .optional()?;

                if let Some(mut pattern) = row {
                    if pattern.apply_deactivation_policy(threshold, min_applications) {
                        conn.execute(
                            "UPDATE learned_patterns SET active = 0 WHERE id = ?1",
                            params![pattern_id],
                        )?;
                    }
                }
            }
            Ok(())
        });

        if let Err(e) = outcome {
            warn!(error = %e, "record_application failed");
        }
    }

    /// Thin wrapper for human-confirmed corrections (SPEC_FULL §B.4),
    /// reusing `record_llm`/`upsert_pattern` with no new invariants.
    pub fn record_correction(&self, record: &LLMRecord) {
        self.record_llm(record);
    }

    /// A small sample of prior verified `(name, ethnicity)` pairs, drawn
    /// from the best-established phonetic families, for the LLM Adapter
    /// to use as in-context exemplars (spec §4.5, SPEC_FULL §B.1).
    pub fn exemplars(&self, limit: usize) -> Vec<(String, Ethnicity)> {
        let mut families: Vec<PhoneticFamily> =
            self.all_phonetic_families().into_iter().filter(|f| !f.representative_names.is_empty()).collect();
        families.sort_by(|a, b| b.member_count.cmp(&a.member_count));
        families
            .into_iter()
            .take(limit)
            .filter_map(|f| f.representative_names.first().cloned().map(|name| (name, f.ethnicity)))
            .collect()
    }

    /// All known phonetic families, for the Phonetic Matcher (spec §4.3)
    /// to score against a candidate's own code set. Families are expected
    /// to stay in the low thousands for a single run, so a full scan is
    /// simpler than indexing on individual algorithm codes and is fast
    /// enough in practice; revisit if family cardinality grows.
    pub fn all_phonetic_families(&self) -> Vec<PhoneticFamily> {
        let result = self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT family_key, ethnicity, member_count, confidence, representative_names FROM phonetic_families",
            )?;
            let rows = stmt.query_map([], |row| {
                let reps_json: String = row.get(4)?;
                let representative_names: Vec<String> = serde_json::from_str(&reps_json).unwrap_or_default();
                let ethnicity_str: String = row.get(1)?;
                Ok(PhoneticFamily {
                    family_key: row.get(0)?,
                    ethnicity: Ethnicity::parse(&ethnicity_str).unwrap_or(Ethnicity::Unknown),
                    member_count: row.get::<_, i64>(2)? as u64,
                    confidence: row.get(3)?,
                    representative_names,
                })
            })?;
            let mut out = Vec::new();
            for row in rows {
                out.push(row?);
            }
            Ok(out)
        });

        match result {
            Ok(families) => families,
            Err(e) => {
                warn!(error = %e, "all_phonetic_families query failed, falling through");
                Vec::new()
            }
        }
    }
}

fn row_to_pattern(row: &rusqlite::Row) -> rusqlite::Result<LearnedPattern> {
    let pattern_type_str: String = row.get(1)?;
    let target_ethnicity_str: String = row.get(3)?;
    Ok(LearnedPattern {
        id: row.get(0)?,
        pattern_type: PatternType::parse(&pattern_type_str).unwrap_or(PatternType::Prefix2),
        pattern_value: row.get(2)?,
        target_ethnicity: Ethnicity::parse(&target_ethnicity_str).unwrap_or(Ethnicity::Unknown),
        confidence: row.get(4)?,
        evidence_count: row.get::<_, i64>(5)? as u64,
        success_count: row.get::<_, i64>(6)? as u64,
        failure_count: row.get::<_, i64>(7)? as u64,
        active: row.get::<_, i64>(8)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadscout_core::phonetic::PhoneticCode;

    fn sample_record(name: &str, ethnicity: Ethnicity, confidence: f64) -> LLMRecord {
        LLMRecord {
            name: name.to_string(),
            normalized_name: name.to_lowercase(),
            ethnicity,
            confidence,
            provider: "anthropic".to_string(),
            cost: 0.001,
            latency_ms: 500,
            phonetic_codes: PhoneticCode::default(),
            structural_features: vec![],
            session_id: "session-1".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn lookup_exact_returns_cache_hit_after_record_llm() {
        let store = LearningStore::in_memory().unwrap();
        let record = sample_record("Xiluva Rirhandzu", Ethnicity::African, 0.85);
        store.record_llm(&record);

        let hit = store.lookup_exact("xiluva rirhandzu").expect("should hit cache");
        assert_eq!(hit.ethnicity, Ethnicity::African);
        assert_eq!(hit.method, Method::Cache);
        assert_eq!(hit.confidence, 0.85);
    }

    #[test]
    fn record_llm_keeps_higher_confidence_on_duplicate() {
        let store = LearningStore::in_memory().unwrap();
        store.record_llm(&sample_record("Name", Ethnicity::African, 0.6));
        store.record_llm(&sample_record("Name", Ethnicity::White, 0.9));

        let hit = store.lookup_exact("name").unwrap();
        assert_eq!(hit.confidence, 0.9);
        assert_eq!(hit.ethnicity, Ethnicity::White);
    }

    #[test]
    fn upsert_pattern_then_lookup_patterns_hits() {
        let store = LearningStore::in_memory().unwrap();
        store.upsert_pattern(PatternType::Prefix2, "xi", Ethnicity::African, 0.7);

        let codes = PhoneticCode::default();
        let result = store.lookup_patterns("xiluva rirhandzu", &codes, DEFAULT_LEARNED_THRESHOLD);
        assert!(result.is_none(), "single application has success_rate 0 until recorded");
    }

    #[test]
    fn pattern_deactivates_after_enough_failures() {
        let store = LearningStore::in_memory().unwrap();
        store.upsert_pattern(PatternType::Prefix2, "zz", Ethnicity::White, 0.9);

        let id: String = store
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT id FROM learned_patterns WHERE pattern_value = 'zz'",
                    [],
                    |row| row.get(0),
                )
            })
            .unwrap();

        for _ in 0..20 {
            store.record_application(&id, "zztest", Ethnicity::White, Some(Ethnicity::African));
        }

        let active: bool = store
            .with_conn(|conn| {
                conn.query_row(
                    "SELECT active FROM learned_patterns WHERE id = ?1",
                    params![id],
                    |row| row.get::<_, i64>(0),
                )
            })
            .unwrap()
            != 0;
        assert!(!active);
    }
}
