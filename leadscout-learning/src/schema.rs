//! SQLite schema and migrations for the Learning Store.
//!
//! Follows the teacher's versioned-migration convention: a
//! `schema_version` table plus one `apply_vN_schema` function per version.

use rusqlite::{Connection, Result as SqliteResult};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 1;

pub fn is_initialized(conn: &Connection) -> bool {
    conn.query_row(
        "SELECT name FROM sqlite_master WHERE type='table' AND name='schema_version'",
        [],
        |row| row.get::<_, String>(0),
    )
    .is_ok()
}

pub fn get_schema_version(conn: &Connection) -> SqliteResult<i32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
}

pub fn initialize_schema(conn: &Connection) -> SqliteResult<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    let current_version = get_schema_version(conn).unwrap_or(0);

    if current_version < 1 {
        apply_v1_schema(conn)?;
    }

    Ok(())
}

fn apply_v1_schema(conn: &Connection) -> SqliteResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS llm_classifications (
            normalized_name TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            ethnicity TEXT NOT NULL,
            confidence REAL NOT NULL,
            provider TEXT NOT NULL,
            cost REAL NOT NULL,
            latency_ms INTEGER NOT NULL,
            phonetic_soundex TEXT,
            phonetic_metaphone TEXT,
            phonetic_double_metaphone TEXT,
            phonetic_nysiis TEXT,
            phonetic_match_rating TEXT,
            phonetic_normalized_key TEXT NOT NULL DEFAULT '',
            structural_features TEXT NOT NULL DEFAULT '[]',
            session_id TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            evidence_count INTEGER NOT NULL DEFAULT 1
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS learned_patterns (
            id TEXT PRIMARY KEY,
            pattern_type TEXT NOT NULL,
            pattern_value TEXT NOT NULL,
            target_ethnicity TEXT NOT NULL,
            confidence REAL NOT NULL,
            evidence_count INTEGER NOT NULL DEFAULT 1,
            success_count INTEGER NOT NULL DEFAULT 0,
            failure_count INTEGER NOT NULL DEFAULT 0,
            active INTEGER NOT NULL DEFAULT 1,
            UNIQUE(pattern_type, pattern_value, target_ethnicity)
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_learned_patterns_lookup
         ON learned_patterns(pattern_type, pattern_value, active)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS phonetic_families (
            family_key TEXT PRIMARY KEY,
            ethnicity TEXT NOT NULL,
            member_count INTEGER NOT NULL DEFAULT 0,
            confidence REAL NOT NULL DEFAULT 0.5,
            representative_names TEXT NOT NULL DEFAULT '[]'
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS pattern_applications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pattern_id TEXT NOT NULL,
            name TEXT NOT NULL,
            predicted TEXT NOT NULL,
            actual TEXT,
            correct INTEGER,
            applied_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (pattern_id) REFERENCES learned_patterns(id)
        )",
        [],
    )?;

    // SPEC_FULL §B.3: address-conditioned learning signal, gated by
    // `Config::enable_spatial_patterns`. The table always exists so
    // turning the flag on later never requires a migration.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS spatial_markers (
            id TEXT PRIMARY KEY,
            pattern_value TEXT NOT NULL,
            target_ethnicity TEXT NOT NULL,
            confidence REAL NOT NULL,
            evidence_count INTEGER NOT NULL DEFAULT 1,
            active INTEGER NOT NULL DEFAULT 1,
            UNIQUE(pattern_value, target_ethnicity)
        )",
        [],
    )?;

    conn.execute(
        "INSERT INTO schema_version (version) VALUES (1)",
        [],
    )?;

    Ok(())
}
