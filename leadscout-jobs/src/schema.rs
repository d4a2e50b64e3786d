//! SQLite schema and migrations for the Job Store (spec §4.7).

use rusqlite::{Connection, Result as SqliteResult};

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
    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| row.get(0))
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
        "CREATE TABLE IF NOT EXISTS jobs (
            job_id TEXT PRIMARY KEY,
            input_fingerprint TEXT NOT NULL,
            total_rows INTEGER NOT NULL,
            processed_count INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL,
            lock_owner TEXT,
            lock_expires_at TEXT,
            started_at TEXT NOT NULL,
            completed_at TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_fingerprint_running
         ON jobs(input_fingerprint) WHERE status = 'running'",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS batches (
            job_id TEXT NOT NULL,
            batch_number INTEGER NOT NULL,
            first_row INTEGER NOT NULL,
            last_row INTEGER NOT NULL,
            status TEXT NOT NULL,
            started_at TEXT,
            committed_at TEXT,
            PRIMARY KEY (job_id, batch_number),
            FOREIGN KEY (job_id) REFERENCES jobs(job_id)
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS lead_results (
            job_id TEXT NOT NULL,
            row_index INTEGER NOT NULL,
            batch_number INTEGER NOT NULL,
            lead_fields TEXT NOT NULL,
            classification TEXT,
            processing_status TEXT NOT NULL,
            error_kind TEXT,
            error_message TEXT,
            attempts INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (job_id, row_index),
            FOREIGN KEY (job_id) REFERENCES jobs(job_id)
        )",
        [],
    )?;

    conn.execute("INSERT INTO schema_version (version) VALUES (1)", [])?;

    Ok(())
}
