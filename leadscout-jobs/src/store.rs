//! Durable `Job`/`Batch`/`LeadResult` store with exclusive locking and
//! conservative resume (spec §4.7).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{info, warn};
use uuid::Uuid;

use leadscout_core::{
    Batch, BatchStatus, Error, InputFingerprint, Job, JobStatus, LeadResult, ProcessingStatus, ResumeState, Result,
};

use crate::schema;

/// Durable job/batch/lead-result store. Serializes all writes behind a
/// single connection mutex, matching the learning store's concurrency
/// model: SQLite itself is the source of truth for atomicity, the mutex
/// only keeps Rust-side callers from racing on the same connection.
pub struct JobStore {
    conn: Arc<Mutex<Connection>>,
}

impl JobStore {
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::storage(e.to_string()))?;
        schema::initialize_schema(&conn).map_err(|e| Error::storage(e.to_string()))?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| Error::storage(e.to_string()))?;
        schema::initialize_schema(&conn).map_err(|e| Error::storage(e.to_string()))?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> rusqlite::Result<T>) -> Result<T> {
        let conn = self.conn.lock().map_err(|_| Error::internal("job store connection poisoned"))?;
        f(&conn).map_err(|e| Error::storage(e.to_string()))
    }

    /// Acquires an exclusive lock keyed by `input_fingerprint` and
    /// returns the running `Job`, creating one if none exists yet, or
    /// resuming the most recent non-terminal job for this fingerprint.
    pub fn begin_job(
        &self,
        fingerprint: &InputFingerprint,
        total_rows: u64,
        owner: &str,
        lock_ttl: Duration,
        force_clear_stale: bool,
    ) -> Result<Job> {
        let conn = self.conn.lock().map_err(|_| Error::internal("job store connection poisoned"))?;

        let existing = conn
            .query_row(
                "SELECT job_id, status, lock_owner, lock_expires_at, processed_count, started_at
                 FROM jobs WHERE input_fingerprint = ?1 ORDER BY started_at DESC LIMIT 1",
                params![fingerprint.0],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                        row.get::<_, i64>(4)?,
                        row.get::<_, String>(5)?,
                    ))
                },
            )
            .optional()
            .map_err(|e| Error::storage(e.to_string()))?;

        let now = Utc::now();

        if let Some((job_id, status_str, lock_owner, lock_expires_at, processed_count, _started_at)) = existing {
            let status = JobStatus::parse(&status_str).unwrap_or(JobStatus::Failed);
            if status != JobStatus::Completed && status != JobStatus::Archived {
                let expires_at = lock_expires_at.as_deref().and_then(parse_ts);
                let same_owner = lock_owner.as_deref() == Some(owner);
                let unexpired = expires_at.is_some_and(|exp| exp > now);

                if unexpired && !same_owner {
                    return Err(Error::LockConflict(format!(
                        "job {job_id} is held by {lock_owner:?} until {expires_at:?}"
                    )));
                }
                if !unexpired && !same_owner && !force_clear_stale {
                    return Err(Error::LockConflict(format!(
                        "job {job_id} has a stale lock; retry with force_clear_stale_locks"
                    )));
                }

                let new_expires = now + chrono::Duration::from_std(lock_ttl).unwrap_or(chrono::Duration::seconds(900));
                conn.execute(
                    "UPDATE jobs SET status = 'running', lock_owner = ?1, lock_expires_at = ?2, total_rows = ?3 WHERE job_id = ?4",
                    params![owner, new_expires.to_rfc3339(), total_rows as i64, job_id],
                )
                .map_err(|e| Error::storage(e.to_string()))?;

                return Ok(Job {
                    job_id,
                    input_fingerprint: fingerprint.clone(),
                    total_rows,
                    processed_count: processed_count as u64,
                    status: JobStatus::Running,
                    lock_owner: Some(owner.to_string()),
                    lock_expires_at: Some(new_expires),
                    started_at: now,
                    completed_at: None,
                });
            }
        }

        let job_id = Uuid::new_v4().to_string();
        let expires_at = now + chrono::Duration::from_std(lock_ttl).unwrap_or(chrono::Duration::seconds(900));
        conn.execute(
            "INSERT INTO jobs (job_id, input_fingerprint, total_rows, processed_count, status, lock_owner, lock_expires_at, started_at, completed_at)
             VALUES (?1, ?2, ?3, 0, 'running', ?4, ?5, ?6, NULL)",
            params![job_id, fingerprint.0, total_rows as i64, owner, expires_at.to_rfc3339(), now.to_rfc3339()],
        )
        .map_err(|e| Error::storage(e.to_string()))?;

        Ok(Job {
            job_id,
            input_fingerprint: fingerprint.clone(),
            total_rows,
            processed_count: 0,
            status: JobStatus::Running,
            lock_owner: Some(owner.to_string()),
            lock_expires_at: Some(expires_at),
            started_at: now,
            completed_at: None,
        })
    }

    /// Returns the next `pending` batch, or creates one covering the
    /// next contiguous row range if none is pending and rows remain.
    pub fn next_pending_batch(&self, job_id: &str, batch_size: u64, total_rows: u64) -> Result<Option<Batch>> {
        self.with_conn(|conn| {
            if let Some(batch) = conn
                .query_row(
                    "SELECT batch_number, first_row, last_row, status, started_at, committed_at
                     FROM batches WHERE job_id = ?1 AND status = 'pending' ORDER BY batch_number ASC LIMIT 1",
                    params![job_id],
                    row_to_batch(job_id.to_string()),
                )
                .optional()?
            {
                return Ok(Some(batch));
            }

            let (max_last_row, batch_count): (i64, i64) = conn.query_row(
                "SELECT COALESCE(MAX(last_row), 0), COUNT(*) FROM batches WHERE job_id = ?1",
                params![job_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;

            if (max_last_row as u64) >= total_rows {
                return Ok(None);
            }

            let first_row = max_last_row as u64 + 1;
            let last_row = (first_row + batch_size - 1).min(total_rows);
            let batch_number = batch_count as u64 + 1;

            conn.execute(
                "INSERT INTO batches (job_id, batch_number, first_row, last_row, status, started_at, committed_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', NULL, NULL)",
                params![job_id, batch_number as i64, first_row as i64, last_row as i64],
            )?;

            Ok(Some(Batch {
                job_id: job_id.to_string(),
                batch_number,
                first_row,
                last_row,
                status: BatchStatus::Pending,
                started_at: None,
                committed_at: None,
            }))
        })
    }

    pub fn mark_batch_in_progress(&self, job_id: &str, batch_number: u64) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE batches SET status = 'in_progress', started_at = ?1 WHERE job_id = ?2 AND batch_number = ?3",
                params![Utc::now().to_rfc3339(), job_id, batch_number as i64],
            )?;
            Ok(())
        })
    }

    /// Atomically persists every `LeadResult` in the batch and advances
    /// `processed_count`. Either the whole batch commits or none of it
    /// does (spec §4.7).
    pub fn commit_batch(&self, job_id: &str, batch_number: u64, results: &[LeadResult]) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::internal("job store connection poisoned"))?;
        let tx = conn.unchecked_transaction().map_err(|e| Error::storage(e.to_string()))?;

        for result in results {
            let lead_fields = serde_json::to_string(&result.lead_fields).map_err(Error::from)?;
            let classification = result
                .classification
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(Error::from)?;

            tx.execute(
                "INSERT INTO lead_results (job_id, row_index, batch_number, lead_fields, classification, processing_status, error_kind, error_message, attempts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(job_id, row_index) DO UPDATE SET
                    batch_number = excluded.batch_number,
                    lead_fields = excluded.lead_fields,
                    classification = excluded.classification,
                    processing_status = excluded.processing_status,
                    error_kind = excluded.error_kind,
                    error_message = excluded.error_message,
                    attempts = excluded.attempts",
                params![
                    job_id,
                    result.row_index as i64,
                    batch_number as i64,
                    lead_fields,
                    classification,
                    processing_status_str(result.processing_status),
                    result.error_kind.map(|k| k.as_str()),
                    result.error_message,
                    result.attempts as i64,
                ],
            )
            .map_err(|e| Error::storage(e.to_string()))?;
        }

        tx.execute(
            "UPDATE batches SET status = 'committed', committed_at = ?1 WHERE job_id = ?2 AND batch_number = ?3",
            params![Utc::now().to_rfc3339(), job_id, batch_number as i64],
        )
        .map_err(|e| Error::storage(e.to_string()))?;

        tx.execute(
            "UPDATE jobs SET processed_count = processed_count + ?1 WHERE job_id = ?2",
            params![results.len() as i64, job_id],
        )
        .map_err(|e| Error::storage(e.to_string()))?;

        tx.commit().map_err(|e| Error::storage(e.to_string()))?;
        info!(job_id, batch_number, rows = results.len(), "committed batch");
        Ok(())
    }

    /// Commits only the rows of a batch that are actually ready, used by
    /// the Batch Runner when cooperative cancellation cuts a batch short
    /// (spec §4.8: "commit whatever partial results are ready as a
    /// smaller batch"). `committed_last_row` is the end of the
    /// contiguous run of completed rows starting at the batch's
    /// `first_row`; anything beyond it is re-queued as a new `pending`
    /// batch so no row is ever skipped on resume.
    pub fn commit_partial_batch(&self, job_id: &str, batch_number: u64, committed_last_row: u64, results: &[LeadResult]) -> Result<()> {
        let conn = self.conn.lock().map_err(|_| Error::internal("job store connection poisoned"))?;
        let tx = conn.unchecked_transaction().map_err(|e| Error::storage(e.to_string()))?;

        let (first_row, original_last_row): (i64, i64) = tx
            .query_row(
                "SELECT first_row, last_row FROM batches WHERE job_id = ?1 AND batch_number = ?2",
                params![job_id, batch_number as i64],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| Error::storage(e.to_string()))?;

        if committed_last_row < first_row as u64 {
            return Err(Error::internal("commit_partial_batch called with no rows to commit"));
        }

        for result in results {
            let lead_fields = serde_json::to_string(&result.lead_fields).map_err(Error::from)?;
            let classification = result
                .classification
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .map_err(Error::from)?;

            tx.execute(
                "INSERT INTO lead_results (job_id, row_index, batch_number, lead_fields, classification, processing_status, error_kind, error_message, attempts)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(job_id, row_index) DO UPDATE SET
                    batch_number = excluded.batch_number,
                    lead_fields = excluded.lead_fields,
                    classification = excluded.classification,
                    processing_status = excluded.processing_status,
                    error_kind = excluded.error_kind,
                    error_message = excluded.error_message,
                    attempts = excluded.attempts",
                params![
                    job_id,
                    result.row_index as i64,
                    batch_number as i64,
                    lead_fields,
                    classification,
                    processing_status_str(result.processing_status),
                    result.error_kind.map(|k| k.as_str()),
                    result.error_message,
                    result.attempts as i64,
                ],
            )
            .map_err(|e| Error::storage(e.to_string()))?;
        }

        tx.execute(
            "UPDATE batches SET last_row = ?1, status = 'committed', committed_at = ?2 WHERE job_id = ?3 AND batch_number = ?4",
            params![committed_last_row as i64, Utc::now().to_rfc3339(), job_id, batch_number as i64],
        )
        .map_err(|e| Error::storage(e.to_string()))?;

        if committed_last_row < original_last_row as u64 {
            let remainder_number: i64 = tx
                .query_row("SELECT COUNT(*) FROM batches WHERE job_id = ?1", params![job_id], |row| row.get(0))
                .map_err(|e| Error::storage(e.to_string()))?;
            tx.execute(
                "INSERT INTO batches (job_id, batch_number, first_row, last_row, status, started_at, committed_at)
                 VALUES (?1, ?2, ?3, ?4, 'pending', NULL, NULL)",
                params![job_id, remainder_number + 1, committed_last_row as i64 + 1, original_last_row],
            )
            .map_err(|e| Error::storage(e.to_string()))?;
        }

        tx.execute(
            "UPDATE jobs SET processed_count = processed_count + ?1 WHERE job_id = ?2",
            params![results.len() as i64, job_id],
        )
        .map_err(|e| Error::storage(e.to_string()))?;

        tx.commit().map_err(|e| Error::storage(e.to_string()))?;
        warn!(job_id, batch_number, committed_last_row, original_last_row, "committed a partial batch; remainder re-queued");
        Ok(())
    }

    /// Returns the next row to process and the number already committed,
    /// reclassifying any uncommitted `in_progress` batches back to
    /// `pending` so they are retried (conservative resume, spec §4.7).
    pub fn resume(&self, job_id: &str) -> Result<ResumeState> {
        self.with_conn(|conn| {
            let reverted = conn.execute(
                "UPDATE batches SET status = 'pending', started_at = NULL WHERE job_id = ?1 AND status = 'in_progress'",
                params![job_id],
            )?;
            if reverted > 0 {
                warn!(job_id, reverted, "reclassified in-progress batches as pending on resume");
            }

            let max_committed: i64 = conn.query_row(
                "SELECT COALESCE(MAX(last_row), 0) FROM batches WHERE job_id = ?1 AND status = 'committed'",
                params![job_id],
                |row| row.get(0),
            )?;

            let processed_count: i64 =
                conn.query_row("SELECT processed_count FROM jobs WHERE job_id = ?1", params![job_id], |row| row.get(0))?;

            Ok(ResumeState { next_row: max_committed as u64 + 1, processed_count: processed_count as u64 })
        })
    }

    pub fn finish_job(&self, job_id: &str, status: JobStatus) -> Result<()> {
        self.with_conn(|conn| {
            let completed_at = matches!(status, JobStatus::Completed | JobStatus::Failed | JobStatus::Archived)
                .then(|| Utc::now().to_rfc3339());
            conn.execute(
                "UPDATE jobs SET status = ?1, completed_at = ?2, lock_owner = NULL, lock_expires_at = NULL WHERE job_id = ?3",
                params![status.as_str(), completed_at, job_id],
            )?;
            Ok(())
        })
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        self.with_conn(|conn| {
            conn.query_row(
                "SELECT job_id, input_fingerprint, total_rows, processed_count, status, lock_owner, lock_expires_at, started_at, completed_at
                 FROM jobs WHERE job_id = ?1",
                params![job_id],
                |row| {
                    Ok(Job {
                        job_id: row.get(0)?,
                        input_fingerprint: InputFingerprint(row.get(1)?),
                        total_rows: row.get::<_, i64>(2)? as u64,
                        processed_count: row.get::<_, i64>(3)? as u64,
                        status: JobStatus::parse(&row.get::<_, String>(4)?).unwrap_or(JobStatus::Failed),
                        lock_owner: row.get(5)?,
                        lock_expires_at: row.get::<_, Option<String>>(6)?.as_deref().and_then(parse_ts),
                        started_at: parse_ts(&row.get::<_, String>(7)?).unwrap_or_else(Utc::now),
                        completed_at: row.get::<_, Option<String>>(8)?.as_deref().and_then(parse_ts),
                    })
                },
            )
            .optional()
        })
    }
}

fn row_to_batch(job_id: String) -> impl Fn(&rusqlite::Row) -> rusqlite::Result<Batch> {
    move |row| {
        Ok(Batch {
            job_id: job_id.clone(),
            batch_number: row.get::<_, i64>(0)? as u64,
            first_row: row.get::<_, i64>(1)? as u64,
            last_row: row.get::<_, i64>(2)? as u64,
            status: BatchStatus::parse(&row.get::<_, String>(3)?).unwrap_or(BatchStatus::Failed),
            started_at: row.get::<_, Option<String>>(4)?.as_deref().and_then(parse_ts),
            committed_at: row.get::<_, Option<String>>(5)?.as_deref().and_then(parse_ts),
        })
    }
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}

fn processing_status_str(status: ProcessingStatus) -> &'static str {
    match status {
        ProcessingStatus::Success => "success",
        ProcessingStatus::Failed => "failed",
        ProcessingStatus::Skipped => "skipped",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use leadscout_core::{Classification, Ethnicity, Method};
    use std::collections::HashMap as Map;

    fn fingerprint() -> InputFingerprint {
        InputFingerprint::compute("leads.xlsx", b"contents")
    }

    #[test]
    fn begin_job_creates_a_new_running_job() {
        let store = JobStore::in_memory().unwrap();
        let job = store.begin_job(&fingerprint(), 100, "owner-a", Duration::from_secs(900), false).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.processed_count, 0);
    }

    #[test]
    fn begin_job_conflicts_on_unexpired_foreign_lock() {
        let store = JobStore::in_memory().unwrap();
        store.begin_job(&fingerprint(), 100, "owner-a", Duration::from_secs(900), false).unwrap();
        let result = store.begin_job(&fingerprint(), 100, "owner-b", Duration::from_secs(900), false);
        assert!(matches!(result, Err(Error::LockConflict(_))));
    }

    #[test]
    fn same_owner_can_reacquire_its_own_lock() {
        let store = JobStore::in_memory().unwrap();
        let first = store.begin_job(&fingerprint(), 100, "owner-a", Duration::from_secs(900), false).unwrap();
        let second = store.begin_job(&fingerprint(), 100, "owner-a", Duration::from_secs(900), false).unwrap();
        assert_eq!(first.job_id, second.job_id);
    }

    #[test]
    fn next_pending_batch_partitions_rows_contiguously() {
        let store = JobStore::in_memory().unwrap();
        let job = store.begin_job(&fingerprint(), 25, "owner-a", Duration::from_secs(900), false).unwrap();

        let b1 = store.next_pending_batch(&job.job_id, 10, 25).unwrap().unwrap();
        assert_eq!((b1.first_row, b1.last_row), (1, 10));
        store.commit_batch(&job.job_id, b1.batch_number, &[]).unwrap();

        let b2 = store.next_pending_batch(&job.job_id, 10, 25).unwrap().unwrap();
        assert_eq!((b2.first_row, b2.last_row), (11, 20));
        store.commit_batch(&job.job_id, b2.batch_number, &[]).unwrap();

        let b3 = store.next_pending_batch(&job.job_id, 10, 25).unwrap().unwrap();
        assert_eq!((b3.first_row, b3.last_row), (21, 25));
        store.commit_batch(&job.job_id, b3.batch_number, &[]).unwrap();

        assert!(store.next_pending_batch(&job.job_id, 10, 25).unwrap().is_none());
    }

    #[test]
    fn commit_batch_persists_results_and_advances_processed_count() {
        let store = JobStore::in_memory().unwrap();
        let job = store.begin_job(&fingerprint(), 10, "owner-a", Duration::from_secs(900), false).unwrap();
        let batch = store.next_pending_batch(&job.job_id, 10, 10).unwrap().unwrap();

        let classification = Classification::new("Bongani", "bongani", Ethnicity::African, 0.9, Method::RuleBased, 1).unwrap();
        let results = vec![LeadResult::success(1, Map::new(), classification, 1)];
        store.commit_batch(&job.job_id, batch.batch_number, &results).unwrap();

        let updated = store.get_job(&job.job_id).unwrap().unwrap();
        assert_eq!(updated.processed_count, 1);
    }

    #[test]
    fn resume_reclassifies_in_progress_batches_as_pending() {
        let store = JobStore::in_memory().unwrap();
        let job = store.begin_job(&fingerprint(), 20, "owner-a", Duration::from_secs(900), false).unwrap();
        let batch = store.next_pending_batch(&job.job_id, 10, 20).unwrap().unwrap();
        store.mark_batch_in_progress(&job.job_id, batch.batch_number).unwrap();

        let state = store.resume(&job.job_id).unwrap();
        assert_eq!(state.next_row, 1);
        assert_eq!(state.processed_count, 0);

        let again = store.next_pending_batch(&job.job_id, 10, 20).unwrap().unwrap();
        assert_eq!(again.batch_number, batch.batch_number);
    }

    #[test]
    fn commit_partial_batch_requeues_the_remainder() {
        let store = JobStore::in_memory().unwrap();
        let job = store.begin_job(&fingerprint(), 10, "owner-a", Duration::from_secs(900), false).unwrap();
        let batch = store.next_pending_batch(&job.job_id, 10, 10).unwrap().unwrap();

        let classification = Classification::new("Bongani", "bongani", Ethnicity::African, 0.9, Method::RuleBased, 1).unwrap();
        let results = vec![LeadResult::success(1, Map::new(), classification.clone(), 1), LeadResult::success(2, Map::new(), classification, 1)];
        store.commit_partial_batch(&job.job_id, batch.batch_number, 2, &results).unwrap();

        let remainder = store.next_pending_batch(&job.job_id, 10, 10).unwrap().unwrap();
        assert_eq!((remainder.first_row, remainder.last_row), (3, 10));

        let updated = store.get_job(&job.job_id).unwrap().unwrap();
        assert_eq!(updated.processed_count, 2);
    }
}
