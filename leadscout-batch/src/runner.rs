//! Batch Runner: end-to-end job orchestration (spec §4.8).

use std::sync::Arc;
use std::time::{Duration, Instant};

use leadscout_classifier::ClassifierPipeline;
use leadscout_core::{Classification, Error, ErrorKind, Ethnicity, InputFingerprint, JobStatus, Lead, LeadResult, Method, Result};
use leadscout_jobs::JobStore;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use crate::progress::{Progress, ProgressEmitter};
use crate::source::{LeadSink, LeadSource};

/// Tunables for one `BatchRunner::run` invocation (spec §6 configuration
/// options, scoped to the runner).
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub batch_size: u64,
    pub max_concurrent_leads: usize,
    pub owner: String,
    pub lock_ttl: Duration,
    pub force_clear_stale_lock: bool,
    pub progress_interval: Duration,
    pub cancellation_grace_period: Duration,
}

impl RunnerConfig {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            batch_size: 100,
            max_concurrent_leads: 10,
            owner: owner.into(),
            lock_ttl: Duration::from_secs(900),
            force_clear_stale_lock: false,
            progress_interval: ProgressEmitter::DEFAULT_MIN_INTERVAL,
            cancellation_grace_period: Duration::from_secs(10),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Every row of the input has a committed result.
    Completed,
    /// Cooperative cancellation was observed; any completed work before
    /// the grace period elapsed is durably committed.
    Cancelled,
    /// An unrecoverable error (e.g. a Job Store commit failure) stopped
    /// the run. The affected batch was left uncommitted and will be
    /// retried from the next `run` call.
    Retriable { reason: String },
}

/// Per-row outcome counts and LLM utilization for one `run` call (spec
/// §7: "the runner always reports per-row outcomes and a final summary
/// including counts of {success, failed, skipped} and LLM utilization
/// statistics").
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunStats {
    pub success: u64,
    pub failed: u64,
    pub skipped: u64,
    pub llm_calls: u64,
    pub llm_cost: f64,
}

impl RunStats {
    fn record(&mut self, result: &LeadResult) {
        match result.processing_status {
            leadscout_core::ProcessingStatus::Success => self.success += 1,
            leadscout_core::ProcessingStatus::Failed => self.failed += 1,
            leadscout_core::ProcessingStatus::Skipped => self.skipped += 1,
        }
        if let Some(classification) = &result.classification {
            if classification.method == Method::Llm {
                self.llm_calls += 1;
                self.llm_cost += classification.cost.unwrap_or(0.0);
            }
        }
    }

    fn accumulate(&mut self, results: &[LeadResult]) {
        for result in results {
            self.record(result);
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub job_id: String,
    pub processed: u64,
    pub total_rows: u64,
    pub outcome: RunOutcome,
    pub elapsed: Duration,
    pub stats: RunStats,
}

pub struct BatchRunner {
    jobs: Arc<JobStore>,
    pipeline: Arc<ClassifierPipeline>,
    config: RunnerConfig,
    progress_tx: watch::Sender<Progress>,
}

impl BatchRunner {
    /// Builds a runner together with a `Progress` receiver a caller can
    /// subscribe to (e.g. the CLI driving a progress bar) for the whole
    /// lifetime of the runner, across however many `run` calls it makes.
    pub fn new(jobs: Arc<JobStore>, pipeline: Arc<ClassifierPipeline>, config: RunnerConfig) -> (Self, watch::Receiver<Progress>) {
        let (progress_tx, progress_rx) = watch::channel(Progress::starting(0));
        (Self { jobs, pipeline, config, progress_tx }, progress_rx)
    }

    /// Runs (or resumes) one job to completion, cancellation, or a
    /// retriable stop.
    #[instrument(skip(self, source, sink, cancellation), fields(owner = %self.config.owner))]
    pub async fn run<S: LeadSource, K: LeadSink>(
        &self,
        fingerprint: InputFingerprint,
        mut source: S,
        mut sink: K,
        cancellation: CancellationToken,
    ) -> Result<RunSummary> {
        let started = Instant::now();
        let total_rows = source.total_rows();

        let job = self.jobs.begin_job(&fingerprint, total_rows, &self.config.owner, self.config.lock_ttl, self.config.force_clear_stale_lock)?;
        let resume_state = self.jobs.resume(&job.job_id)?;
        source.seek(resume_state.next_row).await?;

        let mut emitter = ProgressEmitter::with_sender(total_rows, self.config.progress_interval, self.progress_tx.clone());
        let mut processed = resume_state.processed_count;
        let mut stats = RunStats::default();
        emitter.report(processed, total_rows, resume_state.next_row.saturating_sub(1), true);

        loop {
            if cancellation.is_cancelled() {
                info!(job_id = %job.job_id, "cancellation observed before starting the next batch");
                return Ok(self.stop(job.job_id, processed, total_rows, RunOutcome::Cancelled, started, stats));
            }

            let Some(batch) = self.jobs.next_pending_batch(&job.job_id, self.config.batch_size, total_rows)? else {
                break;
            };
            self.jobs.mark_batch_in_progress(&job.job_id, batch.batch_number)?;

            let batch_len = (batch.last_row - batch.first_row + 1) as usize;
            let mut leads = Vec::with_capacity(batch_len);
            while leads.len() < batch_len {
                match source.next_lead().await? {
                    Some(lead) => leads.push(lead),
                    None => break,
                }
            }

            let results = self.run_batch(leads, &cancellation).await;

            let Some(contiguous_last_row) = contiguous_from(batch.first_row, &results) else {
                let outcome = if cancellation.is_cancelled() {
                    info!(job_id = %job.job_id, batch_number = batch.batch_number, "no rows completed before cancellation; batch left in_progress for retry");
                    RunOutcome::Cancelled
                } else {
                    warn!(job_id = %job.job_id, batch_number = batch.batch_number, "source yielded no usable rows for a pending batch");
                    RunOutcome::Retriable { reason: "batch produced no results".to_string() }
                };
                return Ok(self.stop(job.job_id, processed, total_rows, outcome, started, stats));
            };
            let is_partial = contiguous_last_row != batch.last_row || results.len() != batch_len;
            let to_commit: Vec<LeadResult> = if is_partial {
                results.into_iter().filter(|r| r.row_index <= contiguous_last_row).collect()
            } else {
                results
            };

            let commit_result = if is_partial {
                self.jobs.commit_partial_batch(&job.job_id, batch.batch_number, contiguous_last_row, &to_commit)
            } else {
                self.jobs.commit_batch(&job.job_id, batch.batch_number, &to_commit)
            };

            if let Err(err) = commit_result {
                warn!(job_id = %job.job_id, batch_number = batch.batch_number, error = %err, "batch commit failed; batch remains pending for retry");
                return Ok(self.stop(job.job_id, processed, total_rows, RunOutcome::Retriable { reason: err.to_string() }, started, stats));
            }

            stats.accumulate(&to_commit);

            if let Err(err) = sink.write_batch(&to_commit).await {
                warn!(job_id = %job.job_id, batch_number = batch.batch_number, error = %err, "sink write failed after a durable commit");
                processed += to_commit.len() as u64;
                return Ok(self.stop(job.job_id, processed, total_rows, RunOutcome::Retriable { reason: err.to_string() }, started, stats));
            }

            processed += to_commit.len() as u64;
            emitter.report(processed, total_rows, contiguous_last_row, true);

            if is_partial {
                return Ok(self.stop(job.job_id, processed, total_rows, RunOutcome::Cancelled, started, stats));
            }
        }

        self.jobs.finish_job(&job.job_id, JobStatus::Completed)?;
        Ok(RunSummary { job_id: job.job_id, processed, total_rows, outcome: RunOutcome::Completed, elapsed: started.elapsed(), stats })
    }

    #[allow(clippy::too_many_arguments)]
    fn stop(&self, job_id: String, processed: u64, total_rows: u64, outcome: RunOutcome, started: Instant, stats: RunStats) -> RunSummary {
        RunSummary { job_id, processed, total_rows, outcome, elapsed: started.elapsed(), stats }
    }

    /// Classifies `leads` concurrently, bounded by `max_concurrent_leads`.
    /// On cancellation, stops waiting for stragglers after
    /// `cancellation_grace_period` and aborts whatever is still running;
    /// whatever finished by then is returned.
    async fn run_batch(&self, leads: Vec<Lead>, cancellation: &CancellationToken) -> Vec<LeadResult> {
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_leads));
        let mut set = JoinSet::new();
        for lead in leads {
            let semaphore = Arc::clone(&semaphore);
            let pipeline = Arc::clone(&self.pipeline);
            set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore closed while a batch was in flight");
                classify_one(&pipeline, lead).await
            });
        }

        let mut results = Vec::new();
        let mut deadline: Option<Instant> = None;

        loop {
            let next = match deadline {
                Some(dl) => match tokio::time::timeout_at(dl.into(), set.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        set.abort_all();
                        break;
                    }
                },
                None => tokio::select! {
                    biased;
                    _ = cancellation.cancelled() => {
                        deadline = Some(Instant::now() + self.config.cancellation_grace_period);
                        continue;
                    }
                    next = set.join_next() => next,
                },
            };

            match next {
                Some(Ok(result)) => results.push(result),
                Some(Err(_)) => {} // task panicked; row is retried next run since it's absent from `results`
                None => break,
            }
        }

        // `JoinSet::join_next` yields in completion order, not spawn
        // order; restore `row_index` order before the caller commits or
        // writes these (spec §5, §8: commit order preserves row index).
        results.sort_by_key(|r| r.row_index);
        results
    }
}

async fn classify_one(pipeline: &ClassifierPipeline, lead: Lead) -> LeadResult {
    let row_index = lead.row_index;
    let fields = lead.fields.clone();
    match pipeline.classify(&lead.director_name).await {
        Ok(classification) if is_llm_unavailable(&classification) => {
            LeadResult::failed(row_index, fields, classification, ErrorKind::LlmUnavailable, "all configured LLM providers are unavailable", 1)
        }
        Ok(classification) => LeadResult::success(row_index, fields, classification, 1),
        Err(err) => LeadResult::skipped(row_index, fields, error_kind_for(&err), err.to_string()),
    }
}

fn is_llm_unavailable(classification: &Classification) -> bool {
    classification.method == Method::Llm && classification.confidence == 0.0 && classification.ethnicity == Ethnicity::Unknown
}

fn error_kind_for(err: &Error) -> ErrorKind {
    match err {
        Error::InvalidInput(_) => ErrorKind::InvalidInput,
        Error::SchemaViolation(_) | Error::ConfidenceOutOfRange { .. } | Error::Serialization(_) => ErrorKind::SchemaViolation,
        Error::LlmUnavailable(_) => ErrorKind::LlmUnavailable,
        Error::Storage(_) | Error::LockConflict(_) | Error::Config(_) | Error::Internal(_) => ErrorKind::StorageError,
    }
}

/// The end of the contiguous run of row indices starting at `first_row`
/// present in `results`, or `None` if `first_row` itself is missing.
fn contiguous_from(first_row: u64, results: &[LeadResult]) -> Option<u64> {
    let mut rows: Vec<u64> = results.iter().map(|r| r.row_index).collect();
    rows.sort_unstable();
    rows.dedup();

    let mut last = None;
    let mut expect = first_row;
    for row in rows {
        if row == expect {
            last = Some(row);
            expect += 1;
        } else if row > expect {
            break;
        }
    }
    last
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::test_support::{VecLeadSink, VecLeadSource};
    use leadscout_classifier::{ClassifierLayer, ClassifierPipeline};
    use leadscout_core::phonetic::PhoneticCode;
    use async_trait::async_trait;

    struct StubLayer;
    #[async_trait]
    impl ClassifierLayer for StubLayer {
        async fn try_classify(&self, original_name: &str, normalized_name: &str, _codes: &PhoneticCode) -> Option<Classification> {
            Classification::new(original_name, normalized_name, Ethnicity::African, 0.9, Method::RuleBased, 0).ok()
        }
        fn layer_name(&self) -> &'static str {
            "stub"
        }
    }

    fn runner() -> BatchRunner {
        let jobs = Arc::new(JobStore::in_memory().unwrap());
        let pipeline = Arc::new(ClassifierPipeline::new(vec![Box::new(StubLayer)], None));
        BatchRunner::new(jobs, pipeline, RunnerConfig::new("test-owner")).0
    }

    fn leads(n: u64) -> Vec<Lead> {
        (1..=n).map(|i| Lead::new(i, format!("Director {i}"))).collect()
    }

    #[tokio::test]
    async fn runs_a_small_job_to_completion() {
        let runner = runner();
        let source = VecLeadSource::new(leads(5));
        let sink = VecLeadSink::default();
        let fingerprint = InputFingerprint::compute("leads.xlsx", b"five-rows");

        let summary = runner.run(fingerprint, source, sink, CancellationToken::new()).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.processed, 5);
        assert_eq!(summary.stats.success, 5);
        assert_eq!(summary.stats.failed, 0);
        assert_eq!(summary.stats.skipped, 0);
    }

    #[tokio::test]
    async fn stats_count_skipped_rows_with_invalid_input() {
        let runner = runner();
        let mut rows = leads(3);
        rows[1].director_name = "   ".to_string(); // whitespace-only, rejected by normalize
        let source = VecLeadSource::new(rows);
        let sink = VecLeadSink::default();
        let fingerprint = InputFingerprint::compute("leads.xlsx", b"three-rows-one-blank");

        let summary = runner.run(fingerprint, source, sink, CancellationToken::new()).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.stats.success, 2);
        assert_eq!(summary.stats.skipped, 1);
    }

    #[tokio::test]
    async fn resumes_from_processed_count_not_batch_index() {
        // Simulate a prior run that committed rows 1-4 with batch_size=4,
        // then resume with a *different* batch_size and confirm the
        // remaining rows (5-10) are processed exactly once, with no gaps.
        let jobs = JobStore::in_memory().unwrap();
        let fingerprint = InputFingerprint::compute("leads.xlsx", b"ten-rows");
        let job = jobs.begin_job(&fingerprint, 10, "owner-a", Duration::from_secs(900), false).unwrap();
        let first_batch = jobs.next_pending_batch(&job.job_id, 4, 10).unwrap().unwrap();
        assert_eq!((first_batch.first_row, first_batch.last_row), (1, 4));

        let classification = Classification::new("Director 1", "director 1", Ethnicity::African, 0.9, Method::RuleBased, 0).unwrap();
        let prior_results: Vec<LeadResult> =
            (1..=4).map(|i| LeadResult::success(i, std::collections::HashMap::new(), classification.clone(), 1)).collect();
        jobs.commit_batch(&job.job_id, first_batch.batch_number, &prior_results).unwrap();

        let jobs = Arc::new(jobs);
        let pipeline = Arc::new(ClassifierPipeline::new(vec![Box::new(StubLayer)], None));
        let mut config = RunnerConfig::new("owner-a");
        config.batch_size = 3;
        let (runner, _progress_rx) = BatchRunner::new(Arc::clone(&jobs), pipeline, config);

        let source = VecLeadSource::new(leads(10));
        let sink = VecLeadSink::default();
        let summary = runner.run(fingerprint, source, sink, CancellationToken::new()).await.unwrap();

        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(summary.processed, 10);
        let job_after = jobs.get_job(&summary.job_id).unwrap().unwrap();
        assert_eq!(job_after.processed_count, 10);
    }

    #[tokio::test]
    async fn stops_cooperatively_when_cancelled_before_the_next_batch() {
        let jobs = Arc::new(JobStore::in_memory().unwrap());
        let pipeline = Arc::new(ClassifierPipeline::new(vec![Box::new(StubLayer)], None));
        let mut config = RunnerConfig::new("test-owner");
        config.batch_size = 2;
        let (runner, _progress_rx) = BatchRunner::new(jobs, pipeline, config);

        let source = VecLeadSource::new(leads(4));
        let sink = VecLeadSink::default();
        let token = CancellationToken::new();
        token.cancel();
        let fingerprint = InputFingerprint::compute("leads.xlsx", b"four-rows");

        let summary = runner.run(fingerprint, source, sink, token).await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::Cancelled);
        assert_eq!(summary.processed, 0);
    }

    #[tokio::test]
    async fn progress_receiver_observes_forced_updates() {
        let jobs = Arc::new(JobStore::in_memory().unwrap());
        let pipeline = Arc::new(ClassifierPipeline::new(vec![Box::new(StubLayer)], None));
        let (runner, progress_rx) = BatchRunner::new(jobs, pipeline, RunnerConfig::new("test-owner"));

        let source = VecLeadSource::new(leads(3));
        let sink = VecLeadSink::default();
        let fingerprint = InputFingerprint::compute("leads.xlsx", b"three-rows");

        let summary = runner.run(fingerprint, source, sink, CancellationToken::new()).await.unwrap();
        assert_eq!(summary.outcome, RunOutcome::Completed);
        assert_eq!(progress_rx.borrow().processed, 3);
        assert_eq!(progress_rx.borrow().total, 3);
    }
}
