//! Command-line entry point. Wires `Config`, the Job Store, the
//! Learning Store, the Dictionary Store, the LLM Adapter, the
//! Classifier Pipeline, and the Batch Runner together, then drives one
//! input spreadsheet/CSV through to completion.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use leadscout_batch::{BatchRunner, LeadSink, LeadSource, RunOutcome, RunnerConfig};
use leadscout_classifier::{ClassifierLayer, ClassifierPipeline, DictionaryLayer, LearningLayer, LlmLayer, PatternExtractor, PhoneticMatcher};
use leadscout_core::error::Error;
use leadscout_core::{Config, LlmProvider};
use leadscout_dictionary::DictionaryStore;
use leadscout_io::{fingerprint_file, CsvLeadSink, CsvLeadSource, XlsxLeadSink, XlsxLeadSource};
use leadscout_jobs::JobStore;
use leadscout_learning::LearningStore;
use leadscout_llm::{AnthropicClient, ClientConfig, LLMClient, LLMRouter, NullClient, OpenAiClient, RetryConfig};

const BREAKER_FAILURE_THRESHOLD: u32 = 3;
const BREAKER_COOLDOWN: Duration = Duration::from_secs(60);
const ANTHROPIC_MODEL: &str = "claude-3-haiku-20240307";
const OPENAI_MODEL: &str = "gpt-4o-mini";

/// Classify director names in a spreadsheet or CSV of South African
/// business leads into a broad ethnicity category.
#[derive(Parser, Debug)]
#[command(name = "leadscout", version, about)]
struct Cli {
    /// Input file (.xlsx or .csv), must contain a `director_name` column.
    input: PathBuf,

    /// Output file. Defaults to the input path with a `.out` suffix
    /// before the extension.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Treat the input as a company-registry export (requires a
    /// `registration_number` column) rather than a plain lead list.
    #[arg(long)]
    registry: bool,

    /// SQLite database backing the Job Store.
    #[arg(long, default_value = "leadscout-jobs.db")]
    jobs_db: PathBuf,

    /// SQLite database backing the Learning Store.
    #[arg(long, default_value = "leadscout-learning.db")]
    learning_db: PathBuf,

    /// Identity used to acquire the job lock; defaults to the process id.
    #[arg(long)]
    owner: Option<String>,

    /// Rows classified per committed batch.
    #[arg(long)]
    batch_size: Option<usize>,

    /// Maximum leads classified concurrently within a batch.
    #[arg(long)]
    max_concurrent_leads: Option<usize>,

    /// Force-clear a stale lock from a crashed prior run instead of
    /// failing with exit code 3.
    #[arg(long)]
    force_clear_stale_locks: bool,

    /// Disable the LLM fallback layer even if provider credentials are
    /// configured.
    #[arg(long)]
    no_llm: bool,

    /// Suppress the progress bar.
    #[arg(long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            error!(error = %err, "leadscout failed");
            eprintln!("error: {err}");
            exit_code_for(&err)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let mut config = Config::from_env()?;
    if cli.no_llm {
        config.llm_enabled = false;
    }
    if let Some(batch_size) = cli.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(max_concurrent) = cli.max_concurrent_leads {
        config.max_concurrent_leads = max_concurrent;
    }
    if cli.force_clear_stale_locks {
        config.force_clear_stale_locks = true;
    }

    let owner = cli.owner.clone().unwrap_or_else(|| format!("leadscout-cli-{}", std::process::id()));

    let jobs = Arc::new(JobStore::open(&cli.jobs_db)?);
    let learning = Arc::new(LearningStore::open(&cli.learning_db)?);
    let dictionary = DictionaryStore::new();

    let router = Arc::new(build_router(&config));
    let pattern_extractor = Arc::new(PatternExtractor::new(Arc::clone(&learning)));

    let layers: Vec<Box<dyn ClassifierLayer>> = vec![
        Box::new(DictionaryLayer::new(dictionary)),
        Box::new(PhoneticMatcher::new(Arc::clone(&learning))),
        Box::new(LearningLayer::new(Arc::clone(&learning))),
        Box::new(LlmLayer::new(router, Arc::clone(&learning))),
    ];
    let pipeline = Arc::new(ClassifierPipeline::new(layers, Some(pattern_extractor)));

    let mut runner_config = RunnerConfig::new(owner);
    runner_config.batch_size = config.batch_size as u64;
    runner_config.max_concurrent_leads = config.max_concurrent_leads;
    runner_config.lock_ttl = config.lock_ttl();
    runner_config.force_clear_stale_lock = config.force_clear_stale_locks;

    let (runner, progress_rx) = BatchRunner::new(jobs, pipeline, runner_config);

    let fingerprint = fingerprint_file(&cli.input)?;
    let output_path = cli.output.clone().unwrap_or_else(|| default_output_path(&cli.input));

    let progress_bar = (!cli.quiet).then(|| spawn_progress_bar(progress_rx));
    let cancellation = install_cancellation_handler();

    let outcome = match extension_of(&cli.input).as_str() {
        "csv" if cli.registry => {
            let source = leadscout_io::CompanyRegistrySource::open(&cli.input)?;
            let sink = CsvLeadSink::create(output_path);
            run_with(&runner, fingerprint, source, sink, cancellation).await?
        }
        "csv" => {
            let source = CsvLeadSource::open(&cli.input)?;
            let sink = CsvLeadSink::create(output_path);
            run_with(&runner, fingerprint, source, sink, cancellation).await?
        }
        "xlsx" => {
            let source = XlsxLeadSource::open(&cli.input)?;
            let sink = XlsxLeadSink::create(output_path);
            run_with(&runner, fingerprint, source, sink, cancellation).await?
        }
        other => {
            return Err(Error::invalid_input(format!("unsupported input extension '{other}', expected .csv or .xlsx")).into());
        }
    };

    if let Some(bar) = progress_bar {
        bar.finish_and_clear();
    }

    info!(
        job_id = %outcome.job_id,
        processed = outcome.processed,
        total = outcome.total_rows,
        outcome = ?outcome.outcome,
        success = outcome.stats.success,
        failed = outcome.stats.failed,
        skipped = outcome.stats.skipped,
        llm_calls = outcome.stats.llm_calls,
        llm_cost = outcome.stats.llm_cost,
        "run finished"
    );
    println!(
        "processed {}/{} rows: {} success, {} failed, {} skipped ({} LLM calls, ${:.4} LLM cost)",
        outcome.processed,
        outcome.total_rows,
        outcome.stats.success,
        outcome.stats.failed,
        outcome.stats.skipped,
        outcome.stats.llm_calls,
        outcome.stats.llm_cost,
    );

    Ok(match outcome.outcome {
        RunOutcome::Completed => ExitCode::from(0),
        RunOutcome::Cancelled => ExitCode::from(5),
        RunOutcome::Retriable { reason } => {
            eprintln!("run stopped, retry later: {reason}");
            ExitCode::from(4)
        }
    })
}

async fn run_with<S: LeadSource, K: LeadSink>(
    runner: &BatchRunner,
    fingerprint: leadscout_core::InputFingerprint,
    source: S,
    sink: K,
    cancellation: CancellationToken,
) -> anyhow::Result<leadscout_batch::RunSummary> {
    Ok(runner.run(fingerprint, source, sink, cancellation).await?)
}

fn build_router(config: &Config) -> LLMRouter {
    let clients: Vec<Arc<dyn LLMClient>> = config
        .llm_providers
        .iter()
        .map(|provider| build_client(*provider, config))
        .collect();
    LLMRouter::new(
        clients,
        &config.llm_per_provider_rpm,
        &config.llm_per_provider_max_concurrent,
        RetryConfig { max_attempts: config.retry_max_attempts, ..RetryConfig::default() },
        BREAKER_FAILURE_THRESHOLD,
        BREAKER_COOLDOWN,
    )
}

fn build_client(provider: LlmProvider, config: &Config) -> Arc<dyn LLMClient> {
    if !config.llm_enabled {
        return Arc::new(NullClient::new(provider.as_str()));
    }
    let timeout = config.llm_request_timeout();
    match provider {
        LlmProvider::Anthropic => match std::env::var("ANTHROPIC_API_KEY") {
            Ok(key) => Arc::new(AnthropicClient::new(ClientConfig::new(key, ANTHROPIC_MODEL, timeout))),
            Err(_) => Arc::new(NullClient::new("anthropic")),
        },
        LlmProvider::OpenAi => match std::env::var("OPENAI_API_KEY") {
            Ok(key) => Arc::new(OpenAiClient::new(ClientConfig::new(key, OPENAI_MODEL, timeout))),
            Err(_) => Arc::new(NullClient::new("openai")),
        },
    }
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("leads");
    let ext = input.extension().and_then(|s| s.to_str()).unwrap_or("csv");
    input.with_file_name(format!("{stem}.out.{ext}"))
}

fn extension_of(path: &Path) -> String {
    path.extension().and_then(|s| s.to_str()).unwrap_or_default().to_ascii_lowercase()
}

fn spawn_progress_bar(mut progress_rx: tokio::sync::watch::Receiver<leadscout_batch::Progress>) -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} ({percent}%) eta {eta}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    tokio::spawn(async move {
        while progress_rx.changed().await.is_ok() {
            let snapshot = *progress_rx.borrow();
            bar.set_length(snapshot.total);
            bar.set_position(snapshot.processed);
        }
    });
    bar
}

fn install_cancellation_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let signalled = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signalled.cancel();
        }
    });
    token
}

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<Error>() {
        Some(Error::InvalidInput(_)) => ExitCode::from(2),
        Some(Error::LockConflict(_)) => ExitCode::from(3),
        Some(_) => ExitCode::from(4),
        None => ExitCode::from(4),
    }
}
