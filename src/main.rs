//! Page-Audit main entry point
//!
//! This is the command-line interface for the Page-Audit page auditor.

use anyhow::Context;
use clap::{Parser, Subcommand};
use page_audit::config::{load_config_with_hash, validate, Config};
use page_audit::jobs::{JobError, JobOrchestrator, DEFAULT_STOP_REASON};
use page_audit::storage::{
    open_storage, CrawlResult, JobStore, ListQuery, ResultStore, SortOrder, SqliteStorage,
    UrlSort, UrlStore,
};
use page_audit::{normalize_url, resolve_targets, AuditError, CrawlEngine, JobStatus};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Message recorded on jobs stopped by Ctrl-C
const INTERRUPTED_REASON: &str = "Interrupted";

/// Page-Audit: structural page audits with link checks
///
/// Page-Audit fetches single web pages, records their HTML version, title,
/// heading counts, link counts and login forms, and checks every link on
/// the page for accessibility.
#[derive(Parser, Debug)]
#[command(name = "page-audit")]
#[command(version = "1.0.0")]
#[command(about = "Single-page structural audits with link checks", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply when omitted)
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the database path from the configuration
    #[arg(long, global = true, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register one or more URLs
    Add {
        #[arg(required = true)]
        urls: Vec<String>,
    },

    /// List registered URLs
    List {
        #[arg(long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = 20)]
        limit: u32,

        /// One of id, url, created_at, updated_at
        #[arg(long, default_value = "created_at")]
        sort: String,

        /// asc or desc
        #[arg(long, default_value = "desc")]
        order: String,
    },

    /// Crawl registered URLs by ID
    Crawl {
        #[arg(required = true)]
        url_ids: Vec<i64>,

        /// Print the job IDs and return once in-flight jobs finished;
        /// jobs still waiting in the queue stay queued
        #[arg(long)]
        no_wait: bool,
    },

    /// Show the status of a job
    Status { job_id: i64 },

    /// Stop the latest job of each URL
    Stop {
        #[arg(required = true)]
        url_ids: Vec<i64>,

        #[arg(long)]
        reason: Option<String>,
    },

    /// Show the latest result for a URL, or the result of one job
    Result {
        url_id: Option<i64>,

        #[arg(long, conflicts_with = "url_id")]
        job: Option<i64>,
    },

    /// Show every job of a URL, newest first
    History { url_id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    let mut config = load(cli.config.as_deref())?;
    if let Some(database) = &cli.database {
        config.storage.database_path = database.display().to_string();
    }

    let storage = Arc::new(
        open_storage(Path::new(&config.storage.database_path))
            .with_context(|| format!("failed to open database {}", config.storage.database_path))?,
    );

    let outcome = match cli.command {
        Command::Add { urls } => handle_add(&storage, &urls).await,
        Command::List {
            page,
            limit,
            sort,
            order,
        } => handle_list(&storage, page, limit, &sort, &order).await,
        Command::Crawl { url_ids, no_wait } => handle_crawl(&config, storage, &url_ids, no_wait).await,
        Command::Status { job_id } => handle_status(&storage, job_id).await,
        Command::Stop { url_ids, reason } => handle_stop(&config, storage, &url_ids, reason).await,
        Command::Result { url_id, job } => handle_result(&storage, url_id, job).await,
        Command::History { url_id } => handle_history(&storage, url_id).await,
    };
    outcome?;
    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("page_audit=info,warn"),
            1 => EnvFilter::new("page_audit=debug,info"),
            2 => EnvFilter::new("page_audit=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Loads the configuration file, or the validated defaults without one
fn load(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        let config = Config::default();
        validate(&config)?;
        return Ok(config);
    };

    tracing::info!("Loading configuration from: {}", path.display());
    let (config, hash) = load_config_with_hash(path)
        .with_context(|| format!("failed to load configuration {}", path.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);
    Ok(config)
}

async fn handle_add(storage: &SqliteStorage, urls: &[String]) -> page_audit::Result<()> {
    for raw in urls {
        let url = normalize_url(raw)?;
        let record = UrlStore::register(storage, url.as_str()).await?;
        println!("{}\t{}", record.id, record.url);
    }
    Ok(())
}

async fn handle_list(
    storage: &SqliteStorage,
    page: u32,
    limit: u32,
    sort: &str,
    order: &str,
) -> page_audit::Result<()> {
    let query = ListQuery {
        page,
        limit,
        sort: UrlSort::parse(sort).unwrap_or_default(),
        order: SortOrder::parse(order).unwrap_or_default(),
    };
    let page = UrlStore::list(storage, query).await?;

    println!(
        "URLs (page {}, {} per page, {} total)",
        page.page, page.limit, page.total
    );
    for record in &page.items {
        println!(
            "  {}\t{}\t{}",
            record.id,
            record.url,
            record.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

/// Starts one job per URL and follows them to a terminal state
async fn handle_crawl(
    config: &Config,
    storage: Arc<SqliteStorage>,
    url_ids: &[i64],
    no_wait: bool,
) -> page_audit::Result<()> {
    let targets = resolve_targets(storage.as_ref(), url_ids).await?;

    let engine = Arc::new(CrawlEngine::from_config(config)?);
    let orchestrator = JobOrchestrator::new(&config.pool, storage.clone(), storage.clone(), engine);

    let interrupted = CancellationToken::new();
    {
        let interrupted = interrupted.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                interrupted.cancel();
            }
        });
    }

    // A failed start has already stopped the jobs queued before it; the
    // pool still has to drain before returning.
    let jobs = match orchestrator
        .start_batch(&targets, &interrupted, INTERRUPTED_REASON)
        .await
    {
        Ok(jobs) => jobs,
        Err(err) => {
            orchestrator.shutdown().await;
            return Err(err.into());
        }
    };
    for ((_, url), (_, job_id)) in targets.iter().zip(&jobs) {
        println!("Queued job {} for {}", job_id, url);
    }

    if !no_wait {
        wait_for_jobs(&orchestrator, &jobs, &interrupted).await?;
    }

    orchestrator.shutdown().await;

    if !no_wait {
        for &(url_id, job_id) in &jobs {
            let view = orchestrator.status(job_id).await?;
            println!("Job {} ({}): {}", job_id, url_id, view.status);
            if let Some(error) = &view.error {
                println!("  {}", error);
            }
            if view.status == JobStatus::Completed {
                if let Some(result) = ResultStore::for_job(storage.as_ref(), job_id).await? {
                    print_result(&result);
                }
            }
        }
    }

    Ok(())
}

/// Polls until every job is terminal; Ctrl-C stops the remaining ones
async fn wait_for_jobs(
    orchestrator: &JobOrchestrator,
    jobs: &[(i64, i64)],
    interrupted: &CancellationToken,
) -> page_audit::Result<()> {
    loop {
        let mut pending = Vec::new();
        for &(url_id, job_id) in jobs {
            if !orchestrator.status(job_id).await?.status.is_terminal() {
                pending.push(url_id);
            }
        }
        if pending.is_empty() {
            return Ok(());
        }

        tokio::select! {
            _ = interrupted.cancelled() => {
                tracing::warn!("Interrupted, stopping {} jobs", pending.len());
                orchestrator.stop_with_reason(&pending, INTERRUPTED_REASON).await?;
                return Ok(());
            }
            _ = tokio::time::sleep(Duration::from_millis(250)) => {}
        }
    }
}

async fn handle_status(storage: &SqliteStorage, job_id: i64) -> page_audit::Result<()> {
    let Some(job) = JobStore::get(storage, job_id).await? else {
        return Err(JobError::NotFound(job_id).into());
    };

    println!("Job {} (URL {}): {}", job.id, job.url_id, job.status);
    println!("  created:   {}", job.created_at);
    if let Some(started) = job.started_at {
        println!("  started:   {}", started);
    }
    if let Some(completed) = job.completed_at {
        println!("  completed: {}", completed);
    }
    if let Some(error) = &job.error_message {
        println!("  error:     {}", error);
    }
    Ok(())
}

async fn handle_stop(
    config: &Config,
    storage: Arc<SqliteStorage>,
    url_ids: &[i64],
    reason: Option<String>,
) -> page_audit::Result<()> {
    let engine = Arc::new(CrawlEngine::from_config(config)?);
    let orchestrator = JobOrchestrator::new(&config.pool, storage.clone(), storage, engine);

    let reason = reason.as_deref().unwrap_or(DEFAULT_STOP_REASON);
    let stopped = orchestrator.stop_with_reason(url_ids, reason).await?;
    orchestrator.shutdown().await;

    if stopped.is_empty() {
        println!("No active jobs to stop");
    }
    for job in &stopped {
        println!("Stopped job {} (URL {})", job.job_id, job.url_id);
    }
    Ok(())
}

async fn handle_result(
    storage: &SqliteStorage,
    url_id: Option<i64>,
    job_id: Option<i64>,
) -> page_audit::Result<()> {
    let result = match (url_id, job_id) {
        (_, Some(job_id)) => ResultStore::for_job(storage, job_id).await?,
        (Some(url_id), None) => ResultStore::latest_for_url(storage, url_id).await?,
        (None, None) => {
            return Err(AuditError::Usage(
                "either a URL ID or --job is required".to_string(),
            ))
        }
    };

    match result {
        Some(result) => print_result(&result),
        None => println!("No result found"),
    }
    Ok(())
}

async fn handle_history(storage: &SqliteStorage, url_id: i64) -> page_audit::Result<()> {
    let jobs = JobStore::history_for_url(storage, url_id).await?;
    if jobs.is_empty() {
        println!("No jobs for URL {}", url_id);
    }
    for job in &jobs {
        println!(
            "  {}\t{}\t{}\t{}",
            job.id,
            job.status,
            job.created_at.format("%Y-%m-%d %H:%M:%S"),
            job.error_message.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn print_result(result: &CrawlResult) {
    println!("  HTML version:       {}", result.html_version.as_deref().unwrap_or("unknown"));
    println!("  Title:              {}", result.title.as_deref().unwrap_or("(none)"));
    for level in 1..=6 {
        println!("  h{}:                 {}", level, result.heading_count(level));
    }
    println!("  Internal links:     {}", result.internal_links);
    println!("  External links:     {}", result.external_links);
    println!("  Inaccessible links: {}", result.inaccessible_links);
    println!("  Login form:         {}", if result.has_login_form { "yes" } else { "no" });
}
