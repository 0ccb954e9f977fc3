//! Pool worker loop and per-job processing

use crate::crawler::{CrawlEngine, CrawlError};
use crate::jobs::{JobError, JobTask};
use crate::state::JobStatus;
use crate::storage::{JobStore, ResultStore, TransitionEffects};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// State shared by every worker of one orchestrator
pub(crate) struct WorkerContext {
    pub jobs: Arc<dyn JobStore>,
    pub results: Arc<dyn ResultStore>,
    pub engine: Arc<CrawlEngine>,
    pub queue: Mutex<mpsc::Receiver<JobTask>>,
    pub shutdown: CancellationToken,
    /// Crawl tokens of jobs currently held by a worker
    pub active: Arc<DashMap<i64, CancellationToken>>,
}

/// Claims and processes tasks until shutdown or until the queue closes
pub(crate) async fn run_worker(worker_id: usize, context: Arc<WorkerContext>) {
    tracing::debug!("Worker {} started", worker_id);

    loop {
        let task = tokio::select! {
            biased;
            _ = context.shutdown.cancelled() => break,
            task = next_task(&context.queue) => match task {
                Some(task) => task,
                None => break,
            },
        };

        if let Err(e) = process(&context, &task).await {
            tracing::error!(
                "Worker {} failed to process job {} ({}): {}",
                worker_id,
                task.job_id,
                task.url,
                e
            );
            record_failure(&context, task.job_id, &e.to_string()).await;
        }
    }

    tracing::debug!("Worker {} stopped", worker_id);
}

async fn next_task(queue: &Mutex<mpsc::Receiver<JobTask>>) -> Option<JobTask> {
    queue.lock().await.recv().await
}

/// Runs one job, keeping its crawl token registered while it is held
async fn process(context: &WorkerContext, task: &JobTask) -> Result<(), JobError> {
    let token = CancellationToken::new();
    context.active.insert(task.job_id, token.clone());

    let outcome = drive(context, task, &token).await;

    context.active.remove(&task.job_id);
    outcome
}

async fn drive(
    context: &WorkerContext,
    task: &JobTask,
    token: &CancellationToken,
) -> Result<(), JobError> {
    let job_id = task.job_id;

    let claimed = context
        .jobs
        .transition(job_id, &[JobStatus::Queued], JobStatus::Running, TransitionEffects::none())
        .await?;
    if !claimed {
        tracing::debug!("Job {} is no longer queued, skipping", job_id);
        return Ok(());
    }

    tracing::info!("Job {} running for {}", job_id, task.url);

    let report = match context.engine.crawl(&task.url, token).await {
        Ok(report) => report,
        Err(CrawlError::Cancelled) if token.is_cancelled() => {
            tracing::info!("Job {} stopped during crawl", job_id);
            return Ok(());
        }
        Err(e) => {
            tracing::warn!("Job {} failed: {}", job_id, e);
            let applied = context
                .jobs
                .transition(
                    job_id,
                    &[JobStatus::Running],
                    JobStatus::Failed,
                    TransitionEffects::with_error(e.to_string()),
                )
                .await?;
            if !applied {
                tracing::debug!("Job {} left Running before its failure was recorded", job_id);
            }
            return Ok(());
        }
    };

    if token.is_cancelled() || !still_running(context, job_id).await? {
        tracing::info!("Job {} was stopped, discarding its result", job_id);
        return Ok(());
    }

    context
        .results
        .create(report.into_new_result(job_id, task.url_id))
        .await?;

    let applied = context
        .jobs
        .transition(
            job_id,
            &[JobStatus::Running],
            JobStatus::Completed,
            TransitionEffects::none(),
        )
        .await?;
    if applied {
        tracing::info!("Job {} completed", job_id);
    } else {
        tracing::debug!("Job {} left Running before completion", job_id);
    }

    Ok(())
}

async fn still_running(context: &WorkerContext, job_id: i64) -> Result<bool, JobError> {
    let job = context.jobs.get(job_id).await?;
    Ok(matches!(job, Some(job) if job.status == JobStatus::Running))
}

/// Best-effort failure record for errors that escaped processing
async fn record_failure(context: &WorkerContext, job_id: i64, message: &str) {
    match context
        .jobs
        .transition(
            job_id,
            &[JobStatus::Queued, JobStatus::Running],
            JobStatus::Failed,
            TransitionEffects::with_error(message),
        )
        .await
    {
        Ok(true) => {}
        Ok(false) => tracing::debug!("Job {} already finished, failure not recorded", job_id),
        Err(e) => tracing::error!("Failed to record failure of job {}: {}", job_id, e),
    }
}
