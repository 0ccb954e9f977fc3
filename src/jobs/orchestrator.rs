//! Job orchestrator

use crate::config::PoolConfig;
use crate::crawler::CrawlEngine;
use crate::jobs::worker::{run_worker, WorkerContext};
use crate::jobs::{JobError, JobStatusView, JobTask, StoppedJob, DEFAULT_STOP_REASON};
use crate::state::JobStatus;
use crate::storage::{JobStore, ResultStore, TransitionEffects};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// Drives crawl jobs through a fixed pool of workers
///
/// Workers share one bounded queue; [`JobOrchestrator::start`] waits for a
/// free slot when the queue is full.
pub struct JobOrchestrator {
    jobs: Arc<dyn JobStore>,
    sender: mpsc::Sender<JobTask>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    active: Arc<DashMap<i64, CancellationToken>>,
    workers: usize,
}

impl JobOrchestrator {
    /// Creates the orchestrator and spawns its workers
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `pool` - Worker count and queue capacity
    /// * `jobs` - Store holding job records
    /// * `results` - Store receiving crawl results
    /// * `engine` - Engine used to crawl each page
    pub fn new(
        pool: &PoolConfig,
        jobs: Arc<dyn JobStore>,
        results: Arc<dyn ResultStore>,
        engine: Arc<CrawlEngine>,
    ) -> Self {
        let workers = pool.workers.max(1);
        let (sender, receiver) = mpsc::channel(pool.queue_capacity.max(1));
        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let active = Arc::new(DashMap::new());

        let context = Arc::new(WorkerContext {
            jobs: Arc::clone(&jobs),
            results,
            engine,
            queue: Mutex::new(receiver),
            shutdown: shutdown.clone(),
            active: Arc::clone(&active),
        });

        for worker_id in 0..workers {
            tracker.spawn(run_worker(worker_id, Arc::clone(&context)));
        }
        tracker.close();

        tracing::info!(
            "Job orchestrator started with {} workers, queue capacity {}",
            workers,
            pool.queue_capacity
        );

        Self {
            jobs,
            sender,
            shutdown,
            tracker,
            active,
            workers,
        }
    }

    /// Number of pool workers
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Creates a Queued job for a URL and hands it to the pool
    ///
    /// # Arguments
    ///
    /// * `url_id` - The registered URL
    /// * `url` - Address to crawl
    /// * `cancel` - Abandons waiting for a queue slot
    ///
    /// # Returns
    ///
    /// * `Ok(job_id)` - The job was queued
    /// * `Err(JobError::Cancelled)` - `cancel` fired while the queue was
    ///   full; the created job is left Queued
    /// * `Err(JobError::ShuttingDown)` - Shutdown already began
    pub async fn start(
        &self,
        url_id: i64,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<i64, JobError> {
        if self.shutdown.is_cancelled() {
            return Err(JobError::ShuttingDown);
        }

        let job = self.jobs.enqueue(url_id).await?;
        let task = JobTask {
            job_id: job.id,
            url_id,
            url: url.to_string(),
        };

        let task = match self.sender.try_send(task) {
            Ok(()) => {
                tracing::debug!("Queued job {} for URL {}", job.id, url_id);
                return Ok(job.id);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => return Err(JobError::QueueClosed),
            Err(mpsc::error::TrySendError::Full(task)) => task,
        };

        tracing::debug!("Job queue full, waiting to enqueue job {}", job.id);

        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::warn!("Enqueue of job {} cancelled, job left queued", job.id);
                Err(JobError::Cancelled { job_id: job.id })
            }
            sent = self.sender.send(task) => match sent {
                Ok(()) => Ok(job.id),
                Err(_) => Err(JobError::QueueClosed),
            },
        }
    }

    /// Starts one job per `(url_id, url)` target, in order
    ///
    /// When a start fails (for example because `cancel` fired while the
    /// queue was full), every job this call already created is stopped with
    /// `reason` before the error is returned, so none is left Queued behind
    /// the caller's back.
    ///
    /// # Returns
    ///
    /// `(url_id, job_id)` for each queued job
    pub async fn start_batch(
        &self,
        targets: &[(i64, String)],
        cancel: &CancellationToken,
        reason: &str,
    ) -> Result<Vec<(i64, i64)>, JobError> {
        let mut started = Vec::with_capacity(targets.len());

        for (url_id, url) in targets {
            match self.start(*url_id, url, cancel).await {
                Ok(job_id) => started.push((*url_id, job_id)),
                Err(err) => {
                    if let JobError::Cancelled { job_id } = &err {
                        started.push((*url_id, *job_id));
                    }
                    tracing::warn!(
                        "Start of URL {} failed, stopping {} started jobs: {}",
                        url_id,
                        started.len(),
                        err
                    );
                    for &(url_id, job_id) in &started {
                        if let Err(stop_err) = self.stop_job(url_id, job_id, reason).await {
                            tracing::error!("Failed to stop job {}: {}", job_id, stop_err);
                        }
                    }
                    return Err(err);
                }
            }
        }

        Ok(started)
    }

    /// Reports the current state of a job
    pub async fn status(&self, job_id: i64) -> Result<JobStatusView, JobError> {
        self.jobs
            .get(job_id)
            .await?
            .map(JobStatusView::from)
            .ok_or(JobError::NotFound(job_id))
    }

    /// Stops the latest job of each URL with the default reason
    pub async fn stop(&self, url_ids: &[i64]) -> Result<Vec<StoppedJob>, JobError> {
        self.stop_with_reason(url_ids, DEFAULT_STOP_REASON).await
    }

    /// Stops the latest job of each URL
    ///
    /// URLs without a job, whose latest job already finished, or whose job
    /// finished while being stopped are skipped. Stopping a running job also
    /// cancels its crawl.
    ///
    /// # Returns
    ///
    /// The jobs that were actually moved to Stopped
    pub async fn stop_with_reason(
        &self,
        url_ids: &[i64],
        reason: &str,
    ) -> Result<Vec<StoppedJob>, JobError> {
        let mut stopped = Vec::new();

        for &url_id in url_ids {
            let Some(job) = self.jobs.latest_for_url(url_id).await? else {
                tracing::debug!("No job to stop for URL {}", url_id);
                continue;
            };

            if !job.status.is_active() {
                tracing::debug!(
                    "Latest job {} for URL {} is already {}",
                    job.id,
                    url_id,
                    job.status
                );
                continue;
            }

            if self.stop_job(url_id, job.id, reason).await? {
                stopped.push(StoppedJob {
                    url_id,
                    job_id: job.id,
                });
            }
        }

        Ok(stopped)
    }

    /// Moves one job to Stopped and cancels its crawl if it is running
    ///
    /// Returns false when the job had already left Queued and Running.
    async fn stop_job(&self, url_id: i64, job_id: i64, reason: &str) -> Result<bool, JobError> {
        let applied = self
            .jobs
            .transition(
                job_id,
                &[JobStatus::Queued, JobStatus::Running],
                JobStatus::Stopped,
                TransitionEffects::with_error(reason),
            )
            .await?;

        if !applied {
            tracing::debug!("Job {} finished before it could be stopped", job_id);
            return Ok(false);
        }

        if let Some(token) = self.active.get(&job_id) {
            token.cancel();
        }

        tracing::info!("Stopped job {} for URL {}", job_id, url_id);
        Ok(true)
    }

    /// Stops the pool and waits for in-flight jobs to finish
    ///
    /// Tasks still waiting in the queue are not processed; their jobs stay
    /// Queued.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down job orchestrator");
        self.shutdown.cancel();
        self.tracker.wait().await;
        tracing::info!("Job orchestrator stopped");
    }

    /// True once [`JobOrchestrator::shutdown`] was called
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

impl Drop for JobOrchestrator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for JobOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobOrchestrator")
            .field("workers", &self.workers)
            .field("active", &self.active.len())
            .field("shutting_down", &self.shutdown.is_cancelled())
            .finish_non_exhaustive()
    }
}
