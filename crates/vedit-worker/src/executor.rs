//! Job executor.
//!
//! Pulls `EditJob` messages from the stream and runs each one under the
//! wall-clock budget. A message is acknowledged once its job is terminal;
//! failed jobs are also dead-lettered. Nothing is retried automatically.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

use vedit_models::{JobId, JobResult};
use vedit_queue::{EditJob, JobQueue};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::processor::{fail_job, run_edit_job, EditContext};
use crate::retry::FailureTracker;

/// Message recorded on jobs whose worker disappeared mid-run.
pub const WORKER_LOST: &str = "worker lost";

const CONSUME_BLOCK_MS: u64 = 1000;
const MAX_BATCH: usize = 5;
const STALE_BATCH: usize = 10;

/// Job executor that processes jobs from the queue.
pub struct JobExecutor {
    config: WorkerConfig,
    queue: Arc<JobQueue>,
    ctx: Arc<EditContext>,
    job_semaphore: Arc<Semaphore>,
    shutdown: watch::Sender<bool>,
    consumer_name: String,
}

impl JobExecutor {
    pub fn new(config: WorkerConfig, queue: JobQueue, ctx: EditContext) -> Self {
        let job_semaphore = Arc::new(Semaphore::new(config.max_concurrent_jobs));
        let (shutdown, _) = watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            config,
            queue: Arc::new(queue),
            ctx: Arc::new(ctx),
            job_semaphore,
            shutdown,
            consumer_name,
        }
    }

    /// Run until [`shutdown`](Self::shutdown) is signalled, then drain in-flight jobs.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            consumer = %self.consumer_name,
            max_jobs = self.config.max_concurrent_jobs,
            "Starting job executor"
        );

        self.queue.init().await?;

        let sweep_task = tokio::spawn(Self::sweep_stale_loop(
            Arc::clone(&self.queue),
            Arc::clone(&self.ctx),
            self.consumer_name.clone(),
            self.config.clone(),
            self.shutdown.subscribe(),
        ));

        let mut shutdown_rx = self.shutdown.subscribe();
        let mut failures = FailureTracker::new(3);

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received, stopping executor");
                        break;
                    }
                }
                result = self.consume_jobs() => match result {
                    Ok(()) => failures.record_success(),
                    Err(e) => {
                        if failures.record_failure() {
                            error!("Error consuming jobs: {}", e);
                        }
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        }

        sweep_task.abort();

        info!("Waiting for in-flight jobs to complete");
        if tokio::time::timeout(self.config.shutdown_timeout, self.wait_for_jobs())
            .await
            .is_err()
        {
            warn!(
                "In-flight jobs still running after {:?}, exiting anyway",
                self.config.shutdown_timeout
            );
        }

        info!("Job executor stopped");
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    /// A handle that can signal shutdown from another task.
    pub fn shutdown_handle(&self) -> watch::Sender<bool> {
        self.shutdown.clone()
    }

    async fn consume_jobs(&self) -> WorkerResult<()> {
        let available = self.job_semaphore.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let jobs = self
            .queue
            .consume(&self.consumer_name, CONSUME_BLOCK_MS, available.min(MAX_BATCH))
            .await?;
        if jobs.is_empty() {
            return Ok(());
        }
        debug!("Consumed {} jobs from queue", jobs.len());

        for (message_id, job) in jobs {
            let permit = self
                .job_semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| WorkerError::job_failed("Semaphore closed"))?;
            let ctx = Arc::clone(&self.ctx);
            let queue = Arc::clone(&self.queue);

            tokio::spawn(async move {
                let _permit = permit;
                Self::execute_job(ctx, queue, message_id, job).await;
            });
        }

        Ok(())
    }

    async fn execute_job(ctx: Arc<EditContext>, queue: Arc<JobQueue>, message_id: String, job: EditJob) {
        let logger = JobLogger::new(&job.job_id, &job.project_id, "edit");
        let started = Instant::now();

        let result = run_with_timeout(&ctx, &job.job_id)
            .instrument(logger.create_span())
            .await;

        let settled = match result {
            Ok(outcome) => {
                metrics::record_job_completed(started.elapsed().as_secs_f64(), outcome.clips_count);
                queue.ack(&message_id).await
            }
            Err(WorkerError::InvalidState(e)) => {
                // Redelivery of a job that already finished
                warn!(job_id = %job.job_id, "Skipping message {}: {}", message_id, e);
                queue.ack(&message_id).await
            }
            Err(e) => {
                metrics::record_job_failed(e.reason());
                queue.dlq(&message_id, &job, &e.to_string()).await
            }
        };

        if let Err(e) = settled {
            error!(job_id = %job.job_id, "Failed to settle message {}: {}", message_id, e);
        }
    }

    async fn sweep_stale_loop(
        queue: Arc<JobQueue>,
        ctx: Arc<EditContext>,
        consumer_name: String,
        config: WorkerConfig,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        let mut interval = tokio::time::interval(config.stale_claim_interval);
        let min_idle_ms = config.stale_after().as_millis() as u64;

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = interval.tick() => {
                    match queue.claim_stale(&consumer_name, min_idle_ms, STALE_BATCH).await {
                        Ok(stale) => {
                            for (message_id, job) in stale {
                                abandon_job(&ctx, &queue, &message_id, &job).await;
                            }
                        }
                        Err(e) => warn!("Failed to claim stale messages: {}", e),
                    }
                }
            }
        }
    }

    async fn wait_for_jobs(&self) {
        while self.job_semaphore.available_permits() < self.config.max_concurrent_jobs {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Run a job under the configured wall-clock budget.
///
/// On expiry the pipeline future is dropped, which removes its scratch
/// directory. Any error, including one raised while writing status records,
/// leaves the job failed unless it had already finished.
pub async fn run_with_timeout(ctx: &EditContext, job_id: &JobId) -> WorkerResult<JobResult> {
    let budget = ctx.config.job_timeout;
    let result = match tokio::time::timeout(budget, run_edit_job(ctx, job_id)).await {
        Ok(result) => result,
        Err(_) => Err(WorkerError::Timeout(budget.as_secs())),
    };

    match result {
        // Redelivery of a finished job; its record stays as it is
        Err(WorkerError::InvalidState(e)) => Err(WorkerError::InvalidState(e)),
        Err(err) => {
            warn!(job_id = %job_id, "Job did not complete: {}", err);
            if let Err(e) = fail_job(ctx, job_id, &err.to_string()).await {
                error!(job_id = %job_id, "Failed to mark job failed: {}", e);
            }
            Err(err)
        }
        ok => ok,
    }
}

/// Fail a job whose worker stopped responding and dead-letter its message.
async fn abandon_job(ctx: &EditContext, queue: &JobQueue, message_id: &str, job: &EditJob) {
    warn!(job_id = %job.job_id, "Message {} abandoned by its worker", message_id);
    if let Err(e) = fail_job(ctx, &job.job_id, WORKER_LOST).await {
        warn!(job_id = %job.job_id, "Failed to mark abandoned job failed: {}", e);
    }
    metrics::record_job_failed("worker_lost");
    if let Err(e) = queue.dlq(message_id, job, WORKER_LOST).await {
        error!(job_id = %job.job_id, "Failed to dead-letter message {}: {}", message_id, e);
    }
}
