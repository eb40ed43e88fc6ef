//! Detection queue: worker pool, LISTEN/NOTIFY plus polling, retry and stale-job reaping.
//!
//! [`DetectionQueue::new`] returns a cheap handle for the request path and a
//! [`DetectionWorker`] that is spawned once the handler context exists. Shutdown stops
//! claiming; in-flight jobs run to completion or timeout.

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::sleep;
use uuid::Uuid;

use deepcheck_core::models::{DetectionJob, JobPolicy};
use deepcheck_core::JobError;
use deepcheck_db::{JobStore, DETECTION_JOB_CHANNEL};

use crate::context::JobHandlerContext;

/// Upper bound on the delay before a failed job is retried.
pub const MAX_RETRY_BACKOFF_SECS: u64 = 3600;

/// Exponential backoff in seconds for a given retry count, capped.
#[inline]
pub fn compute_retry_backoff_seconds(retry_count: i32) -> u64 {
    2_u64
        .checked_pow(retry_count.max(0) as u32)
        .unwrap_or(u64::MAX)
        .min(MAX_RETRY_BACKOFF_SECS)
}

#[derive(Debug, Clone)]
pub struct DetectionQueueConfig {
    pub max_workers: usize,
    pub poll_interval_ms: u64,
    pub max_retries: i32,
    pub timeout_seconds: i32,
    /// Zero disables the reaper.
    pub stale_reap_interval_secs: u64,
    /// Added to a job's timeout before it counts as stale.
    pub stale_grace_period_secs: i64,
}

impl Default for DetectionQueueConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            poll_interval_ms: 1000,
            max_retries: 3,
            timeout_seconds: 120,
            stale_reap_interval_secs: 60,
            stale_grace_period_secs: 60,
        }
    }
}

impl DetectionQueueConfig {
    pub fn policy(&self) -> JobPolicy {
        JobPolicy {
            max_retries: self.max_retries,
            timeout_seconds: self.timeout_seconds,
        }
    }
}

#[derive(Clone)]
pub struct DetectionQueue {
    jobs: Arc<dyn JobStore>,
    config: DetectionQueueConfig,
    wake_tx: mpsc::Sender<()>,
    shutdown_tx: mpsc::Sender<()>,
}

/// Owns the receiving side of the queue until [`DetectionWorker::spawn`] starts the pool.
pub struct DetectionWorker {
    jobs: Arc<dyn JobStore>,
    config: DetectionQueueConfig,
    wake_rx: mpsc::Receiver<()>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl DetectionQueue {
    pub fn new(jobs: Arc<dyn JobStore>, config: DetectionQueueConfig) -> (Self, DetectionWorker) {
        let (wake_tx, wake_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let queue = Self {
            jobs: jobs.clone(),
            config: config.clone(),
            wake_tx,
            shutdown_tx,
        };
        let worker = DetectionWorker {
            jobs,
            config,
            wake_rx,
            shutdown_rx,
        };
        (queue, worker)
    }

    /// Retry policy stamped on new jobs.
    pub fn policy(&self) -> JobPolicy {
        self.config.policy()
    }

    /// Nudges the worker after a job was recorded. Never blocks; a full channel already
    /// guarantees a pending wake-up.
    pub fn wake(&self) {
        let _ = self.wake_tx.try_send(());
    }

    /// Records a job for `order_id` unless one is already active, and wakes the worker.
    #[tracing::instrument(skip(self))]
    pub async fn enqueue(&self, order_id: Uuid) -> Result<Option<DetectionJob>> {
        let job = self
            .jobs
            .enqueue_detection(order_id, self.policy())
            .await
            .context("Failed to record detection job")?;
        if job.is_some() {
            self.wake();
        }
        Ok(job)
    }

    /// Claims one runnable job and processes it on the current task.
    pub async fn process_next(
        &self,
        context: &Weak<dyn JobHandlerContext>,
    ) -> Result<Option<Uuid>> {
        let Some(job) = self.jobs.claim_next_job().await? else {
            return Ok(None);
        };
        let job_id = job.id;
        process_job(job, &self.jobs, context).await?;
        Ok(Some(job_id))
    }

    pub async fn shutdown(&self) {
        tracing::info!("Initiating detection queue shutdown");
        let _ = self.shutdown_tx.send(()).await;
    }
}

impl DetectionWorker {
    /// Starts the pool. With a `pool` the worker also wakes on Postgres NOTIFY.
    pub fn spawn(self, context: Weak<dyn JobHandlerContext>, pool: Option<sqlx::PgPool>) {
        tokio::spawn(self.run(context, pool));
    }

    async fn run(self, context: Weak<dyn JobHandlerContext>, pool: Option<sqlx::PgPool>) {
        let DetectionWorker {
            jobs,
            config,
            mut wake_rx,
            mut shutdown_rx,
        } = self;
        tracing::info!(
            max_workers = config.max_workers,
            poll_interval_ms = config.poll_interval_ms,
            listen_notify = pool.is_some(),
            "Detection worker pool started"
        );

        let semaphore = Arc::new(Semaphore::new(config.max_workers.max(1)));
        let poll_interval = Duration::from_millis(config.poll_interval_ms.max(10));

        let (notify_tx, mut notify_rx) = mpsc::channel::<()>(16);
        if let Some(pool) = pool {
            tokio::spawn(listen_for_jobs(pool, notify_tx));
        }

        let (reaper_shutdown_tx, reaper_shutdown_rx) = mpsc::channel::<()>(1);
        if config.stale_reap_interval_secs > 0 {
            tokio::spawn(reap_stale_jobs(
                jobs.clone(),
                Duration::from_secs(config.stale_reap_interval_secs),
                config.stale_grace_period_secs,
                reaper_shutdown_rx,
            ));
        }

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    tracing::info!("Detection worker pool shutting down");
                    let _ = reaper_shutdown_tx.send(()).await;
                    break;
                }
                Some(_) = wake_rx.recv() => {
                    claim_and_dispatch(&jobs, &semaphore, &context).await;
                }
                Some(_) = notify_rx.recv() => {
                    claim_and_dispatch(&jobs, &semaphore, &context).await;
                }
                _ = sleep(poll_interval) => {
                    claim_and_dispatch(&jobs, &semaphore, &context).await;
                }
            }
        }

        tracing::info!("Detection worker pool stopped");
    }
}

async fn claim_and_dispatch(
    jobs: &Arc<dyn JobStore>,
    semaphore: &Arc<Semaphore>,
    context: &Weak<dyn JobHandlerContext>,
) {
    // Keep claiming while workers are free so a burst of wake-ups drains in one pass.
    loop {
        let permit = match semaphore.clone().try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                tracing::debug!("No workers available, skipping claim");
                return;
            }
        };

        match jobs.claim_next_job().await {
            Ok(Some(job)) => {
                let jobs = jobs.clone();
                let ctx = context.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(e) = process_job(job, &jobs, &ctx).await {
                        tracing::error!(error = %e, "Detection job bookkeeping failed");
                    }
                });
            }
            Ok(None) => {
                tracing::trace!("No detection jobs available");
                return;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to claim detection job");
                return;
            }
        }
    }
}

async fn listen_for_jobs(pool: sqlx::PgPool, tx: mpsc::Sender<()>) {
    loop {
        match sqlx::postgres::PgListener::connect_with(&pool).await {
            Ok(mut listener) => {
                if let Err(e) = listener.listen(DETECTION_JOB_CHANNEL).await {
                    tracing::warn!(error = %e, "LISTEN failed, will retry");
                    sleep(Duration::from_secs(5)).await;
                    continue;
                }
                while listener.recv().await.is_ok() {
                    if tx.send(()).await.is_err() {
                        return;
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "PgListener connect failed, will retry");
                sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

async fn reap_stale_jobs(
    jobs: Arc<dyn JobStore>,
    every: Duration,
    grace_seconds: i64,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = jobs.reap_stale_jobs(grace_seconds).await {
                    tracing::error!(error = %e, "Stale detection job reaper failed");
                }
            }
            _ = shutdown_rx.recv() => break,
        }
    }
}

#[tracing::instrument(skip(job, jobs, context), fields(job.id = %job.id, order.id = %job.order_id))]
async fn process_job(
    job: DetectionJob,
    jobs: &Arc<dyn JobStore>,
    context: &Weak<dyn JobHandlerContext>,
) -> Result<()> {
    let ctx = context
        .upgrade()
        .ok_or_else(|| anyhow::anyhow!("JobHandlerContext was dropped, cannot process job"))?;

    let timeout = Duration::from_secs(job.timeout_seconds.max(1) as u64);
    let error = match tokio::time::timeout(timeout, ctx.clone().dispatch_job(&job)).await {
        Ok(Ok(())) => {
            jobs.complete_job(job.id)
                .await
                .context("Failed to mark detection job completed")?;
            tracing::info!("Detection job completed");
            return Ok(());
        }
        Ok(Err(e)) => e,
        Err(_) => JobError::recoverable(anyhow::anyhow!(
            "detection job timed out after {}s",
            job.timeout_seconds
        )),
    };

    let retry = error.is_recoverable() && job.can_retry();
    ctx.release_job(&job, !retry).await;

    let message = error.to_string();
    if retry {
        let backoff_seconds = compute_retry_backoff_seconds(job.retry_count);
        let scheduled_at = Utc::now() + chrono::Duration::seconds(backoff_seconds as i64);
        tracing::warn!(
            error = %message,
            retry_count = job.retry_count + 1,
            max_retries = job.max_retries,
            backoff_seconds,
            "Detection job failed, scheduling retry"
        );
        jobs.schedule_retry(job.id, scheduled_at, &message)
            .await
            .context("Failed to schedule detection job retry")?;
    } else {
        tracing::error!(
            error = %message,
            retry_count = job.retry_count,
            recoverable = error.is_recoverable(),
            "Detection job failed permanently"
        );
        jobs.fail_job(job.id, &message)
            .await
            .context("Failed to mark detection job failed")?;
    }
    Ok(())
}
