use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deepcheck_core::models::{DetectionJob, JobPolicy, JobStatus};
use sqlx::{PgConnection, PgPool, Postgres};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};
use crate::traits::JobStore;

/// Channel workers `LISTEN` on for new detection jobs.
pub const DETECTION_JOB_CHANNEL: &str = "deepcheck_detection_job";

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    order_id: Uuid,
    status: String,
    retry_count: i32,
    max_retries: i32,
    timeout_seconds: i32,
    scheduled_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for DetectionJob {
    type Error = StorageError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status: JobStatus = row
            .status
            .parse()
            .map_err(|e| StorageError::integrity("detection_job", row.id, e))?;
        Ok(DetectionJob {
            id: row.id,
            order_id: row.order_id,
            status,
            retry_count: row.retry_count,
            max_retries: row.max_retries,
            timeout_seconds: row.timeout_seconds,
            scheduled_at: row.scheduled_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            last_error: row.last_error,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Inserts a pending job unless the order already has a live one, then notifies workers.
/// Runs on the caller's connection so it can join the paid transition's transaction.
pub(crate) async fn insert_job_for_paid_order(
    conn: &mut PgConnection,
    order_id: Uuid,
    policy: JobPolicy,
) -> StorageResult<Option<DetectionJob>> {
    let row = sqlx::query_as::<Postgres, JobRow>(
        r#"
        INSERT INTO detection_jobs (id, order_id, status, max_retries, timeout_seconds)
        VALUES ($1, $2, 'pending', $3, $4)
        ON CONFLICT DO NOTHING
        RETURNING id, order_id, status, retry_count, max_retries, timeout_seconds,
                  scheduled_at, started_at, completed_at, last_error, created_at, updated_at
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(order_id)
    .bind(policy.max_retries)
    .bind(policy.timeout_seconds)
    .fetch_optional(&mut *conn)
    .await?;

    let Some(row) = row else {
        tracing::debug!(order_id = %order_id, "Detection job already active");
        return Ok(None);
    };
    let job = DetectionJob::try_from(row)?;

    // Workers also poll, so a failed notify only delays pickup.
    if let Err(e) = sqlx::query("SELECT pg_notify($1, $2)")
        .bind(DETECTION_JOB_CHANNEL)
        .bind(order_id.to_string())
        .execute(&mut *conn)
        .await
    {
        tracing::warn!(
            error = %e,
            job_id = %job.id,
            "Failed to send pg_notify for detection job, workers will pick it up by polling"
        );
    }

    tracing::info!(job_id = %job.id, order_id = %order_id, "Detection job recorded");
    Ok(Some(job))
}

#[derive(Clone)]
pub struct DetectionJobRepository {
    pool: PgPool,
}

impl DetectionJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for DetectionJobRepository {
    #[tracing::instrument(skip(self))]
    async fn enqueue_detection(
        &self,
        order_id: Uuid,
        policy: JobPolicy,
    ) -> StorageResult<Option<DetectionJob>> {
        let mut conn = self.pool.acquire().await?;
        insert_job_for_paid_order(&mut *conn, order_id, policy).await
    }

    #[tracing::instrument(skip(self))]
    async fn get_job(&self, id: Uuid) -> StorageResult<Option<DetectionJob>> {
        let row = sqlx::query_as::<Postgres, JobRow>(
            r#"
            SELECT id, order_id, status, retry_count, max_retries, timeout_seconds,
                   scheduled_at, started_at, completed_at, last_error, created_at, updated_at
            FROM detection_jobs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DetectionJob::try_from).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn active_job_for_order(&self, order_id: Uuid) -> StorageResult<Option<DetectionJob>> {
        let row = sqlx::query_as::<Postgres, JobRow>(
            r#"
            SELECT id, order_id, status, retry_count, max_retries, timeout_seconds,
                   scheduled_at, started_at, completed_at, last_error, created_at, updated_at
            FROM detection_jobs
            WHERE order_id = $1 AND status IN ('pending', 'scheduled', 'running')
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DetectionJob::try_from).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn claim_next_job(&self) -> StorageResult<Option<DetectionJob>> {
        let row = sqlx::query_as::<Postgres, JobRow>(
            r#"
            UPDATE detection_jobs
            SET status = 'running', started_at = NOW(), updated_at = NOW()
            WHERE id = (
                SELECT id FROM detection_jobs
                WHERE status IN ('pending', 'scheduled') AND scheduled_at <= NOW()
                ORDER BY scheduled_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, order_id, status, retry_count, max_retries, timeout_seconds,
                      scheduled_at, started_at, completed_at, last_error, created_at, updated_at
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        let job = row.map(DetectionJob::try_from).transpose()?;
        if let Some(ref job) = job {
            tracing::debug!(job_id = %job.id, order_id = %job.order_id, "Detection job claimed");
        }
        Ok(job)
    }

    #[tracing::instrument(skip(self))]
    async fn complete_job(&self, id: Uuid) -> StorageResult<()> {
        sqlx::query(
            r#"
            UPDATE detection_jobs
            SET status = 'completed', completed_at = NOW(), last_error = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn fail_job(&self, id: Uuid, error: &str) -> StorageResult<()> {
        sqlx::query(
            r#"
            UPDATE detection_jobs
            SET status = 'failed', completed_at = NOW(), last_error = $2, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(error)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn schedule_retry(
        &self,
        id: Uuid,
        scheduled_at: DateTime<Utc>,
        error: &str,
    ) -> StorageResult<Option<DetectionJob>> {
        let row = sqlx::query_as::<Postgres, JobRow>(
            r#"
            UPDATE detection_jobs
            SET status = 'scheduled',
                retry_count = retry_count + 1,
                scheduled_at = $2,
                started_at = NULL,
                last_error = $3,
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, order_id, status, retry_count, max_retries, timeout_seconds,
                      scheduled_at, started_at, completed_at, last_error, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(scheduled_at)
        .bind(error)
        .fetch_optional(&self.pool)
        .await?;

        row.map(DetectionJob::try_from).transpose()
    }

    #[tracing::instrument(skip(self))]
    async fn reap_stale_jobs(&self, grace_seconds: i64) -> StorageResult<u64> {
        let reaped: i64 = sqlx::query_scalar(
            r#"
            WITH stale AS (
                SELECT id, order_id, retry_count < max_retries AS can_retry
                FROM detection_jobs
                WHERE status = 'running'
                    AND started_at IS NOT NULL
                    AND started_at + make_interval(secs => timeout_seconds + $1) < NOW()
                FOR UPDATE SKIP LOCKED
            ),
            jobs AS (
                UPDATE detection_jobs j
                SET status = CASE WHEN s.can_retry THEN 'scheduled' ELSE 'failed' END,
                    retry_count = CASE WHEN s.can_retry THEN j.retry_count + 1 ELSE j.retry_count END,
                    scheduled_at = NOW(),
                    started_at = NULL,
                    completed_at = CASE WHEN s.can_retry THEN NULL ELSE NOW() END,
                    last_error = 'job exceeded its timeout',
                    updated_at = NOW()
                FROM stale s
                WHERE j.id = s.id
                RETURNING j.order_id, s.can_retry
            ),
            released AS (
                UPDATE orders o
                SET status = CASE WHEN jobs.can_retry THEN 'paid' ELSE 'failed' END,
                    updated_at = NOW()
                FROM jobs
                WHERE o.id = jobs.order_id AND o.status = 'processing'
                RETURNING o.id
            )
            SELECT COUNT(*) FROM jobs
            "#,
        )
        .bind(grace_seconds as f64)
        .fetch_one(&self.pool)
        .await?;

        if reaped > 0 {
            tracing::warn!(reaped, "Reaped stale detection jobs");
        }
        Ok(reaped as u64)
    }
}
