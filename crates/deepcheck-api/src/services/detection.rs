//! Detection job handling: the worker calls back into the application state for every
//! claimed job.

use anyhow::anyhow;
use async_trait::async_trait;
use deepcheck_core::models::{DetectionJob, OrderStatus};
use deepcheck_core::{JobError, JobResultExt};
use deepcheck_detection::{detect_or_fallback, MediaPayload};
use deepcheck_worker::JobHandlerContext;
use std::sync::Arc;

use crate::state::AppState;

#[async_trait]
impl JobHandlerContext for AppState {
    #[tracing::instrument(skip(self, job), fields(job_id = %job.id, order_id = %job.order_id))]
    async fn dispatch_job(self: Arc<Self>, job: &DetectionJob) -> Result<(), JobError> {
        let order = self
            .ledger
            .orders
            .get_order(job.order_id)
            .await
            .map_err(JobError::recoverable)?
            .ok_or_else(|| JobError::unrecoverable(anyhow!("order {} not found", job.order_id)))?;

        let order = match order.status {
            OrderStatus::Paid => self
                .ledger
                .orders
                .begin_processing(order.id)
                .await
                .map_err(JobError::recoverable)?
                .ok_or_else(|| {
                    JobError::recoverable(anyhow!("order {} left paid before processing", order.id))
                })?,
            // Only one job per order is active, so a processing order was left behind by an
            // attempt the reaper reclaimed.
            OrderStatus::Processing => {
                tracing::info!("Resuming order left in processing");
                order
            }
            OrderStatus::Completed => {
                tracing::debug!("Order already completed, nothing to do");
                return Ok(());
            }
            status => {
                return Err(JobError::unrecoverable(anyhow!(
                    "order {} is {} and cannot be processed",
                    order.id,
                    status
                )));
            }
        };

        let upload_id = order
            .primary_upload_id()
            .ok_or_else(|| JobError::unrecoverable(anyhow!("order {} has no uploads", order.id)))?;
        let upload = self
            .ledger
            .uploads
            .get_upload(upload_id)
            .await
            .map_err(JobError::recoverable)?
            .ok_or_else(|| JobError::unrecoverable(anyhow!("upload {} not found", upload_id)))?;
        let data = self
            .ledger
            .uploads
            .get_upload_data(upload_id)
            .await
            .map_err(JobError::recoverable)?
            .ok_or_else(|| {
                JobError::recoverable(anyhow!("upload {} payload is not readable", upload_id))
            })?;

        let media = MediaPayload {
            upload_id,
            filename: upload.filename,
            mime: upload.mime,
            data,
        };
        let result = detect_or_fallback(self.detector.as_ref(), &media).await;
        let fallback = result.fallback;
        let value = serde_json::to_value(&result).unrecoverable()?;

        self.ledger
            .orders
            .complete_order(order.id, value)
            .await
            .map_err(JobError::recoverable)?
            .ok_or_else(|| {
                JobError::unrecoverable(anyhow!("order {} left processing before completion", order.id))
            })?;

        tracing::info!(score = result.score, fallback, "Order completed");
        Ok(())
    }

    async fn release_job(self: Arc<Self>, job: &DetectionJob, final_attempt: bool) {
        let orders = &self.ledger.orders;
        let released = if final_attempt {
            match orders.fail_order(job.order_id).await {
                // A paid order that never reached processing goes through it to keep the
                // status graph intact.
                Ok(None) => match orders.begin_processing(job.order_id).await {
                    Ok(Some(_)) => orders.fail_order(job.order_id).await,
                    other => other,
                },
                other => other,
            }
        } else {
            orders.release_processing(job.order_id).await
        };

        match released {
            Ok(Some(order)) => {
                tracing::info!(order_id = %order.id, status = %order.status, final_attempt, "Order released")
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, order_id = %job.order_id, "Failed to release order"),
        }
    }
}
