//! Job handler context trait
//!
//! The API implements this for its application state. The worker holds a weak reference and
//! calls into it for every claimed job.

use async_trait::async_trait;
use std::sync::Arc;

use deepcheck_core::models::DetectionJob;
use deepcheck_core::JobError;

#[async_trait]
pub trait JobHandlerContext: Send + Sync {
    /// Runs detection for the job's order and persists the result.
    async fn dispatch_job(self: Arc<Self>, job: &DetectionJob) -> Result<(), JobError>;

    /// Called after a failed or timed-out attempt, before the job is rescheduled or failed.
    /// `final_attempt` is true when no retry will follow.
    async fn release_job(self: Arc<Self>, job: &DetectionJob, final_attempt: bool);
}
