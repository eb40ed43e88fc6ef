use chrono::{Duration as ChronoDuration, Utc};
use deepcheck_db::UploadStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;

/// Expires uploads that were never attached to an order within the retention window.
#[derive(Clone)]
pub struct UploadSweeper {
    uploads: Arc<dyn UploadStore>,
    retention_hours: i64,
    sweep_interval: Duration,
}

impl UploadSweeper {
    pub fn new(uploads: Arc<dyn UploadStore>, retention_hours: i64, sweep_interval_secs: u64) -> Self {
        Self {
            uploads,
            retention_hours,
            sweep_interval: Duration::from_secs(sweep_interval_secs),
        }
    }

    /// Starts the background sweep. Returns `None` when sweeping is disabled.
    pub fn start(self: Arc<Self>) -> Option<tokio::task::JoinHandle<()>> {
        if self.sweep_interval.is_zero() || self.retention_hours <= 0 {
            tracing::info!("Upload retention sweep disabled");
            return None;
        }

        Some(tokio::spawn(async move {
            let mut sweep_interval = interval(self.sweep_interval);
            loop {
                sweep_interval.tick().await;
                if let Err(e) = self.sweep().await {
                    tracing::error!(error = %e, "Upload retention sweep failed");
                }
            }
        }))
    }

    /// Runs one pass. Returns the number of uploads expired.
    #[tracing::instrument(skip(self), fields(retention_hours = self.retention_hours))]
    pub async fn sweep(&self) -> Result<u64, anyhow::Error> {
        let cutoff = Utc::now() - ChronoDuration::hours(self.retention_hours);
        let expired = self.uploads.expire_orphaned_uploads(cutoff).await?;
        if expired > 0 {
            tracing::info!(expired, %cutoff, "Expired orphaned uploads");
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepcheck_core::models::{NewOrder, NewUpload, UploadStatus};
    use deepcheck_db::Ledger;

    async fn upload(ledger: &Ledger) -> uuid::Uuid {
        ledger
            .uploads
            .create_upload(NewUpload {
                filename: "clip.mp4".to_string(),
                size: 8,
                mime: "video/mp4".to_string(),
                metadata: serde_json::json!({}),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_sweep_keeps_fresh_uploads() {
        let ledger = Ledger::in_memory();
        let id = upload(&ledger).await;

        let sweeper = UploadSweeper::new(ledger.uploads.clone(), 24, 60);
        assert_eq!(sweeper.sweep().await.unwrap(), 0);
        let stored = ledger.uploads.get_upload(id).await.unwrap().unwrap();
        assert_eq!(stored.status, UploadStatus::Uploaded);
    }

    #[tokio::test]
    async fn test_sweep_spares_uploads_attached_to_orders() {
        let ledger = Ledger::in_memory();
        let attached = upload(&ledger).await;
        ledger
            .orders
            .create_order(NewOrder::new(vec![attached], None, "NGN", None))
            .await
            .unwrap();
        let orphan = upload(&ledger).await;

        // A negative window puts the cutoff in the future, so every upload is old enough.
        let sweeper = UploadSweeper::new(ledger.uploads.clone(), -1, 60);
        assert_eq!(sweeper.sweep().await.unwrap(), 1);

        let orphan = ledger.uploads.get_upload(orphan).await.unwrap().unwrap();
        assert_eq!(orphan.status, UploadStatus::Expired);
        let attached = ledger.uploads.get_upload(attached).await.unwrap().unwrap();
        assert_eq!(attached.status, UploadStatus::Uploaded);
    }

    #[test]
    fn test_disabled_sweeper_does_not_start() {
        let sweeper = Arc::new(UploadSweeper::new(Ledger::in_memory().uploads, 24, 0));
        assert!(sweeper.start().is_none());
    }
}
