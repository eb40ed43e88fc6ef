//! Application state shared by handlers and the detection worker.

use deepcheck_core::validation::UploadLimits;
use deepcheck_core::{Config, DemoPolicy};
use deepcheck_db::Ledger;
use deepcheck_detection::Detector;
use deepcheck_payments::PaymentGateway;
use deepcheck_worker::{DetectionQueue, DetectionQueueConfig, DetectionWorker};
use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::services::orders::OrderService;
use crate::services::tokens::TokenAccounts;

/// External collaborators the state is built from.
pub struct Collaborators {
    pub ledger: Ledger,
    pub gateway: Arc<dyn PaymentGateway>,
    pub detector: Arc<dyn Detector>,
    pub verifier: Arc<TokenVerifier>,
}

pub struct AppState {
    pub config: Config,
    pub ledger: Ledger,
    pub orders: OrderService,
    pub tokens: TokenAccounts,
    pub gateway: Arc<dyn PaymentGateway>,
    pub detector: Arc<dyn Detector>,
    pub queue: DetectionQueue,
    pub verifier: Arc<TokenVerifier>,
    pub upload_limits: UploadLimits,
}

impl AppState {
    /// Builds the state and the detection worker that still has to be spawned against it.
    pub fn new(config: Config, collaborators: Collaborators) -> (Arc<Self>, DetectionWorker) {
        let Collaborators {
            ledger,
            gateway,
            detector,
            verifier,
        } = collaborators;

        let (queue, worker) = DetectionQueue::new(ledger.jobs.clone(), queue_config(&config));
        let demo = DemoPolicy::new(config.demo_account_emails(), config.demo_token_floor());

        let state = Arc::new(Self {
            orders: OrderService::new(ledger.clone(), config.default_currency()),
            tokens: TokenAccounts::new(ledger.users.clone(), demo),
            upload_limits: UploadLimits {
                max_image_size_bytes: config.max_image_size_bytes(),
                max_video_size_bytes: config.max_video_size_bytes(),
            },
            config,
            ledger,
            gateway,
            detector,
            queue,
            verifier,
        });

        (state, worker)
    }

    /// Largest request body the upload endpoint has to accept.
    pub fn max_upload_bytes(&self) -> usize {
        self.upload_limits
            .max_image_size_bytes
            .max(self.upload_limits.max_video_size_bytes)
    }
}

fn queue_config(config: &Config) -> DetectionQueueConfig {
    DetectionQueueConfig {
        max_workers: config.detection_queue_max_workers(),
        poll_interval_ms: config.detection_queue_poll_interval_ms(),
        max_retries: config.detection_queue_max_retries(),
        timeout_seconds: config.detection_queue_timeout_seconds(),
        stale_reap_interval_secs: config.detection_queue_stale_reap_interval_secs(),
        stale_grace_period_secs: config.detection_queue_stale_grace_period_secs(),
    }
}
