//! Service initialization and application state setup

use anyhow::{Context, Result};
use deepcheck_core::Config;
use deepcheck_db::Ledger;
use deepcheck_detection::HttpDetector;
use deepcheck_payments::PaystackClient;
use deepcheck_worker::{DetectionWorker, JobHandlerContext};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::TokenVerifier;
use crate::services::UploadSweeper;
use crate::state::{AppState, Collaborators};

const GATEWAY_TIMEOUT_SECS: u64 = 30;

/// Builds the Postgres-backed state and starts the background tasks.
pub async fn initialize_services(config: &Config, pool: PgPool) -> Result<Arc<AppState>> {
    if config.paystack_secret_key().is_none() {
        tracing::warn!("PAYSTACK_SECRET_KEY not set; card checkout and token purchases will fail");
    }
    if config.paystack_webhook_secret().is_none() {
        tracing::warn!("No webhook secret configured; webhooks are accepted unsigned");
    }
    let gateway = PaystackClient::new(
        config.paystack_secret_key().map(str::to_string),
        config.paystack_base_url().to_string(),
        Duration::from_secs(GATEWAY_TIMEOUT_SECS),
    )
    .context("Failed to build payment gateway client")?;

    if config.detection_api_url().is_none() {
        tracing::warn!("DETECTION_API_URL not set; every order completes with a fallback result");
    }
    let detector = HttpDetector::new(
        config.detection_api_url().map(str::to_string),
        config.detection_api_key().map(str::to_string),
        Duration::from_secs(config.detection_timeout_seconds()),
    )
    .context("Failed to build detector client")?;

    let verifier =
        TokenVerifier::new(config.auth()).context("Failed to initialize token verification")?;

    let (state, worker) = AppState::new(
        config.clone(),
        Collaborators {
            ledger: Ledger::postgres(pool.clone()),
            gateway: Arc::new(gateway),
            detector: Arc::new(detector),
            verifier: Arc::new(verifier),
        },
    );

    start_background_tasks(&state, worker, Some(pool));
    Ok(state)
}

/// Spawns the detection worker pool and the upload retention sweep. With a `pool` the
/// worker also listens for Postgres notifications.
pub fn start_background_tasks(
    state: &Arc<AppState>,
    worker: DetectionWorker,
    pool: Option<PgPool>,
) {
    let context: Arc<dyn JobHandlerContext> = state.clone();
    worker.spawn(Arc::downgrade(&context), pool);

    let sweeper = Arc::new(UploadSweeper::new(
        state.ledger.uploads.clone(),
        state.config.upload_retention_hours(),
        state.config.upload_sweep_interval_secs(),
    ));
    sweeper.start();

    tracing::info!(
        max_workers = state.config.detection_queue_max_workers(),
        retention_hours = state.config.upload_retention_hours(),
        "Background tasks started"
    );
}
