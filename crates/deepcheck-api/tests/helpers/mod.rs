//! Shared setup for API integration tests.
//!
//! The app runs over the in-memory ledger with a fake payment gateway and a fake detector, so
//! these tests need neither Postgres nor network access.

#![allow(dead_code)]

pub mod auth;
pub mod fakes;

use axum_test::multipart::{MultipartForm, Part};
use axum_test::TestServer;
use deepcheck_api::auth::TokenVerifier;
use deepcheck_api::setup::{routes::setup_routes, services::start_background_tasks};
use deepcheck_api::state::{AppState, Collaborators};
use deepcheck_core::config::{AuthConfig, BaseConfig, ServiceConfig};
use deepcheck_core::models::{Order, OrderStatus};
use deepcheck_core::Config;
use deepcheck_db::Ledger;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use fakes::{FakeDetector, FakeGateway};

pub const JWT_SECRET: &str = "test-jwt-secret-that-is-at-least-32-characters";
pub const WEBHOOK_SECRET: &str = "sk_test_webhook_secret";
pub const DEMO_EMAIL: &str = "demo@deepcheck.test";
pub const DEMO_FLOOR: i64 = 300;

pub struct TestApp {
    pub server: TestServer,
    pub state: Arc<AppState>,
    pub ledger: Ledger,
    pub gateway: Arc<FakeGateway>,
    pub detector: Arc<FakeDetector>,
}

impl TestApp {
    pub fn client(&self) -> &TestServer {
        &self.server
    }

    /// Polls the ledger until the order reaches `status` or two seconds pass.
    pub async fn wait_for_status(&self, order_id: Uuid, status: OrderStatus) -> Order {
        self.wait_for_status_within(order_id, status, Duration::from_secs(2))
            .await
    }

    /// Polls the ledger until the order reaches `status` or `limit` passes.
    pub async fn wait_for_status_within(
        &self,
        order_id: Uuid,
        status: OrderStatus,
        limit: Duration,
    ) -> Order {
        let polls = limit.as_millis() / 10;
        for _ in 0..polls {
            let order = self
                .ledger
                .orders
                .get_order(order_id)
                .await
                .expect("ledger read failed")
                .expect("order vanished");
            if order.status == status {
                return order;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("order {order_id} never reached {status}");
    }

    /// Credits `tokens` to the user behind `email`, creating the user if needed.
    pub async fn fund(&self, email: &str, tokens: i64) {
        let user = self
            .state
            .tokens
            .get_or_create_user(email)
            .await
            .expect("user creation failed");
        self.state
            .tokens
            .credit(user.id, tokens)
            .await
            .expect("credit failed");
    }

    pub async fn balance(&self, email: &str) -> i64 {
        self.ledger
            .users
            .get_user_by_email(email)
            .await
            .expect("ledger read failed")
            .map(|u| u.tokens)
            .unwrap_or(0)
    }

    /// Uploads a small PNG as `email` and returns the upload id.
    pub async fn upload_png(&self, email: &str) -> Uuid {
        let response = self
            .server
            .post("/uploads")
            .add_header("Authorization", auth::bearer(email))
            .multipart(png_form())
            .await;
        assert_eq!(response.status_code(), 201, "{}", response.text());
        let body: Value = response.json();
        Uuid::parse_str(body["upload"]["id"].as_str().expect("upload id")).expect("uuid")
    }

    /// Creates an order over `upload_ids`, authenticated as `email` when given.
    pub async fn create_order(&self, upload_ids: &[Uuid], email: Option<&str>) -> Uuid {
        let mut request = self
            .server
            .post("/orders")
            .json(&serde_json::json!({ "uploadIds": upload_ids }));
        if let Some(email) = email {
            request = request.add_header("Authorization", auth::bearer(email));
        }
        let response = request.await;
        assert_eq!(response.status_code(), 201, "{}", response.text());
        let body: Value = response.json();
        Uuid::parse_str(body["id"].as_str().expect("order id")).expect("uuid")
    }
}

pub fn png_form() -> MultipartForm {
    let part = Part::bytes(png_bytes())
        .file_name("photo.png")
        .mime_type("image/png");
    MultipartForm::new().add_part("file", part)
}

pub fn png_bytes() -> Vec<u8> {
    vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0, 0, 0]
}

pub fn test_config() -> Config {
    Config(Box::new(ServiceConfig {
        base: BaseConfig {
            server_port: 0,
            cors_origins: vec!["*".to_string()],
            db_max_connections: 1,
            db_timeout_seconds: 1,
            environment: "test".to_string(),
            log_format: "text".to_string(),
        },
        database_url: "postgresql://unused/deepcheck".to_string(),
        auth: AuthConfig {
            jwt_secret: Some(JWT_SECRET.to_string()),
            ..Default::default()
        },
        paystack_secret_key: Some(WEBHOOK_SECRET.to_string()),
        paystack_webhook_secret: None,
        paystack_base_url: "http://paystack.invalid".to_string(),
        payment_callback_url: Some("https://app.deepcheck.test/payment/callback".to_string()),
        default_currency: "NGN".to_string(),
        detection_api_url: None,
        detection_api_key: None,
        detection_timeout_seconds: 5,
        demo_account_emails: vec![DEMO_EMAIL.to_string()],
        demo_token_floor: DEMO_FLOOR,
        max_image_size_bytes: 1024 * 1024,
        max_video_size_bytes: 2 * 1024 * 1024,
        upload_retention_hours: 24,
        upload_sweep_interval_secs: 0,
        detection_queue_max_workers: 2,
        detection_queue_poll_interval_ms: 20,
        detection_queue_max_retries: 2,
        detection_queue_timeout_seconds: 5,
        detection_queue_stale_reap_interval_secs: 0,
        detection_queue_stale_grace_period_secs: 60,
    }))
}

pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(FakeDetector::default()).await
}

pub async fn setup_test_app_with(detector: FakeDetector) -> TestApp {
    let ledger = Ledger::in_memory();
    let gateway = Arc::new(FakeGateway::default());
    let detector = Arc::new(detector);

    let (state, worker) = AppState::new(
        test_config(),
        Collaborators {
            ledger: ledger.clone(),
            gateway: gateway.clone(),
            detector: detector.clone(),
            verifier: Arc::new(TokenVerifier::from_secret(JWT_SECRET)),
        },
    );
    start_background_tasks(&state, worker, None);

    let app = setup_routes(state.clone());
    let server = TestServer::new(app.into_make_service()).expect("Failed to create test server");

    TestApp {
        server,
        state,
        ledger,
        gateway,
        detector,
    }
}
