//! Detection dispatch through the process-order endpoint and the background worker.

mod helpers;

use deepcheck_core::models::{NewUpload, OrderStatus, UploadFunding};
use helpers::auth::{bearer, ALICE, BOB};
use helpers::fakes::FakeDetector;
use helpers::{setup_test_app, setup_test_app_with, TestApp};
use serde_json::{json, Value};
use std::time::Duration;
use uuid::Uuid;

/// Funds Alice, uploads, and pays the order from her token rail. Returns the order id.
async fn paid_order(app: &TestApp) -> Uuid {
    app.fund(ALICE, 1).await;
    let upload = app.upload_png(ALICE).await;
    let order_id = app.create_order(&[upload], Some(ALICE)).await;
    let response = app
        .client()
        .post("/create-paystack")
        .add_header("Authorization", bearer(ALICE))
        .json(&json!({ "orderId": order_id }))
        .await;
    let body: Value = response.json();
    assert_eq!(body["mode"], "tokens");
    order_id
}

async fn process(app: &TestApp, order_id: Uuid, email: Option<&str>) -> axum_test::TestResponse {
    let mut request = app
        .client()
        .post("/process-order")
        .json(&json!({ "orderId": order_id }));
    if let Some(email) = email {
        request = request.add_header("Authorization", bearer(email));
    }
    request.await
}

#[tokio::test]
async fn test_unpaid_order_cannot_be_processed() {
    let app = setup_test_app().await;
    app.fund(ALICE, 1).await;
    let upload = app.upload_png(ALICE).await;
    let order_id = app.create_order(&[upload], Some(ALICE)).await;

    let response = process(&app, order_id, Some(ALICE)).await;
    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_REQUEST");
    assert_eq!(app.detector.calls(), 0);
}

#[tokio::test]
async fn test_completed_order_returns_stored_result() {
    let app = setup_test_app().await;
    let order_id = paid_order(&app).await;
    app.wait_for_status(order_id, OrderStatus::Completed).await;

    let response = process(&app, order_id, Some(ALICE)).await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["orderId"], order_id.to_string());
    assert_eq!(body["status"], "completed");
    assert_eq!(body["queued"], false);
    assert_eq!(body["result"]["score"], 0.92);
    assert_eq!(body["result"]["fallback"], false);

    // Asking again never runs detection twice.
    process(&app, order_id, Some(ALICE)).await;
    assert_eq!(app.detector.calls(), 1);
}

#[tokio::test]
async fn test_detector_outage_stores_fallback_result() {
    let app = setup_test_app_with(FakeDetector::failing()).await;
    let order_id = paid_order(&app).await;

    let order = app.wait_for_status(order_id, OrderStatus::Completed).await;
    let result = order.result.unwrap();
    assert_eq!(result["fallback"], true);
    assert_eq!(result["score"], 0.5);
    assert_eq!(result["status"], "fallback");
    assert_eq!(result["fallbackReason"], "detector_error");
    assert_eq!(app.detector.calls(), 1);
}

#[tokio::test]
async fn test_processing_another_users_order_is_denied() {
    let app = setup_test_app().await;
    let order_id = paid_order(&app).await;

    assert_eq!(process(&app, order_id, Some(BOB)).await.status_code(), 403);
    assert_eq!(process(&app, order_id, None).await.status_code(), 403);
    assert_eq!(process(&app, Uuid::new_v4(), Some(ALICE)).await.status_code(), 404);
}

#[tokio::test]
async fn test_process_order_validates_body() {
    let app = setup_test_app().await;
    let response = app
        .client()
        .post("/process-order")
        .add_header("Authorization", bearer(ALICE))
        .json(&json!({ "orderId": "not-a-uuid" }))
        .await;
    assert_eq!(response.status_code(), 400);
}

#[tokio::test]
async fn test_order_fails_once_retries_are_exhausted() {
    let app = setup_test_app().await;
    let alice = app.state.tokens.get_or_create_user(ALICE).await.unwrap();

    // Prepaid upload record whose bytes never arrived, so every attempt errors before detection.
    let upload = app
        .ledger
        .uploads
        .create_upload(NewUpload {
            filename: "lost.png".to_string(),
            size: 4,
            mime: "image/png".to_string(),
            metadata: UploadFunding::Tokens { user_id: alice.id }.to_metadata(),
        })
        .await
        .unwrap();
    let order_id = app.create_order(&[upload.id], Some(ALICE)).await;

    let response = app
        .client()
        .post("/create-paystack")
        .add_header("Authorization", bearer(ALICE))
        .json(&json!({ "orderId": order_id }))
        .await;
    let body: Value = response.json();
    assert_eq!(body["mode"], "tokens");

    let order = app
        .wait_for_status_within(order_id, OrderStatus::Failed, Duration::from_secs(10))
        .await;
    assert!(order.result.is_none());
    assert_eq!(app.detector.calls(), 0);

    let job = app
        .ledger
        .jobs
        .active_job_for_order(order_id)
        .await
        .unwrap();
    assert!(job.is_none());

    let response = process(&app, order_id, Some(ALICE)).await;
    assert_eq!(response.status_code(), 400);
}
