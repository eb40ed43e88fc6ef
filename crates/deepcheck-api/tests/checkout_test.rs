//! Checkout integration tests: demo bypass, token rail and card checkout.

mod helpers;

use deepcheck_core::models::OrderStatus;
use helpers::auth::{bearer, ALICE, BOB};
use helpers::{setup_test_app, DEMO_EMAIL};
use serde_json::{json, Value};
use uuid::Uuid;

#[tokio::test]
async fn test_demo_checkout_pays_without_gateway() {
    let app = setup_test_app().await;
    let upload = app.upload_png(DEMO_EMAIL).await;
    let order_id = app.create_order(&[upload], None).await;

    let response = app
        .client()
        .post("/create-paystack")
        .add_header("Authorization", bearer(DEMO_EMAIL))
        .json(&json!({ "orderId": order_id }))
        .await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["mode"], "demo");
    assert!(body["reference"].as_str().unwrap().starts_with("demo_"));
    assert!(body.get("authorizationUrl").is_none());
    assert_eq!(app.gateway.initialized_count(), 0);

    let order = app.wait_for_status(order_id, OrderStatus::Completed).await;
    assert!(order.user_id.is_some());
    assert_eq!(app.detector.calls(), 1);
}

#[tokio::test]
async fn test_token_funded_order_skips_card() {
    let app = setup_test_app().await;
    app.fund(ALICE, 1).await;
    let upload = app.upload_png(ALICE).await;
    let order_id = app.create_order(&[upload], Some(ALICE)).await;

    let response = app
        .client()
        .post("/create-paystack")
        .add_header("Authorization", bearer(ALICE))
        .json(&json!({ "orderId": order_id }))
        .await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["mode"], "tokens");
    assert_eq!(
        body["reference"],
        format!("tok_{}", order_id.simple())
    );
    assert_eq!(app.gateway.initialized_count(), 0);
    app.wait_for_status(order_id, OrderStatus::Completed).await;
}

#[tokio::test]
async fn test_token_funded_upload_pays_for_one_order_only() {
    let app = setup_test_app().await;
    app.fund(ALICE, 1).await;
    let upload = app.upload_png(ALICE).await;
    assert_eq!(app.balance(ALICE).await, 0);

    let mut modes = Vec::new();
    let mut order_ids = Vec::new();
    for _ in 0..3 {
        let order_id = app.create_order(&[upload], Some(ALICE)).await;
        let response = app
            .client()
            .post("/create-paystack")
            .add_header("Authorization", bearer(ALICE))
            .json(&json!({ "orderId": order_id }))
            .await;
        assert_eq!(response.status_code(), 200);
        let body: Value = response.json();
        modes.push(body["mode"].as_str().unwrap().to_string());
        order_ids.push(order_id);
    }

    assert_eq!(modes, ["tokens", "card", "card"]);
    assert_eq!(app.gateway.initialized_count(), 2);

    app.wait_for_status(order_ids[0], OrderStatus::Completed).await;
    for order_id in &order_ids[1..] {
        let order = app.ledger.orders.get_order(*order_id).await.unwrap().unwrap();
        assert_eq!(order.status, OrderStatus::PaymentPending);
    }
    assert_eq!(app.detector.calls(), 1);
    assert_eq!(app.balance(ALICE).await, 0);
}

#[tokio::test]
async fn test_card_checkout_for_uploads_funded_by_someone_else() {
    let app = setup_test_app().await;
    app.fund(ALICE, 1).await;
    let upload = app.upload_png(ALICE).await;
    let order_id = app.create_order(&[upload], None).await;

    let response = app
        .client()
        .post("/create-paystack")
        .add_header("Authorization", bearer(BOB))
        .json(&json!({ "orderId": order_id }))
        .await;

    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    assert_eq!(body["mode"], "card");
    assert_eq!(body["status"], "payment_pending");
    let reference = body["reference"].as_str().unwrap();
    assert!(reference.starts_with(&format!("ord_{}_", order_id.simple())));
    assert!(body["authorizationUrl"].as_str().unwrap().ends_with(reference));

    let initialized = app.gateway.initialized();
    assert_eq!(initialized.len(), 1);
    assert_eq!(initialized[0].email, BOB);
    assert_eq!(initialized[0].amount_cents, 100);
    assert_eq!(initialized[0].currency.as_deref(), Some("NGN"));
    assert_eq!(initialized[0].metadata["orderId"], order_id.to_string());

    // Checkout claimed the anonymous order for the payer.
    let stored = app.ledger.orders.get_order(order_id).await.unwrap().unwrap();
    let bob = app.ledger.users.get_user_by_email(BOB).await.unwrap().unwrap();
    assert_eq!(stored.user_id, Some(bob.id));
}

#[tokio::test]
async fn test_checkout_of_someone_elses_order_is_denied() {
    let app = setup_test_app().await;
    app.fund(ALICE, 1).await;
    let upload = app.upload_png(ALICE).await;
    let order_id = app.create_order(&[upload], Some(ALICE)).await;

    let response = app
        .client()
        .post("/create-paystack")
        .add_header("Authorization", bearer(BOB))
        .json(&json!({ "orderId": order_id }))
        .await;

    assert_eq!(response.status_code(), 403);
    assert_eq!(app.gateway.initialized_count(), 0);
}

#[tokio::test]
async fn test_checkout_of_paid_order_reports_already_paid() {
    let app = setup_test_app().await;
    let upload = app.upload_png(DEMO_EMAIL).await;
    let order_id = app.create_order(&[upload], Some(DEMO_EMAIL)).await;

    for expected in ["demo", "already_paid"] {
        let response = app
            .client()
            .post("/create-paystack")
            .add_header("Authorization", bearer(DEMO_EMAIL))
            .json(&json!({ "orderId": order_id }))
            .await;
        assert_eq!(response.status_code(), 200);
        let body: Value = response.json();
        assert_eq!(body["mode"], expected);
    }
}

#[tokio::test]
async fn test_checkout_errors() {
    let app = setup_test_app().await;

    let anonymous = app
        .client()
        .post("/create-paystack")
        .json(&json!({ "orderId": Uuid::new_v4() }))
        .await;
    assert_eq!(anonymous.status_code(), 401);

    let missing = app
        .client()
        .post("/create-paystack")
        .add_header("Authorization", bearer(ALICE))
        .json(&json!({ "orderId": Uuid::new_v4() }))
        .await;
    assert_eq!(missing.status_code(), 404);
}
