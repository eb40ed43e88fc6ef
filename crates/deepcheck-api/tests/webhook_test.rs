//! Provider webhook integration tests: signature checks and exactly-once application.

mod helpers;

use deepcheck_core::models::{OrderStatus, PurchaseStatus};
use deepcheck_payments::{sign_payload, PaymentPurpose, SIGNATURE_HEADER, SIGNATURE_HEADER_ALIAS};
use helpers::auth::{bearer, ALICE, BOB};
use helpers::{setup_test_app, TestApp, WEBHOOK_SECRET};
use serde_json::{json, Value};
use uuid::Uuid;

fn charge_success(reference: &str, amount: i64, metadata: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "event": "charge.success",
        "data": {
            "reference": reference,
            "amount": amount,
            "currency": "NGN",
            "status": "success",
            "metadata": metadata,
            "customer": { "email": BOB }
        }
    }))
    .unwrap()
}

async fn deliver(app: &TestApp, body: &[u8]) -> u16 {
    app.client()
        .post("/webhook/paystack")
        .add_header(SIGNATURE_HEADER, sign_payload(body, WEBHOOK_SECRET))
        .add_header("Content-Type", "application/json")
        .bytes(body.to_vec().into())
        .await
        .status_code()
        .as_u16()
}

/// Card checkout by Bob for an order over one of Alice's uploads. Returns (order, reference).
async fn pending_card_order(app: &TestApp) -> (Uuid, String) {
    app.fund(ALICE, 1).await;
    let upload = app.upload_png(ALICE).await;
    let order_id = app.create_order(&[upload], None).await;
    let response = app
        .client()
        .post("/create-paystack")
        .add_header("Authorization", bearer(BOB))
        .json(&json!({ "orderId": order_id }))
        .await;
    let body: Value = response.json();
    (order_id, body["reference"].as_str().unwrap().to_string())
}

#[tokio::test]
async fn test_charge_success_pays_order_and_detects_once_under_replay() {
    let app = setup_test_app().await;
    let (order_id, reference) = pending_card_order(&app).await;
    let body = charge_success(&reference, 100, PaymentPurpose::order_metadata(order_id));

    assert_eq!(deliver(&app, &body).await, 200);
    let order = app.wait_for_status(order_id, OrderStatus::Completed).await;
    assert_eq!(order.payment_ref.as_deref(), Some(reference.as_str()));
    assert_eq!(order.result.as_ref().unwrap()["score"], 0.92);

    assert_eq!(deliver(&app, &body).await, 200);
    assert_eq!(deliver(&app, &body).await, 200);
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    assert_eq!(app.detector.calls(), 1);
    let order = app.ledger.orders.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Completed);
}

#[tokio::test]
async fn test_alias_signature_header_is_accepted() {
    let app = setup_test_app().await;
    let (order_id, reference) = pending_card_order(&app).await;
    let body = charge_success(&reference, 100, PaymentPurpose::order_metadata(order_id));

    let response = app
        .client()
        .post("/webhook/paystack")
        .add_header(SIGNATURE_HEADER_ALIAS, sign_payload(&body, WEBHOOK_SECRET))
        .bytes(body.into())
        .await;
    assert_eq!(response.status_code(), 200);
    app.wait_for_status(order_id, OrderStatus::Completed).await;
}

#[tokio::test]
async fn test_bad_signature_is_rejected_without_effect() {
    let app = setup_test_app().await;
    let (order_id, reference) = pending_card_order(&app).await;
    let body = charge_success(&reference, 100, PaymentPurpose::order_metadata(order_id));

    let forged = app
        .client()
        .post("/webhook/paystack")
        .add_header(SIGNATURE_HEADER, sign_payload(&body, "sk_test_someone_else"))
        .bytes(body.clone().into())
        .await;
    assert_eq!(forged.status_code(), 400);

    let unsigned = app
        .client()
        .post("/webhook/paystack")
        .bytes(body.into())
        .await;
    assert_eq!(unsigned.status_code(), 400);

    let order = app.ledger.orders.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::PaymentPending);
}

#[tokio::test]
async fn test_underpaid_charge_does_not_mark_paid() {
    let app = setup_test_app().await;
    let (order_id, reference) = pending_card_order(&app).await;
    let body = charge_success(&reference, 50, PaymentPurpose::order_metadata(order_id));

    assert_eq!(deliver(&app, &body).await, 200);
    let order = app.ledger.orders.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::PaymentPending);
}

#[tokio::test]
async fn test_token_purchase_is_credited_exactly_once() {
    let app = setup_test_app().await;
    let response = app
        .client()
        .post("/purchase-tokens")
        .add_header("Authorization", bearer(ALICE))
        .json(&json!({ "tokens": 5 }))
        .await;
    assert_eq!(response.status_code(), 200);
    let started: Value = response.json();
    let reference = started["reference"].as_str().unwrap().to_string();

    let body = charge_success(&reference, 500, PaymentPurpose::token_metadata(5, ALICE));
    assert_eq!(deliver(&app, &body).await, 200);
    assert_eq!(deliver(&app, &body).await, 200);

    assert_eq!(app.balance(ALICE).await, 5);
    let purchase = app
        .ledger
        .purchases
        .get_purchase(&reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(purchase.status, PurchaseStatus::Credited);
}

#[tokio::test]
async fn test_token_metadata_without_matching_charge_credits_nothing() {
    let app = setup_test_app().await;

    // Signed event whose metadata asks for far more tokens than the amount paid for.
    let body = charge_success("tkp_forged_1", 100, PaymentPurpose::token_metadata(10_000, BOB));
    assert_eq!(deliver(&app, &body).await, 200);
    assert_eq!(app.balance(BOB).await, 0);
    assert!(app
        .ledger
        .purchases
        .get_purchase("tkp_forged_1")
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_short_charge_leaves_started_purchase_pending() {
    let app = setup_test_app().await;
    let response = app
        .client()
        .post("/purchase-tokens")
        .add_header("Authorization", bearer(ALICE))
        .json(&json!({ "tokens": 5 }))
        .await;
    assert_eq!(response.status_code(), 200);
    let started: Value = response.json();
    let reference = started["reference"].as_str().unwrap().to_string();

    let body = charge_success(&reference, 400, PaymentPurpose::token_metadata(5, ALICE));
    assert_eq!(deliver(&app, &body).await, 200);

    assert_eq!(app.balance(ALICE).await, 0);
    let purchase = app
        .ledger
        .purchases
        .get_purchase(&reference)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(purchase.status, PurchaseStatus::Pending);
}

#[tokio::test]
async fn test_other_events_and_unknown_references_are_acknowledged() {
    let app = setup_test_app().await;

    let transfer = serde_json::to_vec(&json!({ "event": "transfer.success", "data": {} })).unwrap();
    assert_eq!(deliver(&app, &transfer).await, 200);

    let stray = charge_success("ord_unknown_1", 100, Value::Null);
    assert_eq!(deliver(&app, &stray).await, 200);

    let malformed = b"{not json".to_vec();
    assert_eq!(deliver(&app, &malformed).await, 400);
}
