//! Order API integration tests: pricing, authorization and listing.

mod helpers;

use helpers::auth::{bearer, ALICE, BOB};
use helpers::setup_test_app;
use serde_json::{json, Value};
use uuid::Uuid;

#[tokio::test]
async fn test_two_uploads_cost_two_hundred_cents() {
    let app = setup_test_app().await;
    app.fund(ALICE, 2).await;
    let first = app.upload_png(ALICE).await;
    let second = app.upload_png(ALICE).await;

    let response = app
        .client()
        .post("/orders")
        .json(&json!({ "uploadIds": [first, second], "currency": "ngn" }))
        .await;

    assert_eq!(response.status_code(), 201);
    let order: Value = response.json();
    assert_eq!(order["totalAmountCents"], 200);
    assert_eq!(order["currency"], "NGN");
    assert_eq!(order["status"], "awaiting_payment");
    assert!(order["userId"].is_null());
}

#[tokio::test]
async fn test_create_order_rejects_bad_input() {
    let app = setup_test_app().await;

    let empty = app
        .client()
        .post("/orders")
        .json(&json!({ "uploadIds": [] }))
        .await;
    assert_eq!(empty.status_code(), 400);

    let unknown = app
        .client()
        .post("/orders")
        .json(&json!({ "uploadIds": [Uuid::new_v4()] }))
        .await;
    assert_eq!(unknown.status_code(), 400);

    let malformed = app
        .client()
        .post("/orders")
        .json(&json!({ "uploadIds": ["not-a-uuid"] }))
        .await;
    assert_eq!(malformed.status_code(), 400);
    let body: Value = malformed.json();
    assert_eq!(body["code"], "INVALID_REQUEST");
}

#[tokio::test]
async fn test_anonymous_order_is_readable_anonymously() {
    let app = setup_test_app().await;
    app.fund(ALICE, 1).await;
    let upload = app.upload_png(ALICE).await;
    let order_id = app.create_order(&[upload], None).await;

    let response = app
        .client()
        .get("/orders")
        .add_query_param("orderId", order_id)
        .await;
    assert_eq!(response.status_code(), 200);
    let order: Value = response.json();
    assert_eq!(order["id"], order_id.to_string());
}

#[tokio::test]
async fn test_owned_order_is_hidden_from_others() {
    let app = setup_test_app().await;
    app.fund(ALICE, 1).await;
    let upload = app.upload_png(ALICE).await;
    let order_id = app.create_order(&[upload], Some(ALICE)).await;

    let owner = app
        .client()
        .get("/orders")
        .add_query_param("orderId", order_id)
        .add_header("Authorization", bearer(ALICE))
        .await;
    assert_eq!(owner.status_code(), 200);

    let other = app
        .client()
        .get("/orders")
        .add_query_param("orderId", order_id)
        .add_header("Authorization", bearer(BOB))
        .await;
    assert_eq!(other.status_code(), 403);

    let anonymous = app
        .client()
        .get("/orders")
        .add_query_param("orderId", order_id)
        .await;
    assert_eq!(anonymous.status_code(), 403);
}

#[tokio::test]
async fn test_unknown_order_is_not_found() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .get("/orders")
        .add_query_param("orderId", Uuid::new_v4())
        .await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_listing_requires_a_user_and_returns_only_theirs() {
    let app = setup_test_app().await;
    app.fund(ALICE, 2).await;
    app.fund(BOB, 1).await;

    let mine = app.upload_png(ALICE).await;
    let mine_too = app.upload_png(ALICE).await;
    let theirs = app.upload_png(BOB).await;
    let first = app.create_order(&[mine], Some(ALICE)).await;
    let second = app.create_order(&[mine_too], Some(ALICE)).await;
    app.create_order(&[theirs], Some(BOB)).await;

    let anonymous = app.client().get("/orders").await;
    assert_eq!(anonymous.status_code(), 401);

    let response = app
        .client()
        .get("/orders")
        .add_header("Authorization", bearer(ALICE))
        .await;
    assert_eq!(response.status_code(), 200);
    let body: Value = response.json();
    let ids: Vec<&str> = body["orders"]
        .as_array()
        .unwrap()
        .iter()
        .map(|o| o["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![second.to_string(), first.to_string()]);

    let limited = app
        .client()
        .get("/orders")
        .add_query_param("limit", 1)
        .add_header("Authorization", bearer(ALICE))
        .await;
    let body: Value = limited.json();
    assert_eq!(body["orders"].as_array().unwrap().len(), 1);
}
