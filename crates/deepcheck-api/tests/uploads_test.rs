//! Upload API integration tests.
//!
//! Run with: `cargo test -p deepcheck-api --test uploads_test`

mod helpers;

use axum_test::multipart::{MultipartForm, Part};
use helpers::auth::{bearer, ALICE};
use helpers::{png_form, setup_test_app, DEMO_EMAIL, DEMO_FLOOR};
use serde_json::Value;

#[tokio::test]
async fn test_upload_deducts_one_token() {
    let app = setup_test_app().await;
    app.fund(ALICE, 3).await;

    let response = app
        .client()
        .post("/uploads")
        .add_header("Authorization", bearer(ALICE))
        .multipart(png_form())
        .await;

    assert_eq!(response.status_code(), 201);
    let body: Value = response.json();
    assert_eq!(body["remainingTokens"], 2);
    assert_eq!(body["upload"]["mime"], "image/png");
    assert_eq!(body["upload"]["status"], "uploaded");
    assert_eq!(body["upload"]["metadata"]["funding"], "tokens");
    assert_eq!(app.balance(ALICE).await, 2);
}

#[tokio::test]
async fn test_upload_is_also_served_under_api_prefix() {
    let app = setup_test_app().await;
    app.fund(ALICE, 1).await;

    let response = app
        .client()
        .post("/api/uploads")
        .add_header("Authorization", bearer(ALICE))
        .multipart(png_form())
        .await;
    assert_eq!(response.status_code(), 201);
}

#[tokio::test]
async fn test_disallowed_mime_is_rejected_before_any_side_effect() {
    let app = setup_test_app().await;
    app.fund(ALICE, 3).await;

    let part = Part::bytes(b"just text".to_vec())
        .file_name("notes.txt")
        .mime_type("text/plain");
    let response = app
        .client()
        .post("/uploads")
        .add_header("Authorization", bearer(ALICE))
        .multipart(MultipartForm::new().add_part("file", part))
        .await;

    assert_eq!(response.status_code(), 400);
    let body: Value = response.json();
    assert_eq!(body["code"], "INVALID_REQUEST");
    assert!(app.ledger.uploads.list_uploads().await.unwrap().is_empty());
    assert_eq!(app.balance(ALICE).await, 3);
}

#[tokio::test]
async fn test_oversized_image_is_rejected() {
    let app = setup_test_app().await;
    app.fund(ALICE, 3).await;

    // Image limit in the test config is 1 MiB.
    let part = Part::bytes(vec![0u8; 1024 * 1024 + 1])
        .file_name("huge.jpg")
        .mime_type("image/jpeg");
    let response = app
        .client()
        .post("/uploads")
        .add_header("Authorization", bearer(ALICE))
        .multipart(MultipartForm::new().add_part("file", part))
        .await;

    assert_eq!(response.status_code(), 400);
    assert_eq!(app.balance(ALICE).await, 3);
}

#[tokio::test]
async fn test_insufficient_tokens_removes_upload_and_reports_shortfall() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .post("/uploads")
        .add_header("Authorization", bearer(ALICE))
        .multipart(png_form())
        .await;

    assert_eq!(response.status_code(), 402);
    let body: Value = response.json();
    assert_eq!(body["code"], "INSUFFICIENT_TOKENS");
    assert_eq!(body["context"]["currentTokens"], 0);
    assert_eq!(body["context"]["requiredTokens"], 1);
    assert!(app.ledger.uploads.list_uploads().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_demo_upload_is_free() {
    let app = setup_test_app().await;

    let response = app
        .client()
        .post("/uploads")
        .add_header("Authorization", bearer(DEMO_EMAIL))
        .multipart(png_form())
        .await;

    assert_eq!(response.status_code(), 201);
    let body: Value = response.json();
    assert_eq!(body["remainingTokens"], DEMO_FLOOR);
    assert_eq!(body["upload"]["metadata"]["funding"], "demo");
}

#[tokio::test]
async fn test_upload_requires_authentication() {
    let app = setup_test_app().await;

    let anonymous = app.client().post("/uploads").multipart(png_form()).await;
    assert_eq!(anonymous.status_code(), 401);

    let forged = app
        .client()
        .post("/uploads")
        .add_header("Authorization", "Bearer not-a-jwt")
        .multipart(png_form())
        .await;
    assert_eq!(forged.status_code(), 401);

    let basic = app
        .client()
        .post("/uploads")
        .add_header("Authorization", "Basic YWxpY2U6cGFzcw==")
        .multipart(png_form())
        .await;
    assert_eq!(basic.status_code(), 401);
}

#[tokio::test]
async fn test_missing_file_field() {
    let app = setup_test_app().await;
    app.fund(ALICE, 1).await;

    let form = MultipartForm::new().add_text("note", "no file here");
    let response = app
        .client()
        .post("/uploads")
        .add_header("Authorization", bearer(ALICE))
        .multipart(form)
        .await;

    assert_eq!(response.status_code(), 400);
    assert_eq!(app.balance(ALICE).await, 1);
}
