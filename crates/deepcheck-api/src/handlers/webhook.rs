use crate::error::{ErrorResponse, HttpAppError};
use crate::services::reconcile;
use crate::state::AppState;
use axum::{
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
    Json,
};
use bytes::Bytes;
use deepcheck_core::AppError;
use deepcheck_payments::{
    parse_webhook, verify_webhook_signature, ChargeStatus, PaystackEvent, SIGNATURE_HEADER,
    SIGNATURE_HEADER_ALIAS,
};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct WebhookAck {
    pub received: bool,
}

#[utoipa::path(
    post,
    path = "/api/webhook/paystack",
    tag = "payments",
    request_body(content = String, description = "Raw provider event, signed with HMAC-SHA512", content_type = "application/json"),
    responses(
        (status = 200, description = "Event accepted", body = WebhookAck),
        (status = 400, description = "Bad signature or malformed payload", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip_all, fields(size = body.len()))]
pub async fn paystack_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, HttpAppError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .or_else(|| headers.get(SIGNATURE_HEADER_ALIAS))
        .and_then(|v| v.to_str().ok());

    if !verify_webhook_signature(&body, signature, state.config.paystack_webhook_secret()) {
        return Err(AppError::InvalidRequest("Invalid webhook signature".to_string()).into());
    }

    match parse_webhook(&body)? {
        PaystackEvent::ChargeSuccess(charge) => {
            tracing::info!(reference = %charge.reference, "charge.success received");
            reconcile(
                &state,
                &charge.reference,
                ChargeStatus::Paid,
                charge.purpose(),
                charge.amount,
            )
            .await?;
        }
        PaystackEvent::Other { event } => {
            tracing::debug!(%event, "Ignoring webhook event");
        }
    }

    Ok(Json(WebhookAck { received: true }))
}
