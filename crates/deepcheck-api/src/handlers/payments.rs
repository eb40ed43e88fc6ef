use crate::error::{ErrorResponse, HttpAppError};
use crate::services::{reconcile, Reconciliation};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use deepcheck_core::constants::{PAYMENT_POLL_INTERVAL_MS, PAYMENT_POLL_MAX_ATTEMPTS};
use deepcheck_core::models::{OrderStatus, PurchaseStatus};
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentStatusResponse {
    pub reference: String,
    /// `paid`, `failed` or `pending`.
    pub status: String,
    /// Status text reported by the provider.
    pub provider_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_status: Option<OrderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub purchase_status: Option<PurchaseStatus>,
    /// Buyer's balance after a credited purchase.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balance: Option<i64>,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
}

#[utoipa::path(
    get,
    path = "/api/payments/status/{reference}",
    tag = "payments",
    params(
        ("reference" = String, Path, description = "Gateway transaction reference")
    ),
    responses(
        (status = 200, description = "Verified and reconciled", body = PaymentStatusResponse),
        (status = 500, description = "Payment gateway not configured", body = ErrorResponse),
        (status = 502, description = "Payment gateway error", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state))]
pub async fn payment_status(
    State(state): State<Arc<AppState>>,
    Path(reference): Path<String>,
) -> Result<impl IntoResponse, HttpAppError> {
    let verified = state.gateway.verify_reference(&reference).await?;
    let reconciliation = reconcile(
        &state,
        &verified.reference,
        verified.status,
        verified.purpose,
        verified.amount_cents,
    )
    .await?;

    let mut response = PaymentStatusResponse {
        reference: verified.reference,
        status: verified.status.as_str().to_string(),
        provider_status: verified.provider_status,
        order_id: None,
        order_status: None,
        tokens: None,
        purchase_status: None,
        balance: None,
        poll_interval_ms: PAYMENT_POLL_INTERVAL_MS,
        max_poll_attempts: PAYMENT_POLL_MAX_ATTEMPTS,
    };
    match reconciliation {
        Reconciliation::Order(order) => {
            response.order_id = Some(order.id);
            response.order_status = Some(order.status);
        }
        Reconciliation::Purchase { purchase, balance } => {
            response.tokens = Some(purchase.tokens);
            response.purchase_status = Some(purchase.status);
            response.balance = balance;
        }
        Reconciliation::Unmatched => {}
    }
    Ok(Json(response))
}
