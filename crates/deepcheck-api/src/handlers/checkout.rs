use crate::auth::CurrentUser;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::services::{checkout, CheckoutResponse};
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use serde::Deserialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderRef {
    pub order_id: Uuid,
}

#[utoipa::path(
    post,
    path = "/api/create-paystack",
    tag = "payments",
    request_body = OrderRef,
    responses(
        (status = 200, description = "Order settled or card checkout started", body = CheckoutResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse),
        (status = 403, description = "Order belongs to another user", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse),
        (status = 409, description = "Order can no longer be paid", body = ErrorResponse),
        (status = 500, description = "Payment gateway not configured", body = ErrorResponse),
        (status = 502, description = "Payment gateway error", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, user), fields(user_id = %user.0.id, order_id = %request.order_id))]
pub async fn create_checkout(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ValidatedJson(request): ValidatedJson<OrderRef>,
) -> Result<impl IntoResponse, HttpAppError> {
    let response = checkout(&state, request.order_id, &user.0).await?;
    Ok(Json(response))
}
