use crate::auth::CurrentUser;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::services::{start_token_purchase, PurchaseStarted};
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use deepcheck_core::constants::{MAX_TOKEN_PURCHASE, MIN_TOKEN_PURCHASE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PurchaseTokensRequest {
    #[validate(range(min = MIN_TOKEN_PURCHASE, max = MAX_TOKEN_PURCHASE))]
    pub tokens: i64,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub email: String,
    pub tokens: i64,
    pub is_demo: bool,
}

#[utoipa::path(
    post,
    path = "/api/purchase-tokens",
    tag = "tokens",
    request_body = PurchaseTokensRequest,
    responses(
        (status = 200, description = "Card transaction started", body = PurchaseStarted),
        (status = 400, description = "Token count out of range", body = ErrorResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse),
        (status = 500, description = "Payment gateway not configured", body = ErrorResponse),
        (status = 502, description = "Payment gateway error", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, user), fields(user_id = %user.0.id, tokens = request.tokens))]
pub async fn purchase_tokens(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    ValidatedJson(request): ValidatedJson<PurchaseTokensRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let started = start_token_purchase(&state, &user.0, request.tokens).await?;
    Ok(Json(started))
}

#[utoipa::path(
    get,
    path = "/api/purchase-tokens",
    tag = "tokens",
    responses(
        (status = 200, description = "Current balance", body = BalanceResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse)
    )
)]
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    CurrentUser(user): CurrentUser,
) -> Result<impl IntoResponse, HttpAppError> {
    Ok(Json(BalanceResponse {
        is_demo: state.tokens.is_demo_account(&user.email),
        email: user.email,
        tokens: user.tokens,
    }))
}
