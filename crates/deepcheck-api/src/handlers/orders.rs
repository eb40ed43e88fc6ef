use crate::auth::MaybeUser;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::services::CreateOrder;
use crate::state::AppState;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use deepcheck_core::models::Order;
use deepcheck_core::AppError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    #[validate(length(min = 1, max = 100, message = "uploadIds must hold 1 to 100 uploads"))]
    pub upload_ids: Vec<Uuid>,
    /// ISO 4217 code. Defaults to the configured currency.
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct OrderQuery {
    /// Fetch a single order instead of listing.
    pub order_id: Option<Uuid>,
    /// List size, 1 to 100. Defaults to 20.
    pub limit: Option<i64>,
    /// Include detection results in the list. Defaults to false.
    pub include_result: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OrderListResponse {
    pub orders: Vec<Order>,
}

#[utoipa::path(
    post,
    path = "/api/orders",
    tag = "orders",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = Order),
        (status = 400, description = "Invalid upload set or currency", body = ErrorResponse),
        (status = 401, description = "Invalid bearer token", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, user, request))]
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    user: MaybeUser,
    ValidatedJson(request): ValidatedJson<CreateOrderRequest>,
) -> Result<impl IntoResponse, HttpAppError> {
    let order = state
        .orders
        .create_order(
            CreateOrder {
                upload_ids: request.upload_ids,
                currency: request.currency,
                notes: request.notes,
            },
            user.id(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(order)))
}

#[utoipa::path(
    get,
    path = "/api/orders",
    tag = "orders",
    params(OrderQuery),
    responses(
        (status = 200, description = "The order when orderId is given, otherwise the caller's orders newest first", body = OrderListResponse),
        (status = 401, description = "Listing requires a bearer token", body = ErrorResponse),
        (status = 403, description = "Order belongs to someone else", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, user))]
pub async fn get_orders(
    State(state): State<Arc<AppState>>,
    user: MaybeUser,
    Query(query): Query<OrderQuery>,
) -> Result<Response, HttpAppError> {
    if let Some(order_id) = query.order_id {
        let order = state.orders.get_authorized(order_id, user.id()).await?;
        return Ok(Json(order).into_response());
    }

    let Some(owner) = user.0 else {
        return Err(AppError::Unauthorized("Sign in to list orders".to_string()).into());
    };

    let include_result = query.include_result.unwrap_or(false);
    let orders = state
        .orders
        .list_for_user(owner.id, query.limit)
        .await?
        .into_iter()
        .map(|order| if include_result { order } else { order.without_result() })
        .collect();
    Ok(Json(OrderListResponse { orders }).into_response())
}
