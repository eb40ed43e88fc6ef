use crate::auth::MaybeUser;
use crate::error::{ErrorResponse, HttpAppError, ValidatedJson};
use crate::handlers::checkout::OrderRef;
use crate::state::AppState;
use axum::{extract::State, response::IntoResponse, Json};
use deepcheck_core::models::OrderStatus;
use deepcheck_core::AppError;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProcessOrderResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    /// True when this call recorded a new detection job.
    pub queued: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<Object>)]
    pub result: Option<serde_json::Value>,
}

#[utoipa::path(
    post,
    path = "/api/process-order",
    tag = "orders",
    request_body = OrderRef,
    responses(
        (status = 200, description = "Detection queued, running, or already complete", body = ProcessOrderResponse),
        (status = 400, description = "Order is not paid", body = ErrorResponse),
        (status = 403, description = "Order belongs to someone else", body = ErrorResponse),
        (status = 404, description = "Order not found", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, user), fields(order_id = %request.order_id))]
pub async fn process_order(
    State(state): State<Arc<AppState>>,
    user: MaybeUser,
    ValidatedJson(request): ValidatedJson<OrderRef>,
) -> Result<impl IntoResponse, HttpAppError> {
    let order = state
        .orders
        .get_authorized(request.order_id, user.id())
        .await?;

    let queued = match order.status {
        OrderStatus::Completed => false,
        OrderStatus::Paid => state.queue.enqueue(order.id).await?.is_some(),
        OrderStatus::Processing => false,
        status => {
            return Err(AppError::InvalidRequest(format!(
                "Order {} is {} and cannot be processed",
                order.id, status
            ))
            .into())
        }
    };

    Ok(Json(ProcessOrderResponse {
        order_id: order.id,
        status: order.status,
        queued,
        result: order.result,
    }))
}
