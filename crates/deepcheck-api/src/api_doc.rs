//! OpenAPI documentation.
//! Handler annotations use `/api/...` paths; every route is also served at the root.

use utoipa::OpenApi;

use crate::error;
use crate::handlers;
use crate::services;
use deepcheck_core::models;

pub fn get_openapi_spec() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Deepcheck API",
        version = "0.1.0",
        description = "Deepfake verification orders: uploads, pricing, payment and detection results"
    ),
    paths(
        handlers::health::health_check,
        handlers::uploads::upload_media,
        handlers::orders::create_order,
        handlers::orders::get_orders,
        handlers::checkout::create_checkout,
        handlers::tokens::purchase_tokens,
        handlers::tokens::get_balance,
        handlers::payments::payment_status,
        handlers::webhook::paystack_webhook,
        handlers::process::process_order,
    ),
    components(
        schemas(
            models::Order,
            models::OrderStatus,
            models::Upload,
            models::UploadStatus,
            models::TokenPurchase,
            models::PurchaseStatus,
            handlers::orders::CreateOrderRequest,
            handlers::orders::OrderListResponse,
            handlers::checkout::OrderRef,
            handlers::tokens::PurchaseTokensRequest,
            handlers::tokens::BalanceResponse,
            handlers::payments::PaymentStatusResponse,
            handlers::webhook::WebhookAck,
            handlers::process::ProcessOrderResponse,
            handlers::health::HealthCheckResponse,
            services::CheckoutResponse,
            services::CheckoutMode,
            services::PurchaseStarted,
            services::UploadResponse,
            error::ErrorResponse,
        )
    ),
    tags(
        (name = "uploads", description = "Media submission, paid per upload in tokens"),
        (name = "orders", description = "Verification orders and detection results"),
        (name = "payments", description = "Checkout, payment verification and provider webhooks"),
        (name = "tokens", description = "Token balance and top-ups"),
        (name = "health", description = "Service health")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_every_route() {
        let doc = get_openapi_spec();
        for path in [
            "/health",
            "/api/uploads",
            "/api/orders",
            "/api/create-paystack",
            "/api/purchase-tokens",
            "/api/payments/status/{reference}",
            "/api/webhook/paystack",
            "/api/process-order",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
