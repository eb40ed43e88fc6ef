//! Route configuration and setup.

use crate::api_doc::get_openapi_spec;
use crate::auth::middleware::auth_middleware;
use crate::constants::{API_PREFIX, MULTIPART_OVERHEAD_BYTES, OPENAPI_PATH};
use crate::handlers::{checkout, health, orders, payments, process, tokens, uploads, webhook};
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method},
    routing::{get, post},
    Json, Router,
};
use deepcheck_core::Config;
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

const DEFAULT_HTTP_CONCURRENCY_LIMIT: usize = 10_000;

/// Builds the full router: every API route at the root and again under `/api`.
pub fn setup_routes(state: Arc<AppState>) -> Router<()> {
    let cors = setup_cors(&state.config);

    let http_concurrency_limit = std::env::var("HTTP_CONCURRENCY_LIMIT")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .unwrap_or(DEFAULT_HTTP_CONCURRENCY_LIMIT)
        .max(1);
    tracing::info!(http_concurrency_limit, "HTTP concurrency limit layer enabled");

    let api = api_routes(&state);

    Router::new()
        .route(OPENAPI_PATH, get(|| async { Json(get_openapi_spec()) }))
        .merge(api.clone())
        .nest(API_PREFIX, api)
        .layer(ConcurrencyLimitLayer::new(http_concurrency_limit))
        .layer(RequestBodyLimitLayer::new(
            state.max_upload_bytes() + MULTIPART_OVERHEAD_BYTES,
        ))
        .layer(DefaultBodyLimit::disable())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn api_routes(state: &Arc<AppState>) -> Router<Arc<AppState>> {
    public_routes().merge(user_routes().layer(axum::middleware::from_fn_with_state(
        state.verifier.clone(),
        auth_middleware,
    )))
}

/// Routes that never look at the caller's identity.
fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/webhook/paystack", post(webhook::paystack_webhook))
        .route("/payments/status/{reference}", get(payments::payment_status))
}

/// Routes behind the auth middleware. Anonymous callers pass through; handlers decide
/// whether they need a user.
fn user_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/uploads", post(uploads::upload_media))
        .route("/orders", post(orders::create_order).get(orders::get_orders))
        .route("/create-paystack", post(checkout::create_checkout))
        .route(
            "/purchase-tokens",
            post(tokens::purchase_tokens).get(tokens::get_balance),
        )
        .route("/process-order", post(process::process_order))
}

fn setup_cors(config: &Config) -> CorsLayer {
    let methods = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];
    if config.cors_origins().iter().any(|o| o == "*") {
        tracing::warn!("CORS configured to allow all origins - not recommended for production");
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(methods)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = config
            .cors_origins()
            .iter()
            .filter_map(|o| match o.parse() {
                Ok(origin) => Some(origin),
                Err(_) => {
                    tracing::warn!(origin = %o, "Ignoring invalid CORS origin");
                    None
                }
            })
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(Any)
    }
}
