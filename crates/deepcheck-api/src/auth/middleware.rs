use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::{IntoResponse, Response},
};
use deepcheck_core::AppError;
use std::sync::Arc;

use crate::auth::TokenVerifier;
use crate::error::HttpAppError;

/// Verifies the bearer token when one is sent and stores the [`Principal`] in request
/// extensions. Requests without an `Authorization` header pass through as anonymous; a header
/// that fails verification is rejected with 401.
///
/// [`Principal`]: crate::auth::Principal
pub async fn auth_middleware(
    State(verifier): State<Arc<TokenVerifier>>,
    mut request: Request,
    next: Next,
) -> Response {
    let header = request
        .headers()
        .get(AUTHORIZATION)
        .map(|h| h.to_str().map(str::to_owned));

    let token = match header {
        None => return next.run(request).await,
        Some(Err(_)) => {
            return unauthorized("Authorization header is not valid UTF-8");
        }
        Some(Ok(value)) => match value.strip_prefix("Bearer ") {
            Some(token) if !token.trim().is_empty() => token.trim().to_string(),
            _ => return unauthorized("Authorization header must use the Bearer scheme"),
        },
    };

    match verifier.verify(&token).await {
        Ok(principal) => {
            tracing::debug!(subject = %principal.subject, "Bearer token verified");
            request.extensions_mut().insert(principal);
            next.run(request).await
        }
        Err(e) => HttpAppError(e).into_response(),
    }
}

fn unauthorized(message: &str) -> Response {
    HttpAppError(AppError::Unauthorized(message.to_string())).into_response()
}
