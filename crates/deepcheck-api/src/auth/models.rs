use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use deepcheck_core::models::User;
use deepcheck_core::AppError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::HttpAppError;
use crate::state::AppState;

/// Claims read from provider-issued tokens. Other claims are ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
}

/// Verified caller identity, stored in request extensions by the auth middleware.
#[derive(Debug, Clone)]
pub struct Principal {
    pub subject: String,
    /// Lowercased.
    pub email: String,
}

/// Authenticated caller resolved to a ledger user. Rejects anonymous requests with 401.
///
/// Resolving applies the demo top-up, so demo balances are back at their floor before any
/// handler reads them.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = HttpAppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let principal = parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;
        let user = state.tokens.get_or_create_user(&principal.email).await?;
        Ok(CurrentUser(user))
    }
}

/// Like [`CurrentUser`], but anonymous requests resolve to `None`.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl MaybeUser {
    pub fn id(&self) -> Option<uuid::Uuid> {
        self.0.as_ref().map(|u| u.id)
    }
}

impl FromRequestParts<Arc<AppState>> for MaybeUser {
    type Rejection = HttpAppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        match parts.extensions.get::<Principal>().cloned() {
            Some(principal) => {
                let user = state.tokens.get_or_create_user(&principal.email).await?;
                Ok(MaybeUser(Some(user)))
            }
            None => Ok(MaybeUser(None)),
        }
    }
}
