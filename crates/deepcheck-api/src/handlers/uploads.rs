use crate::auth::CurrentUser;
use crate::error::{ErrorResponse, HttpAppError};
use crate::services::{submit_upload, UploadResponse};
use crate::state::AppState;
use crate::utils::upload::extract_multipart_file;
use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

#[utoipa::path(
    post,
    path = "/api/uploads",
    tag = "uploads",
    request_body(content = String, description = "Multipart form with a single `file` field", content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Upload stored and charged", body = UploadResponse),
        (status = 400, description = "Missing file, unsupported type or file too large", body = ErrorResponse),
        (status = 401, description = "Missing or invalid bearer token", body = ErrorResponse),
        (status = 402, description = "Not enough tokens; context carries currentTokens and requiredTokens", body = ErrorResponse)
    )
)]
#[tracing::instrument(skip(state, user, multipart), fields(user_id = %user.0.id))]
pub async fn upload_media(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    multipart: Multipart,
) -> Result<impl IntoResponse, HttpAppError> {
    let file = extract_multipart_file(multipart).await?;
    let response = submit_upload(&state, &user.0, file).await?;
    Ok((StatusCode::CREATED, Json(response)))
}
