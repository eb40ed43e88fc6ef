//! Media submission. Non-demo callers pay one token per upload at submission time.

use deepcheck_core::constants::UPLOAD_TOKEN_COST;
use deepcheck_core::models::{NewUpload, Upload, UploadFunding, User};
use deepcheck_core::AppError;
use serde::Serialize;
use utoipa::ToSchema;

use crate::state::AppState;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub upload: Upload,
    /// Balance after the upload was charged.
    pub remaining_tokens: i64,
}

pub struct SubmittedFile {
    pub data: Vec<u8>,
    pub filename: String,
    pub content_type: String,
}

/// Validates, stores and charges for one file.
///
/// Validation runs before anything is written. If the charge fails the stored upload is
/// deleted again and the error (402 when the balance is short) is returned.
#[tracing::instrument(skip(state, owner, file), fields(user_id = %owner.id, filename = %file.filename))]
pub async fn submit_upload(
    state: &AppState,
    owner: &User,
    file: SubmittedFile,
) -> Result<UploadResponse, AppError> {
    let mime = deepcheck_core::validation::normalize_mime_type(&file.content_type);
    let kind = state.upload_limits.validate(&mime, file.data.len())?;

    let demo = state.tokens.is_demo_account(&owner.email);
    let funding = if demo {
        UploadFunding::Demo { user_id: owner.id }
    } else {
        UploadFunding::Tokens { user_id: owner.id }
    };

    let upload = state
        .ledger
        .uploads
        .create_upload(NewUpload {
            filename: file.filename,
            size: file.data.len() as i64,
            mime,
            metadata: funding.to_metadata(),
        })
        .await?;

    if let Err(e) = state.ledger.uploads.set_upload_data(upload.id, file.data).await {
        discard(state, &upload).await;
        return Err(e.into());
    }

    let remaining_tokens = if demo {
        owner.tokens
    } else {
        match state.tokens.deduct(owner.id, UPLOAD_TOKEN_COST).await {
            Ok(remaining) => remaining,
            Err(e) => {
                discard(state, &upload).await;
                return Err(e);
            }
        }
    };

    tracing::info!(
        upload_id = %upload.id,
        kind = ?kind,
        size = upload.size,
        remaining_tokens,
        "Upload stored"
    );
    Ok(UploadResponse {
        upload,
        remaining_tokens,
    })
}

async fn discard(state: &AppState, upload: &Upload) {
    if let Err(e) = state.ledger.uploads.delete_upload(upload.id).await {
        tracing::warn!(error = %e, upload_id = %upload.id, "Failed to remove unpaid upload");
    }
}
