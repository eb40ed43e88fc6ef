//! Multipart helpers for the upload endpoint.

use axum::extract::Multipart;
use deepcheck_core::AppError;

use crate::services::SubmittedFile;

/// Reads the single field named `file` from the form. A second `file` field is rejected.
pub async fn extract_multipart_file(mut multipart: Multipart) -> Result<SubmittedFile, AppError> {
    let mut file: Option<SubmittedFile> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::InvalidRequest(format!("Failed to read multipart: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        if file.is_some() {
            return Err(AppError::InvalidRequest(
                "Multiple file fields are not allowed; send exactly one field named 'file'"
                    .to_string(),
            ));
        }

        let filename = sanitize_filename(field.file_name().unwrap_or("upload"));
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::InvalidRequest(format!("Failed to read file data: {}", e)))?;

        file = Some(SubmittedFile {
            data: data.to_vec(),
            filename,
            content_type,
        });
    }

    file.ok_or_else(|| AppError::InvalidRequest("No file provided".to_string()))
}

/// Keeps the last path segment and drops control characters.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base.chars().filter(|c| !c.is_control()).collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned == "." || cleaned == ".." {
        "upload".to_string()
    } else {
        cleaned.chars().take(255).collect()
    }
}
