//! Upload validation: MIME allow-list and per-kind size limits.

use crate::constants::{IMAGE_CONTENT_TYPES, VIDEO_CONTENT_TYPES};
use crate::error::AppError;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("File too large: {size} bytes (max: {max} bytes)")]
    FileTooLarge { size: usize, max: usize },

    #[error("Invalid content type: {content_type} (allowed: {allowed:?})")]
    InvalidContentType {
        content_type: String,
        allowed: Vec<String>,
    },

    #[error("Empty file")]
    EmptyFile,
}

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::InvalidRequest(err.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// Strip parameters (e.g. `; charset=binary`) and lowercase a MIME type.
pub fn normalize_mime_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase()
}

#[derive(Debug, Clone, Copy)]
pub struct UploadLimits {
    pub max_image_size_bytes: usize,
    pub max_video_size_bytes: usize,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_image_size_bytes: 10 * 1024 * 1024,
            max_video_size_bytes: 50 * 1024 * 1024,
        }
    }
}

impl UploadLimits {
    pub fn media_kind(content_type: &str) -> Option<MediaKind> {
        let normalized = normalize_mime_type(content_type);
        if IMAGE_CONTENT_TYPES.contains(&normalized.as_str()) {
            Some(MediaKind::Image)
        } else if VIDEO_CONTENT_TYPES.contains(&normalized.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    /// Checks the content type against the allow-list, then the size against the limit for
    /// that kind of media.
    pub fn validate(&self, content_type: &str, size: usize) -> Result<MediaKind, ValidationError> {
        let kind =
            Self::media_kind(content_type).ok_or_else(|| ValidationError::InvalidContentType {
                content_type: content_type.to_string(),
                allowed: IMAGE_CONTENT_TYPES
                    .iter()
                    .chain(VIDEO_CONTENT_TYPES)
                    .map(|s| s.to_string())
                    .collect(),
            })?;

        if size == 0 {
            return Err(ValidationError::EmptyFile);
        }

        let max = match kind {
            MediaKind::Image => self.max_image_size_bytes,
            MediaKind::Video => self.max_video_size_bytes,
        };
        if size > max {
            return Err(ValidationError::FileTooLarge { size, max });
        }

        Ok(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MB: usize = 1024 * 1024;

    #[test]
    fn test_image_limit() {
        let limits = UploadLimits::default();
        assert_eq!(limits.validate("image/png", 10 * MB), Ok(MediaKind::Image));
        assert!(matches!(
            limits.validate("image/png", 10 * MB + 1),
            Err(ValidationError::FileTooLarge { .. })
        ));
    }

    #[test]
    fn test_video_limit_is_larger() {
        let limits = UploadLimits::default();
        assert_eq!(limits.validate("video/mp4", 40 * MB), Ok(MediaKind::Video));
        assert!(limits.validate("video/mp4", 51 * MB).is_err());
    }

    #[test]
    fn test_mime_parameters_are_ignored() {
        let limits = UploadLimits::default();
        assert_eq!(
            limits.validate("IMAGE/JPEG; charset=binary", 1024),
            Ok(MediaKind::Image)
        );
    }

    #[test]
    fn test_rejects_unlisted_types_and_empty_files() {
        let limits = UploadLimits::default();
        assert!(matches!(
            limits.validate("application/pdf", 1024),
            Err(ValidationError::InvalidContentType { .. })
        ));
        assert!(matches!(
            limits.validate("image/svg+xml", 1024),
            Err(ValidationError::InvalidContentType { .. })
        ));
        assert_eq!(limits.validate("image/png", 0), Err(ValidationError::EmptyFile));
    }
}
