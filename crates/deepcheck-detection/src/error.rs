use thiserror::Error;

pub type Result<T> = std::result::Result<T, DetectionError>;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("Detector not configured: {0}")]
    Config(String),

    #[error("Detector request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Detector returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("Invalid detector response: {0}")]
    InvalidResponse(String),

    /// The detector answered but reported that it could not score the media.
    #[error("Detector reported failure: {0}")]
    Failure(String),
}

impl DetectionError {
    /// Stable code stored as the fallback reason. Provider messages stay in the logs.
    pub fn reason_code(&self) -> &'static str {
        match self {
            DetectionError::Config(_) => "detector_not_configured",
            DetectionError::Http(e) if e.is_timeout() => "detector_timeout",
            DetectionError::Http(_) => "detector_unreachable",
            DetectionError::Api { .. } => "detector_error",
            DetectionError::InvalidResponse(_) => "detector_invalid_response",
            DetectionError::Failure(_) => "detector_declined",
        }
    }
}
