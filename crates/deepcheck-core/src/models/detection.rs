use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    Completed,
    /// The detector was unreachable or answered with an error; the score is synthetic.
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ModelScore {
    pub name: String,
    pub score: f64,
}

/// Normalized detector output persisted on the order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    pub request_id: String,
    pub status: DetectionStatus,
    /// Probability in `[0, 1]` that the media is synthetic.
    pub score: f64,
    pub models: Vec<ModelScore>,
    pub fallback: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub processed_upload_id: Uuid,
    pub detected_at: DateTime<Utc>,
}

impl DetectionResult {
    pub const FALLBACK_SCORE: f64 = 0.5;

    pub fn fallback(upload_id: Uuid, reason: impl Into<String>) -> Self {
        Self {
            request_id: format!("fallback-{}", Uuid::new_v4().simple()),
            status: DetectionStatus::Fallback,
            score: Self::FALLBACK_SCORE,
            models: Vec::new(),
            fallback: true,
            fallback_reason: Some(reason.into()),
            processed_upload_id: upload_id,
            detected_at: Utc::now(),
        }
    }
}
