use chrono::Utc;
use deepcheck_core::models::{DetectionResult, DetectionStatus, ModelScore};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{DetectionError, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct RawModelScore {
    pub name: String,
    pub score: f64,
}

/// Detector reply, tagged on `status`. Unknown fields are ignored.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DetectorResponse {
    Success {
        #[serde(rename = "requestId", alias = "request_id")]
        request_id: String,
        score: f64,
        #[serde(default)]
        models: Vec<RawModelScore>,
    },
    Failure {
        #[serde(default)]
        error: Option<String>,
    },
}

fn check_score(label: &str, score: f64) -> Result<()> {
    if score.is_finite() && (0.0..=1.0).contains(&score) {
        Ok(())
    } else {
        Err(DetectionError::InvalidResponse(format!(
            "{} score {} is outside [0, 1]",
            label, score
        )))
    }
}

impl DetectorResponse {
    pub fn parse(body: &str) -> Result<Self> {
        serde_json::from_str(body).map_err(|e| DetectionError::InvalidResponse(e.to_string()))
    }

    /// Validates the reply and converts it into the stored result for `upload_id`.
    pub fn into_result(self, upload_id: Uuid) -> Result<DetectionResult> {
        match self {
            DetectorResponse::Failure { error } => Err(DetectionError::Failure(
                error.unwrap_or_else(|| "no error message".to_string()),
            )),
            DetectorResponse::Success {
                request_id,
                score,
                models,
            } => {
                if request_id.trim().is_empty() {
                    return Err(DetectionError::InvalidResponse(
                        "empty requestId".to_string(),
                    ));
                }
                check_score("overall", score)?;
                for model in &models {
                    check_score(&model.name, model.score)?;
                }

                Ok(DetectionResult {
                    request_id,
                    status: DetectionStatus::Completed,
                    score,
                    models: models
                        .into_iter()
                        .map(|m| ModelScore {
                            name: m.name,
                            score: m.score,
                        })
                        .collect(),
                    fallback: false,
                    fallback_reason: None,
                    processed_upload_id: upload_id,
                    detected_at: Utc::now(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_with_extra_fields() {
        let body = r#"{
            "status": "success",
            "requestId": "req_1",
            "score": 0.91,
            "models": [{"name": "genai", "score": 0.91, "version": "3"}],
            "mediaType": "image"
        }"#;
        let upload_id = Uuid::new_v4();
        let result = DetectorResponse::parse(body)
            .unwrap()
            .into_result(upload_id)
            .unwrap();

        assert_eq!(result.request_id, "req_1");
        assert_eq!(result.status, DetectionStatus::Completed);
        assert!(!result.fallback);
        assert_eq!(result.models.len(), 1);
        assert_eq!(result.processed_upload_id, upload_id);
    }

    #[test]
    fn test_failure_reply() {
        let body = r#"{"status": "failure", "error": "unsupported media"}"#;
        let err = DetectorResponse::parse(body)
            .unwrap()
            .into_result(Uuid::new_v4())
            .unwrap_err();
        assert!(matches!(err, DetectionError::Failure(ref m) if m == "unsupported media"));
    }

    #[test]
    fn test_out_of_range_scores_rejected() {
        for body in [
            r#"{"status":"success","requestId":"r","score":1.5}"#,
            r#"{"status":"success","requestId":"r","score":-0.1}"#,
            r#"{"status":"success","requestId":"r","score":0.2,"models":[{"name":"m","score":7}]}"#,
        ] {
            let err = DetectorResponse::parse(body)
                .unwrap()
                .into_result(Uuid::new_v4())
                .unwrap_err();
            assert!(matches!(err, DetectionError::InvalidResponse(_)));
        }
    }

    #[test]
    fn test_structurally_invalid_rejected() {
        for body in [
            r#"{"status":"success","score":0.2}"#,
            r#"{"status":"queued"}"#,
            r#"{"score":0.2}"#,
            "[]",
        ] {
            assert!(DetectorResponse::parse(body).is_err(), "{body}");
        }
    }
}
