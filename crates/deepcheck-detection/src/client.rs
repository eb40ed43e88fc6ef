use async_trait::async_trait;
use deepcheck_core::models::DetectionResult;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::time::Duration;
use uuid::Uuid;

use crate::error::{DetectionError, Result};
use crate::response::DetectorResponse;

/// Media bytes sent for scoring.
#[derive(Clone)]
pub struct MediaPayload {
    pub upload_id: Uuid,
    pub filename: String,
    pub mime: String,
    pub data: Vec<u8>,
}

impl Debug for MediaPayload {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("MediaPayload")
            .field("upload_id", &self.upload_id)
            .field("filename", &self.filename)
            .field("mime", &self.mime)
            .field("size", &self.data.len())
            .finish()
    }
}

#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, media: &MediaPayload) -> Result<DetectionResult>;
}

/// Runs the detector and replaces any failure with a fallback result.
pub async fn detect_or_fallback(detector: &dyn Detector, media: &MediaPayload) -> DetectionResult {
    match detector.detect(media).await {
        Ok(result) => result,
        Err(e) => {
            let reason = e.reason_code();
            tracing::warn!(
                error = %e,
                reason,
                upload_id = %media.upload_id,
                "Detection failed, storing fallback result"
            );
            DetectionResult::fallback(media.upload_id, reason)
        }
    }
}

pub struct HttpDetector {
    http_client: Client,
    api_url: Option<String>,
    api_key: Option<String>,
}

impl Debug for HttpDetector {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("HttpDetector")
            .field("api_url", &self.api_url)
            .finish()
    }
}

impl HttpDetector {
    pub fn new(api_url: Option<String>, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let http_client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            api_url: api_url.filter(|url| !url.trim().is_empty()),
            api_key: api_key.filter(|key| !key.trim().is_empty()),
        })
    }
}

#[async_trait]
impl Detector for HttpDetector {
    #[tracing::instrument(skip(self, media), fields(upload_id = %media.upload_id, size = media.data.len()))]
    async fn detect(&self, media: &MediaPayload) -> Result<DetectionResult> {
        let url = self
            .api_url
            .as_deref()
            .ok_or_else(|| DetectionError::Config("DETECTION_API_URL is not set".to_string()))?;

        let part = Part::bytes(media.data.clone())
            .file_name(media.filename.clone())
            .mime_str(&media.mime)?;
        let form = Form::new()
            .text("uploadId", media.upload_id.to_string())
            .part("file", part);

        let mut request = self.http_client.post(url).multipart(form);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(DetectionError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let result = DetectorResponse::parse(&body)?.into_result(media.upload_id)?;
        tracing::info!(
            request_id = %result.request_id,
            score = result.score,
            "Detection completed"
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepcheck_core::models::DetectionStatus;
    use mockito::Matcher;

    fn media() -> MediaPayload {
        MediaPayload {
            upload_id: Uuid::new_v4(),
            filename: "face.png".to_string(),
            mime: "image/png".to_string(),
            data: vec![0x89, b'P', b'N', b'G'],
        }
    }

    fn detector(url: Option<String>) -> HttpDetector {
        HttpDetector::new(url, Some("det_key".to_string()), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_detect_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/detect")
            .match_header("authorization", "Bearer det_key")
            .match_header(
                "content-type",
                Matcher::Regex("^multipart/form-data".to_string()),
            )
            .with_status(200)
            .with_body(r#"{"status":"success","requestId":"req_9","score":0.12,"models":[]}"#)
            .create_async()
            .await;

        let media = media();
        let result = detector(Some(format!("{}/detect", server.url())))
            .detect(&media)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(result.request_id, "req_9");
        assert_eq!(result.processed_upload_id, media.upload_id);
    }

    #[tokio::test]
    async fn test_server_error_falls_back() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/detect")
            .with_status(503)
            .with_body("overloaded")
            .create_async()
            .await;

        let media = media();
        let detector = detector(Some(format!("{}/detect", server.url())));
        assert!(matches!(
            detector.detect(&media).await,
            Err(DetectionError::Api { status: 503, .. })
        ));

        let result = detect_or_fallback(&detector, &media).await;
        assert!(result.fallback);
        assert_eq!(result.status, DetectionStatus::Fallback);
        assert_eq!(result.score, DetectionResult::FALLBACK_SCORE);
        assert_eq!(result.fallback_reason.as_deref(), Some("detector_error"));
    }

    #[tokio::test]
    async fn test_failure_status_falls_back() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/detect")
            .with_status(200)
            .with_body(r#"{"status":"failure","error":"face not found"}"#)
            .create_async()
            .await;

        let detector = detector(Some(format!("{}/detect", server.url())));
        let result = detect_or_fallback(&detector, &media()).await;
        assert!(result.fallback);
        assert_eq!(result.fallback_reason.as_deref(), Some("detector_declined"));
    }

    #[tokio::test]
    async fn test_unconfigured_detector_falls_back() {
        let detector = detector(None);
        let err = detector.detect(&media()).await.unwrap_err();
        assert!(matches!(err, DetectionError::Config(_)));

        let result = detect_or_fallback(&detector, &media()).await;
        assert!(result.fallback);
        assert_eq!(result.fallback_reason.as_deref(), Some("detector_not_configured"));
    }

    #[tokio::test]
    async fn test_fallback_reason_hides_provider_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/detect")
            .with_status(500)
            .with_body("upstream db at 10.0.3.7 refused connection")
            .create_async()
            .await;

        let detector = detector(Some(format!("{}/detect", server.url())));
        let result = detect_or_fallback(&detector, &media()).await;
        let reason = result.fallback_reason.unwrap();
        assert_eq!(reason, "detector_error");
        assert!(!reason.contains("10.0.3.7"));
    }
}
