//! In-process stand-ins for the payment gateway and the detector.

use async_trait::async_trait;
use chrono::Utc;
use deepcheck_core::models::{DetectionResult, DetectionStatus, ModelScore};
use deepcheck_detection::{DetectionError, Detector, MediaPayload};
use deepcheck_payments::{
    ChargeStatus, InitializeTransaction, InitializedTransaction, PaymentError, PaymentGateway,
    PaymentPurpose, PaymentResult, VerifiedTransaction,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Records initialized transactions and answers verification from whatever the test settled.
#[derive(Default)]
pub struct FakeGateway {
    initialized: Mutex<Vec<InitializeTransaction>>,
    settled: Mutex<HashMap<String, (ChargeStatus, &'static str)>>,
}

impl FakeGateway {
    pub fn initialized(&self) -> Vec<InitializeTransaction> {
        self.initialized.lock().unwrap().clone()
    }

    pub fn initialized_count(&self) -> usize {
        self.initialized.lock().unwrap().len()
    }

    /// Makes `verify_reference(reference)` report `provider_status`.
    pub fn settle(&self, reference: &str, provider_status: &'static str) {
        self.settled.lock().unwrap().insert(
            reference.to_string(),
            (ChargeStatus::from_provider(provider_status), provider_status),
        );
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn initialize_transaction(
        &self,
        request: InitializeTransaction,
    ) -> PaymentResult<InitializedTransaction> {
        let reference = request.reference.clone();
        self.initialized.lock().unwrap().push(request);
        Ok(InitializedTransaction {
            authorization_url: format!("https://checkout.paystack.test/{}", reference),
            access_code: Some(format!("ac_{}", reference)),
            reference,
        })
    }

    async fn verify_reference(&self, reference: &str) -> PaymentResult<VerifiedTransaction> {
        let initialized = self
            .initialized
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.reference == reference)
            .cloned()
            .ok_or_else(|| PaymentError::Api {
                status: 404,
                message: "Transaction reference not found".to_string(),
            })?;
        let (status, provider_status) = self
            .settled
            .lock()
            .unwrap()
            .get(reference)
            .copied()
            .unwrap_or((ChargeStatus::Pending, "ongoing"));

        Ok(VerifiedTransaction {
            reference: reference.to_string(),
            status,
            provider_status: provider_status.to_string(),
            amount_cents: Some(initialized.amount_cents),
            purpose: PaymentPurpose::from_metadata(&initialized.metadata),
            raw: initialized.metadata,
        })
    }
}

/// Scores every upload 0.92, or fails every call when built with [`FakeDetector::failing`].
#[derive(Default)]
pub struct FakeDetector {
    calls: AtomicUsize,
    fail: bool,
}

impl FakeDetector {
    pub fn failing() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail: true,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Detector for FakeDetector {
    async fn detect(&self, media: &MediaPayload) -> deepcheck_detection::Result<DetectionResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(DetectionError::Api {
                status: 503,
                message: "detector unavailable".to_string(),
            });
        }
        Ok(DetectionResult {
            request_id: format!("req-{}", media.upload_id.simple()),
            status: DetectionStatus::Completed,
            score: 0.92,
            models: vec![ModelScore {
                name: "face-swap".to_string(),
                score: 0.92,
            }],
            fallback: false,
            fallback_reason: None,
            processed_upload_id: media.upload_id,
            detected_at: Utc::now(),
        })
    }
}
