//! Deepcheck Detection
//!
//! Client for the external deepfake detector. A failed call never surfaces as an error to the
//! order flow: [`detect_or_fallback`] downgrades it to a clearly-marked fallback result.

pub mod client;
pub mod error;
pub mod response;

pub use client::{detect_or_fallback, Detector, HttpDetector, MediaPayload};
pub use error::{DetectionError, Result};
pub use response::DetectorResponse;
