//! Deepcheck Payments
//!
//! Paystack-compatible gateway adapter: transaction initialization, reference verification,
//! webhook signature checks and webhook payload classification.

pub mod client;
pub mod error;
pub mod types;
pub mod webhook;

pub use client::{PaymentGateway, PaystackClient, DEFAULT_PAYSTACK_BASE_URL};
pub use error::{PaymentError, PaymentResult};
pub use types::{
    ChargeStatus, InitializeTransaction, InitializedTransaction, PaymentPurpose,
    VerifiedTransaction,
};
pub use webhook::{
    parse_webhook, sign_payload, verify_webhook_signature, ChargeData, PaystackEvent,
    SIGNATURE_HEADER, SIGNATURE_HEADER_ALIAS,
};
