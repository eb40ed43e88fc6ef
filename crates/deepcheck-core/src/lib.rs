//! Deepcheck Core Library
//!
//! Domain models, error types, configuration, pricing and token policy shared by
//! every deepcheck component.

pub mod config;
pub mod constants;
pub mod error;
pub mod job_error;
pub mod models;
pub mod pricing;
pub mod tokens;
pub mod validation;

// Re-export commonly used types
pub use config::{BaseConfig, Config, ServiceConfig};
pub use error::{AppError, ErrorMetadata, LogLevel};
pub use job_error::{JobError, JobResultExt};
pub use pricing::price;
pub use tokens::{cents_for_tokens, tokens_for_cents, DemoPolicy};
