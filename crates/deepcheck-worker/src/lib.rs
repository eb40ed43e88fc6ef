//! Deepcheck Worker
//!
//! Runs detection jobs recorded by the paid transition. The API owns the handler logic and
//! exposes it through [`JobHandlerContext`].

pub mod context;
pub mod queue;

pub use context::JobHandlerContext;
pub use queue::{
    compute_retry_backoff_seconds, DetectionQueue, DetectionQueueConfig, DetectionWorker,
    MAX_RETRY_BACKOFF_SECS,
};
