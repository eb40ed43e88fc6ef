//! Deepcheck Ledger Store
//!
//! Durable persistence for uploads, orders, users, token purchases and detection jobs.
//! Every entity is reached through a store trait so the Postgres repositories and the
//! in-memory ledger are interchangeable.

pub mod db;
pub mod error;
pub mod memory;
pub mod traits;

pub use db::{
    DetectionJobRepository, OrderRepository, PurchaseRepository, UploadRepository,
    UserRepository, DETECTION_JOB_CHANNEL,
};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryLedger;
pub use traits::{JobStore, Ledger, OrderStore, PurchaseStore, UploadStore, UserStore};
