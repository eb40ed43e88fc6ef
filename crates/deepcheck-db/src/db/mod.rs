//! Postgres repositories
//!
//! One repository per entity, each owning a clone of the pool. Composite fields are stored as
//! `JSONB` and decoded on read; a row that fails to decode is reported as an integrity error.

mod job;
mod order;
mod purchase;
mod upload;
mod user;

pub use job::{DetectionJobRepository, DETECTION_JOB_CHANNEL};
pub use order::OrderRepository;
pub use purchase::PurchaseRepository;
pub use upload::UploadRepository;
pub use user::UserRepository;
