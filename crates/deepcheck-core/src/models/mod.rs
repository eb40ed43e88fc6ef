//! Data models for the application

mod detection;
mod job;
mod order;
mod purchase;
mod upload;
mod user;

pub use detection::*;
pub use job::*;
pub use order::*;
pub use purchase::*;
pub use upload::*;
pub use user::*;
