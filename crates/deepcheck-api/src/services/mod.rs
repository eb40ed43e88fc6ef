pub mod checkout;
pub mod cleanup;
pub mod detection;
pub mod orders;
pub mod payments;
pub mod tokens;
pub mod uploads;

pub use checkout::{checkout, CheckoutMode, CheckoutResponse};
pub use cleanup::UploadSweeper;
pub use orders::{CreateOrder, OrderService};
pub use payments::{reconcile, start_token_purchase, PurchaseStarted, Reconciliation};
pub use tokens::TokenAccounts;
pub use uploads::{submit_upload, SubmittedFile, UploadResponse};
