pub mod checkout;
pub mod health;
pub mod orders;
pub mod payments;
pub mod process;
pub mod tokens;
pub mod uploads;
pub mod webhook;
