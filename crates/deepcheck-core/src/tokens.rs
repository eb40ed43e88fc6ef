//! Token policy: exchange rate and demo-account rules.
//!
//! Balance mutations live with the ledger; this module only holds the pure parts so that
//! every caller prices tokens the same way.

use crate::constants::{CENTS_PER_TOKEN, DEFAULT_DEMO_TOKEN_FLOOR};

/// Minor currency units charged for `tokens` tokens.
pub fn cents_for_tokens(tokens: i64) -> i64 {
    tokens.saturating_mul(CENTS_PER_TOKEN)
}

/// Whole tokens purchasable with `cents`. Remainders are dropped.
pub fn tokens_for_cents(cents: i64) -> i64 {
    cents / CENTS_PER_TOKEN
}

/// Allow-list of demo identities and the balance floor they are kept at.
#[derive(Debug, Clone)]
pub struct DemoPolicy {
    emails: Vec<String>,
    floor: i64,
}

impl DemoPolicy {
    pub fn new<I, S>(emails: I, floor: i64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            emails: emails
                .into_iter()
                .map(|e| e.as_ref().trim().to_lowercase())
                .filter(|e| !e.is_empty())
                .collect(),
            floor: floor.max(0),
        }
    }

    pub fn is_demo_account(&self, email: &str) -> bool {
        let email = email.trim().to_lowercase();
        self.emails.iter().any(|e| *e == email)
    }

    pub fn floor(&self) -> i64 {
        self.floor
    }

    /// Balance granted the first time an email is seen.
    pub fn initial_balance(&self, email: &str) -> i64 {
        if self.is_demo_account(email) {
            self.floor
        } else {
            0
        }
    }
}

impl Default for DemoPolicy {
    fn default() -> Self {
        Self::new(Vec::<String>::new(), DEFAULT_DEMO_TOKEN_FLOOR)
    }
}
