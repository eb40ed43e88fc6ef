//! Application-wide constants.

/// Price of one verification in minor currency units.
pub const PRICE_PER_UNIT_CENTS: i64 = 100;

/// Exchange rate between tokens and minor currency units. One token buys one verification.
pub const CENTS_PER_TOKEN: i64 = PRICE_PER_UNIT_CENTS;

/// Tokens consumed by a single upload.
pub const UPLOAD_TOKEN_COST: i64 = 1;

/// Balance demo accounts are granted and topped back up to.
pub const DEFAULT_DEMO_TOKEN_FLOOR: i64 = 300;

pub const MIN_TOKEN_PURCHASE: i64 = 1;
pub const MAX_TOKEN_PURCHASE: i64 = 10_000;

pub const DEFAULT_CURRENCY: &str = "NGN";

pub const DEFAULT_ORDER_LIST_LIMIT: i64 = 20;
pub const MAX_ORDER_LIST_LIMIT: i64 = 100;

/// Client polling hints returned by the payment status endpoint.
pub const PAYMENT_POLL_INTERVAL_MS: u64 = 3_000;
pub const PAYMENT_POLL_MAX_ATTEMPTS: u32 = 20;

/// Reference prefixes for transactions this service generates.
pub const ORDER_REFERENCE_PREFIX: &str = "ord_";
pub const TOKEN_PURCHASE_REFERENCE_PREFIX: &str = "tkp_";
pub const DEMO_REFERENCE_PREFIX: &str = "demo_";
pub const TOKEN_RAIL_REFERENCE_PREFIX: &str = "tok_";

pub const IMAGE_CONTENT_TYPES: &[&str] = &["image/jpeg", "image/png", "image/webp", "image/gif"];
pub const VIDEO_CONTENT_TYPES: &[&str] = &["video/mp4", "video/quicktime", "video/webm"];
