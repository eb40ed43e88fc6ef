//! Order pricing.

use crate::constants::PRICE_PER_UNIT_CENTS;

/// Price in minor units for an order referencing `upload_count` uploads.
///
/// Always charges at least one unit, so an empty count still prices as a single verification.
pub fn price(upload_count: usize) -> i64 {
    let units = i64::try_from(upload_count.max(1)).unwrap_or(i64::MAX / PRICE_PER_UNIT_CENTS);
    units.saturating_mul(PRICE_PER_UNIT_CENTS)
}
