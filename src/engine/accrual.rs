//! Market accrual (14.2).

use super::results::{AccrualResult, EngineError};
use crate::market::{MarketState, OpenInterest};
use crate::types::Timestamp;
use crate::{borrowing, funding};

/// Brings funding and borrowing up to `now`. the new velocity and borrowing
/// rates are priced from `open_interest`, which for a trade is the book as it
/// will look once the trade lands.
pub(super) fn accrue(
    market: &mut MarketState,
    open_interest: &OpenInterest,
    now: Timestamp,
) -> Result<AccrualResult, EngineError> {
    let funding_before = (market.funding.funding_rate, market.funding.funding_rate_velocity);
    let borrowing_before = (market.borrowing.long_borrowing_rate, market.borrowing.short_borrowing_rate);

    let funding = funding::update_state(
        &market.config,
        &mut market.funding,
        open_interest.skew(),
        now,
    )?;
    let borrowing = borrowing::update_state(
        &market.config,
        &mut market.borrowing,
        open_interest,
        now,
    )?;
    let funding_changed = !funding.long_fee_delta.is_zero()
        || !funding.short_fee_delta.is_zero()
        || funding_before != (funding.new_rate, funding.new_velocity);
    let borrowing_changed = !borrowing.long_fee_delta.is_zero()
        || !borrowing.short_fee_delta.is_zero()
        || borrowing_before != (borrowing.long_rate, borrowing.short_rate);

    Ok(AccrualResult {
        funding,
        borrowing,
        funding_changed,
        borrowing_changed,
    })
}
