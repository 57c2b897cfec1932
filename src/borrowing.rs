// 6.0: borrowing fees. each side pays for the pool liquidity it reserves.
// rate = factor * utilization^exponent per day, accrued into a per-unit index
// the same way funding is.

use crate::market::{MarketConfig, OpenInterest};
use crate::math::{mul_div, pow_scaled, rate_to_u256, u256_to_u128, MathError, Rounding};
use crate::position::Position;
use crate::types::{rate_unit, FeeIndex, Rate, Side, Timestamp, TokenAmount, Usd, SECONDS_PER_DAY};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowingState {
    /// Fraction of size per day
    pub long_borrowing_rate: Rate,
    pub short_borrowing_rate: Rate,
    pub cumulative_long_borrow_fee: FeeIndex,
    pub cumulative_short_borrow_fee: FeeIndex,
    pub last_borrow_update_time: Timestamp,
}

impl BorrowingState {
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            long_borrowing_rate: Rate::ZERO,
            short_borrowing_rate: Rate::ZERO,
            cumulative_long_borrow_fee: FeeIndex::zero(),
            cumulative_short_borrow_fee: FeeIndex::zero(),
            last_borrow_update_time: timestamp,
        }
    }

    pub fn rate(&self, side: Side) -> Rate {
        match side {
            Side::Long => self.long_borrowing_rate,
            Side::Short => self.short_borrowing_rate,
        }
    }

    pub fn cumulative(&self, side: Side) -> FeeIndex {
        match side {
            Side::Long => self.cumulative_long_borrow_fee,
            Side::Short => self.cumulative_short_borrow_fee,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BorrowingAccrual {
    pub long_fee_delta: FeeIndex,
    pub short_fee_delta: FeeIndex,
    pub long_rate: Rate,
    pub short_rate: Rate,
}

// 6.1: factor * min(1, oi / max_allocated)^exponent
pub fn calculate_borrowing_rate(
    config: &MarketConfig,
    open_interest: Usd,
    max_allocated: Usd,
) -> Result<Rate, MathError> {
    if open_interest.is_zero() || max_allocated.is_zero() {
        return Ok(Rate::ZERO);
    }
    let utilization = mul_div(
        open_interest.raw(),
        rate_unit(),
        max_allocated.raw(),
        Rounding::Down,
    )?
    .min(rate_unit());
    let curve = pow_scaled(utilization, config.borrowing_exponent, rate_unit())?;
    let factor = rate_to_u256(config.borrowing_factor, "borrowing_factor")?;
    let rate = mul_div(factor, curve, rate_unit(), Rounding::Down)?;
    Ok(Rate(u256_to_u128(rate, "borrowing_rate")? as i128))
}

/// rate per day applied over `elapsed` seconds
pub fn accrued_per_unit(rate: Rate, elapsed: u64) -> Result<FeeIndex, MathError> {
    mul_div(
        rate_to_u256(rate, "borrowing_rate")?,
        U256::from(elapsed),
        U256::from(SECONDS_PER_DAY),
        Rounding::Down,
    )
}

// 6.2: charge the window at the stored rates, then reprice from current open interest
pub fn update_state(
    config: &MarketConfig,
    state: &mut BorrowingState,
    open_interest: &OpenInterest,
    now: Timestamp,
) -> Result<BorrowingAccrual, MathError> {
    let elapsed = now.seconds_since(state.last_borrow_update_time);
    let long_fee_delta = accrued_per_unit(state.long_borrowing_rate, elapsed)?;
    let short_fee_delta = accrued_per_unit(state.short_borrowing_rate, elapsed)?;

    state.cumulative_long_borrow_fee = state
        .cumulative_long_borrow_fee
        .checked_add(long_fee_delta)
        .ok_or(MathError::Overflow("cumulative_long_borrow_fee"))?;
    state.cumulative_short_borrow_fee = state
        .cumulative_short_borrow_fee
        .checked_add(short_fee_delta)
        .ok_or(MathError::Overflow("cumulative_short_borrow_fee"))?;
    if now > state.last_borrow_update_time {
        state.last_borrow_update_time = now;
    }

    state.long_borrowing_rate = calculate_borrowing_rate(
        config,
        open_interest.long_usd,
        open_interest.max_allocated_long_usd,
    )?;
    state.short_borrowing_rate = calculate_borrowing_rate(
        config,
        open_interest.short_usd,
        open_interest.max_allocated_short_usd,
    )?;

    debug!(
        market = %config.name,
        elapsed,
        long_rate = %state.long_borrowing_rate,
        short_rate = %state.short_borrowing_rate,
        "borrowing accrued"
    );

    Ok(BorrowingAccrual {
        long_fee_delta,
        short_fee_delta,
        long_rate: state.long_borrowing_rate,
        short_rate: state.short_borrowing_rate,
    })
}

// 6.3: only the position's own side is charged. both markers advance
pub fn settle_position(
    state: &BorrowingState,
    position: &mut Position,
) -> Result<TokenAmount, MathError> {
    let side = position.key.side;
    let delta = state
        .cumulative(side)
        .checked_sub(position.borrowing.last_cumulative(side))
        .ok_or(MathError::Underflow("borrowing snapshot ahead of market"))?;
    let owed = mul_div(delta, position.size, rate_unit(), Rounding::Up)?;

    let snapshot = &mut position.borrowing;
    snapshot.fees_owed = snapshot
        .fees_owed
        .checked_add(owed)
        .ok_or(MathError::Overflow("borrow fees_owed"))?;
    snapshot.last_long_cumulative = state.cumulative_long_borrow_fee;
    snapshot.last_short_cumulative = state.cumulative_short_borrow_fee;
    Ok(owed)
}

pub fn claim_borrowing(position: &mut Position) -> TokenAmount {
    std::mem::take(&mut position.borrowing.fees_owed)
}
