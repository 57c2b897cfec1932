// 4.0: funding. the rate drifts linearly at `velocity` between updates and the
// fee charged over a window is the exact integer sum of that line, clamped to
// [min, max]. positive rate = longs pay, negative = shorts pay.
// 4.0 has the state, 4.1 velocity, 4.2 series sum and the case split, 4.3 state
// update, 4.4 position settlement.

use crate::market::MarketConfig;
use crate::math::{div_ceil_u128, mul_div, rate_to_u256, u256_to_u128, MathError, Rounding};
use crate::position::Position;
use crate::types::{rate_unit, FeeIndex, Rate, Side, SignedUsd, Timestamp, TokenAmount};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingState {
    pub funding_rate: Rate,
    pub funding_rate_velocity: Rate,
    pub last_funding_update_time: Timestamp,
    /// Fee per unit of long size since market creation, never decreases
    pub cumulative_long_funding_fee: FeeIndex,
    pub cumulative_short_funding_fee: FeeIndex,
}

impl FundingState {
    pub fn new(timestamp: Timestamp) -> Self {
        Self {
            funding_rate: Rate::ZERO,
            funding_rate_velocity: Rate::ZERO,
            last_funding_update_time: timestamp,
            cumulative_long_funding_fee: FeeIndex::zero(),
            cumulative_short_funding_fee: FeeIndex::zero(),
        }
    }

    pub fn cumulative(&self, side: Side) -> FeeIndex {
        match side {
            Side::Long => self.cumulative_long_funding_fee,
            Side::Short => self.cumulative_short_funding_fee,
        }
    }
}

/// Which shape the rate line took over the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CrossingCase {
    /// zero elapsed time, nothing accrued
    Idle,
    /// velocity zero, rate constant
    Static,
    /// rate already at a bound and pushed further into it
    Pinned,
    /// neither flips sign nor reaches a bound
    Linear,
    Flip,
    Boundary,
    FlipAndBoundary,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FundingRecompute {
    pub long_fee_delta: FeeIndex,
    pub short_fee_delta: FeeIndex,
    pub new_rate: Rate,
    pub new_velocity: Rate,
    pub case: CrossingCase,
}

// 4.1: velocity from proportional skew. below the clamp the rate holds still,
// above it the skew fraction is bounded to [-1, 1] and scaled by max velocity
pub fn calculate_velocity(config: &MarketConfig, skew: SignedUsd) -> Result<Rate, MathError> {
    if skew.is_zero() || config.skew_scale.is_zero() {
        return Ok(Rate::ZERO);
    }
    let proportional = mul_div(
        skew.abs().raw(),
        rate_unit(),
        config.skew_scale.raw(),
        Rounding::Down,
    )?;
    let clamp = rate_to_u256(config.funding_velocity_clamp, "funding_velocity_clamp")?;
    if proportional < clamp {
        return Ok(Rate::ZERO);
    }
    let bounded = proportional.min(rate_unit());
    let max_velocity = rate_to_u256(config.max_funding_velocity, "max_funding_velocity")?;
    let magnitude = mul_div(bounded, max_velocity, rate_unit(), Rounding::Down)?;
    let magnitude = u256_to_u128(magnitude, "funding_velocity")? as i128;
    Ok(Rate(if skew.is_negative() { -magnitude } else { magnitude }))
}

// 4.2: S(a, d, n) = n*a + d*n*(n-1)/2, the sum of a, a+d, ..., a+(n-1)d.
// same value as n/2 * (2a + (n-1)d) without the half-step rounding
pub fn series_sum(first: i128, step: i128, n: u64) -> Result<i128, MathError> {
    match n {
        0 => Ok(0),
        1 => Ok(first),
        _ => {
            let n = n as i128;
            let base = n.checked_mul(first).ok_or(MathError::Overflow("series_sum"))?;
            let triangle = n
                .checked_mul(n - 1)
                .ok_or(MathError::Overflow("series_sum"))?
                / 2;
            let drift = step
                .checked_mul(triangle)
                .ok_or(MathError::Overflow("series_sum"))?;
            base.checked_add(drift).ok_or(MathError::Overflow("series_sum"))
        }
    }
}

#[derive(Debug, Default)]
struct FeeSplit {
    long: u128,
    short: u128,
}

impl FeeSplit {
    fn charge(&mut self, payer: Side, amount: i128) -> Result<(), MathError> {
        let slot = match payer {
            Side::Long => &mut self.long,
            Side::Short => &mut self.short,
        };
        *slot = slot
            .checked_add(amount.unsigned_abs())
            .ok_or(MathError::Overflow("funding_fee"))?;
        Ok(())
    }
}

/// Side paying a rate of this sign. zero counts as long; its amount is zero anyway.
fn payer(rate: i128) -> Side {
    if rate < 0 {
        Side::Short
    } else {
        Side::Long
    }
}

fn checked_line(rate: i128, velocity: i128, n: u64) -> Result<i128, MathError> {
    velocity
        .checked_mul(n as i128)
        .and_then(|drift| rate.checked_add(drift))
        .ok_or(MathError::Overflow("funding_rate"))
}

fn to_u64(v: u128) -> Result<u64, MathError> {
    u64::try_from(v).map_err(|_| MathError::Overflow("crossing_time"))
}

/// Fee deltas for `elapsed` seconds plus the rate and velocity to store next.
/// `skew` is the post-trade skew; it only drives the new velocity.
pub fn recompute(
    config: &MarketConfig,
    state: &FundingState,
    skew: SignedUsd,
    elapsed: u64,
) -> Result<FundingRecompute, MathError> {
    let min = config.min_funding_rate.raw();
    let max = config.max_funding_rate.raw();
    let rate = state.funding_rate.raw().clamp(min, max);
    let velocity = state.funding_rate_velocity.raw();
    let new_velocity = calculate_velocity(config, skew)?;

    if elapsed == 0 {
        return Ok(FundingRecompute {
            long_fee_delta: FeeIndex::zero(),
            short_fee_delta: FeeIndex::zero(),
            new_rate: Rate(rate),
            new_velocity,
            case: CrossingCase::Idle,
        });
    }

    let final_rate = checked_line(rate, velocity, elapsed)?;
    let mut split = FeeSplit::default();
    let case = accrue(&mut split, rate, velocity, final_rate, elapsed, min, max)?;

    Ok(FundingRecompute {
        long_fee_delta: U256::from(split.long),
        short_fee_delta: U256::from(split.short),
        new_rate: Rate(final_rate.clamp(min, max)),
        new_velocity,
        case,
    })
}

fn accrue(
    split: &mut FeeSplit,
    rate: i128,
    velocity: i128,
    final_rate: i128,
    elapsed: u64,
    min: i128,
    max: i128,
) -> Result<CrossingCase, MathError> {
    let window = elapsed as i128;

    if velocity == 0 {
        let total = rate.checked_mul(window).ok_or(MathError::Overflow("funding_fee"))?;
        split.charge(payer(rate), total)?;
        return Ok(CrossingCase::Static);
    }

    // the bound the line is heading towards
    let boundary = if velocity > 0 { max } else { min };

    if rate == boundary {
        let total = boundary.checked_mul(window).ok_or(MathError::Overflow("funding_fee"))?;
        split.charge(payer(boundary), total)?;
        return Ok(CrossingCase::Pinned);
    }

    let flipped = rate != 0 && final_rate != 0 && (rate > 0) != (final_rate > 0);
    let crossed = final_rate > max || final_rate < min;
    let speed = velocity.unsigned_abs();

    match (flipped, crossed) {
        (false, false) => {
            let total = series_sum(rate, velocity, elapsed)?;
            let source = if rate != 0 { rate } else { velocity };
            split.charge(payer(source), total)?;
            Ok(CrossingCase::Linear)
        }
        (true, false) => {
            let to_flip = to_u64(div_ceil_u128(rate.unsigned_abs(), speed)?)?;
            let before = series_sum(rate, velocity, to_flip)?;
            let rate_at_flip = checked_line(rate, velocity, to_flip)?;
            let after = series_sum(rate_at_flip, velocity, elapsed - to_flip)?;
            split.charge(payer(rate), before)?;
            split.charge(payer(rate).opposite(), after)?;
            Ok(CrossingCase::Flip)
        }
        (false, true) => {
            let gap = boundary.unsigned_abs() - rate.unsigned_abs();
            let to_boundary = to_u64(div_ceil_u128(gap, speed)?)?;
            let approach = series_sum(rate, velocity, to_boundary)?;
            let pinned = boundary
                .checked_mul((elapsed - to_boundary) as i128)
                .ok_or(MathError::Overflow("funding_fee"))?;
            split.charge(payer(boundary), approach)?;
            split.charge(payer(boundary), pinned)?;
            Ok(CrossingCase::Boundary)
        }
        (true, true) => {
            let to_flip = to_u64(div_ceil_u128(rate.unsigned_abs(), speed)?)?;
            let span = boundary.unsigned_abs() + rate.unsigned_abs();
            let to_boundary = to_u64(div_ceil_u128(span, speed)?)?;
            let before = series_sum(rate, velocity, to_flip)?;
            let rate_at_flip = checked_line(rate, velocity, to_flip)?;
            let approach = series_sum(rate_at_flip, velocity, to_boundary - to_flip)?;
            let pinned = boundary
                .checked_mul((elapsed - to_boundary) as i128)
                .ok_or(MathError::Overflow("funding_fee"))?;
            split.charge(payer(rate), before)?;
            split.charge(payer(rate).opposite(), approach)?;
            split.charge(payer(rate).opposite(), pinned)?;
            Ok(CrossingCase::FlipAndBoundary)
        }
    }
}

// 4.3: accrue up to `now` and store the new rate/velocity. an older `now`
// counts as zero elapsed so the update time never moves backwards
pub fn update_state(
    config: &MarketConfig,
    state: &mut FundingState,
    skew: SignedUsd,
    now: Timestamp,
) -> Result<FundingRecompute, MathError> {
    let elapsed = now.seconds_since(state.last_funding_update_time);
    let result = recompute(config, state, skew, elapsed)?;

    state.cumulative_long_funding_fee = state
        .cumulative_long_funding_fee
        .checked_add(result.long_fee_delta)
        .ok_or(MathError::Overflow("cumulative_long_funding_fee"))?;
    state.cumulative_short_funding_fee = state
        .cumulative_short_funding_fee
        .checked_add(result.short_fee_delta)
        .ok_or(MathError::Overflow("cumulative_short_funding_fee"))?;
    state.funding_rate = result.new_rate;
    state.funding_rate_velocity = result.new_velocity;
    if now > state.last_funding_update_time {
        state.last_funding_update_time = now;
    }

    debug!(
        market = %config.name,
        elapsed,
        case = ?result.case,
        rate = %result.new_rate,
        velocity = %result.new_velocity,
        "funding accrued"
    );
    Ok(result)
}

/// Funding moved into a position's pending balances by one settlement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FundingSettlement {
    pub owed: TokenAmount,
    pub earned: TokenAmount,
}

// 4.4: charge the position's own side index and credit the opposite side's,
// both scaled by size. owed rounds up, earned rounds down
pub fn settle_position(
    state: &FundingState,
    position: &mut Position,
) -> Result<FundingSettlement, MathError> {
    let side = position.key.side;
    let own_now = state.cumulative(side);
    let other_now = state.cumulative(side.opposite());
    let own_snap = position.funding.last_cumulative(side);
    let other_snap = position.funding.last_cumulative(side.opposite());

    let own_delta = own_now
        .checked_sub(own_snap)
        .ok_or(MathError::Underflow("funding snapshot ahead of market"))?;
    let other_delta = other_now
        .checked_sub(other_snap)
        .ok_or(MathError::Underflow("funding snapshot ahead of market"))?;

    let owed = mul_div(own_delta, position.size, rate_unit(), Rounding::Up)?;
    let earned = mul_div(other_delta, position.size, rate_unit(), Rounding::Down)?;

    let snapshot = &mut position.funding;
    snapshot.fees_owed = snapshot
        .fees_owed
        .checked_add(owed)
        .ok_or(MathError::Overflow("fees_owed"))?;
    snapshot.fees_earned = snapshot
        .fees_earned
        .checked_add(earned)
        .ok_or(MathError::Overflow("fees_earned"))?;
    snapshot.last_long_cumulative = state.cumulative_long_funding_fee;
    snapshot.last_short_cumulative = state.cumulative_short_funding_fee;

    Ok(FundingSettlement { owed, earned })
}

/// Drains the pending owed/earned balances. amounts are in index-token units.
pub fn claim_funding(position: &mut Position) -> FundingSettlement {
    let claimed = FundingSettlement {
        owed: position.funding.fees_owed,
        earned: position.funding.fees_earned,
    };
    position.funding.fees_owed = TokenAmount::zero();
    position.funding.fees_earned = TokenAmount::zero();
    claimed
}
