//! Position mutations (14.3).
//!
//! Everything here works on the engine's copies of one market and one
//! position. Nothing is committed from this module; the caller validates the
//! returned `Transition` and swaps it in.

use super::requests::RequestKind;
use super::results::EngineError;
use crate::invariant::SettlementBreakdown;
use crate::market::{MarketState, OpenInterest};
use crate::math::{apply_fraction, mul_div, to_tokens, to_usd, MathError, Rounding, BPS_DENOMINATOR};
use crate::oracle::OraclePrice;
use crate::position::Position;
use crate::price_impact::{self, ImpactRequest, SkewSnapshot, TradeDirection};
use crate::pricing;
use crate::types::{Price, Rate, Side, SignedUsd, Timestamp, TokenAmount, Usd};
use crate::{borrowing, funding};
use primitive_types::U256;

/// Prices read once per request.
#[derive(Debug, Clone, Copy)]
pub(super) struct Prices {
    pub index: OraclePrice,
    pub collateral: OraclePrice,
}

impl Prices {
    /// index-token amount to collateral tokens, through usd
    fn index_to_collateral(&self, amount: TokenAmount, rounding: Rounding) -> Result<TokenAmount, MathError> {
        let usd = mul_div(amount, self.index.price.raw(), self.index.base_unit, rounding)?;
        to_tokens(Usd(usd), self.collateral.price, self.collateral.base_unit, rounding)
    }

    fn collateral_usd(&self, amount: TokenAmount) -> Result<Usd, MathError> {
        to_usd(amount, self.collateral.price, self.collateral.base_unit)
    }

    fn usd_to_collateral(&self, usd: Usd, rounding: Rounding) -> Result<TokenAmount, MathError> {
        to_tokens(usd, self.collateral.price, self.collateral.base_unit, rounding)
    }
}

/// Funding and borrowing claimed from a position, in collateral tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) struct SettledFees {
    pub funding_owed: TokenAmount,
    pub funding_earned: TokenAmount,
    pub borrow_fee: TokenAmount,
}

pub(super) struct TradeContext<'a> {
    pub market: &'a mut MarketState,
    pub prices: &'a Prices,
    pub fees: SettledFees,
    pub now: Timestamp,
}

pub(super) enum DecreaseMode {
    Trader {
        collateral_out: TokenAmount,
        max_slippage: Rate,
    },
    /// forced by the protocol: oracle price, no impact, no slippage bound
    Adl,
}

pub(super) enum CollateralChange {
    Deposit(TokenAmount),
    Withdraw(TokenAmount),
}

/// The position after one mutation and what it booked.
#[derive(Debug, Clone)]
pub(super) struct Transition {
    pub after: Position,
    pub breakdown: SettlementBreakdown,
    pub size_delta_usd: Usd,
    pub execution_price: Option<Price>,
    pub price_impact: SignedUsd,
    pub closed: bool,
}

/// The market's open interest as it will be once `kind` lands.
pub(super) fn open_interest_after(
    market: &MarketState,
    kind: &RequestKind,
    side: Side,
    position: Option<&Position>,
    prices: &Prices,
) -> Result<OpenInterest, EngineError> {
    let mut open_interest = market.open_interest.clone();
    match (kind, position) {
        (RequestKind::NewPosition { size_delta_usd, .. }, _)
        | (RequestKind::Increase { size_delta_usd, .. }, _) => {
            open_interest.increase(side, *size_delta_usd)?;
        }
        (RequestKind::Decrease { size_delta_usd, .. }, Some(position))
        | (RequestKind::Adl { size_delta_usd }, Some(position)) => {
            let (delta, _) = clamp_decrease(position, *size_delta_usd, prices)?;
            release_open_interest(&mut open_interest, side, delta)?;
        }
        _ => {}
    }
    Ok(open_interest)
}

/// Settle and claim the position's funding and borrowing against the
/// market's current indices. owed amounts round up, earned rounds down.
pub(super) fn settle_fees(
    market: &MarketState,
    position: &mut Position,
    prices: &Prices,
) -> Result<SettledFees, EngineError> {
    funding::settle_position(&market.funding, position)?;
    borrowing::settle_position(&market.borrowing, position)?;
    let claimed_funding = funding::claim_funding(position);
    let claimed_borrow = borrowing::claim_borrowing(position);

    Ok(SettledFees {
        funding_owed: prices.index_to_collateral(claimed_funding.owed, Rounding::Up)?,
        funding_earned: prices.index_to_collateral(claimed_funding.earned, Rounding::Down)?,
        borrow_fee: prices.index_to_collateral(claimed_borrow, Rounding::Up)?,
    })
}

pub(super) fn apply_increase(
    ctx: &mut TradeContext<'_>,
    mut position: Position,
    collateral_in: TokenAmount,
    size_delta_usd: Usd,
    max_slippage: Rate,
) -> Result<Transition, EngineError> {
    if size_delta_usd.is_zero() {
        return Err(EngineError::ZeroAmount);
    }
    let side = position.side();
    let market = &mut *ctx.market;
    let prices = ctx.prices;

    let outcome = price_impact::execution_price(
        &market.config,
        &market.impact_pool,
        &ImpactRequest {
            skew: SkewSnapshot::new(market.open_interest.long_usd, market.open_interest.short_usd),
            side,
            direction: TradeDirection::Increase,
            size_delta_usd,
            reference_price: prices.index.price,
            index_base_unit: prices.index.base_unit,
            max_slippage: Some(max_slippage),
        },
    )?;
    // dust that buys no index tokens would book open interest for nothing
    if outcome.size_delta_tokens.is_zero() {
        return Err(EngineError::ZeroAmount);
    }
    price_impact::apply_to_pool(&mut market.impact_pool, outcome.impact_usd)?;

    position.weighted_avg_entry_price = pricing::weighted_average_entry(
        position.weighted_avg_entry_price,
        position.size,
        outcome.execution_price,
        outcome.size_delta_tokens,
    )?;
    position.size = position
        .size
        .checked_add(outcome.size_delta_tokens)
        .ok_or(MathError::Overflow("position size"))?;

    let breakdown = SettlementBreakdown {
        collateral_in,
        position_fee: position_fee(market.config.position_fee_bps, size_delta_usd, prices)?,
        funding_owed: ctx.fees.funding_owed,
        funding_earned: ctx.fees.funding_earned,
        borrow_fee: ctx.fees.borrow_fee,
        ..SettlementBreakdown::default()
    };
    position.collateral_amount = settle_collateral(position.collateral_amount, &breakdown)?;
    position.updated_at = ctx.now;

    market.open_interest.increase(side, size_delta_usd)?;
    check_reserve(&market.open_interest, side, market.config.reserve_factor)?;
    check_leverage(&position, prices, market.config.max_leverage)?;

    Ok(Transition {
        after: position,
        breakdown,
        size_delta_usd,
        execution_price: Some(outcome.execution_price),
        price_impact: outcome.impact_usd,
        closed: false,
    })
}

pub(super) fn apply_decrease(
    ctx: &mut TradeContext<'_>,
    mut position: Position,
    size_delta_usd: Usd,
    mode: DecreaseMode,
) -> Result<Transition, EngineError> {
    if size_delta_usd.is_zero() {
        return Err(EngineError::ZeroAmount);
    }
    let side = position.side();
    let market = &mut *ctx.market;
    let prices = ctx.prices;

    let size_before = position.size;
    let size_usd_before = position.size_usd(prices.index.base_unit)?;
    let (delta_usd, full_close) = clamp_decrease(&position, size_delta_usd, prices)?;
    let delta_tokens = if full_close {
        size_before
    } else {
        mul_div(size_before, delta_usd.raw(), size_usd_before.raw(), Rounding::Down)?
    };
    if delta_tokens.is_zero() {
        return Err(EngineError::ZeroAmount);
    }

    let (fill_price, impact) = match &mode {
        DecreaseMode::Trader { max_slippage, .. } => {
            let outcome = price_impact::execution_price(
                &market.config,
                &market.impact_pool,
                &ImpactRequest {
                    skew: SkewSnapshot::new(
                        market.open_interest.long_usd,
                        market.open_interest.short_usd,
                    ),
                    side,
                    direction: TradeDirection::Decrease,
                    size_delta_usd: delta_usd,
                    reference_price: prices.index.price,
                    index_base_unit: prices.index.base_unit,
                    max_slippage: Some(*max_slippage),
                },
            )?;
            price_impact::apply_to_pool(&mut market.impact_pool, outcome.impact_usd)?;
            (outcome.execution_price, outcome.impact_usd)
        }
        DecreaseMode::Adl => (prices.index.price, SignedUsd::ZERO),
    };

    let total_pnl = pricing::calculate_pnl(
        side,
        fill_price,
        position.weighted_avg_entry_price,
        size_usd_before,
    )?;
    if matches!(mode, DecreaseMode::Adl) && !total_pnl.is_positive() {
        return Err(EngineError::AdlNotProfitable(position.key));
    }
    let realized = pricing::realized_pnl(total_pnl, delta_tokens, size_before)?;
    let pnl = pricing::pnl_to_collateral(realized, prices.collateral.price, prices.collateral.base_unit)?;

    let mut breakdown = SettlementBreakdown {
        position_fee: position_fee(market.config.position_fee_bps, delta_usd, prices)?,
        funding_owed: ctx.fees.funding_owed,
        funding_earned: ctx.fees.funding_earned,
        borrow_fee: ctx.fees.borrow_fee,
        pnl_profit: pnl.profit,
        pnl_loss: pnl.loss,
        ..SettlementBreakdown::default()
    };

    position.realized_pnl = position
        .realized_pnl
        .checked_add(realized)
        .ok_or(MathError::Overflow("realized pnl"))?;
    position.weighted_avg_entry_price =
        pricing::entry_after_decrease(position.weighted_avg_entry_price, size_before, delta_tokens);
    position.size = size_before
        .checked_sub(delta_tokens)
        .ok_or(MathError::Underflow("position size"))?;
    position.updated_at = ctx.now;

    if full_close {
        // whatever is left after charges goes back to the owner
        let available = available_collateral(position.collateral_amount, &breakdown)?;
        let charges = breakdown.charges()?;
        breakdown.collateral_out = available.checked_sub(charges).ok_or(
            EngineError::InsufficientCollateral {
                required: charges,
                available,
            },
        )?;
        position.clear(ctx.now);
    } else {
        if let DecreaseMode::Trader { collateral_out, .. } = &mode {
            breakdown.collateral_out = *collateral_out;
        }
        position.collateral_amount = settle_collateral(position.collateral_amount, &breakdown)?;
        if !matches!(mode, DecreaseMode::Adl) {
            check_leverage(&position, prices, market.config.max_leverage)?;
        }
    }

    release_open_interest(&mut market.open_interest, side, delta_usd)?;

    Ok(Transition {
        after: position,
        breakdown,
        size_delta_usd: delta_usd,
        execution_price: Some(fill_price),
        price_impact: impact,
        closed: full_close,
    })
}

pub(super) fn apply_collateral_change(
    ctx: &mut TradeContext<'_>,
    mut position: Position,
    change: CollateralChange,
) -> Result<Transition, EngineError> {
    let mut breakdown = SettlementBreakdown {
        funding_owed: ctx.fees.funding_owed,
        funding_earned: ctx.fees.funding_earned,
        borrow_fee: ctx.fees.borrow_fee,
        ..SettlementBreakdown::default()
    };
    let withdrawal = match change {
        CollateralChange::Deposit(amount) if !amount.is_zero() => {
            breakdown.collateral_in = amount;
            false
        }
        CollateralChange::Withdraw(amount) if !amount.is_zero() => {
            breakdown.collateral_out = amount;
            true
        }
        _ => return Err(EngineError::ZeroAmount),
    };

    position.collateral_amount = settle_collateral(position.collateral_amount, &breakdown)?;
    position.updated_at = ctx.now;
    if withdrawal {
        check_leverage(&position, ctx.prices, ctx.market.config.max_leverage)?;
    }

    Ok(Transition {
        after: position,
        breakdown,
        size_delta_usd: Usd::ZERO,
        execution_price: None,
        price_impact: SignedUsd::ZERO,
        closed: false,
    })
}

/// Requested decrease capped at the position's size; the flag marks a full close.
fn clamp_decrease(
    position: &Position,
    requested: Usd,
    prices: &Prices,
) -> Result<(Usd, bool), MathError> {
    let size_usd = position.size_usd(prices.index.base_unit)?;
    if requested >= size_usd {
        Ok((size_usd, true))
    } else {
        Ok((requested, false))
    }
}

fn release_open_interest(open_interest: &mut OpenInterest, side: Side, amount: Usd) -> Result<(), MathError> {
    let amount = amount.min(open_interest.side(side));
    open_interest.decrease(side, amount)
}

// bps of the traded size, charged in collateral and rounded up
fn position_fee(bps: u32, size_delta_usd: Usd, prices: &Prices) -> Result<TokenAmount, MathError> {
    if bps == 0 {
        return Ok(TokenAmount::zero());
    }
    let fee_usd = mul_div(
        size_delta_usd.raw(),
        U256::from(bps),
        U256::from(BPS_DENOMINATOR),
        Rounding::Up,
    )?;
    prices.usd_to_collateral(Usd(fee_usd), Rounding::Up)
}

fn available_collateral(current: TokenAmount, breakdown: &SettlementBreakdown) -> Result<TokenAmount, MathError> {
    current
        .checked_add(breakdown.credits()?)
        .ok_or(MathError::Overflow("collateral"))
}

/// current + credits - debits, or the shortfall.
fn settle_collateral(current: TokenAmount, breakdown: &SettlementBreakdown) -> Result<TokenAmount, EngineError> {
    let available = available_collateral(current, breakdown)?;
    let required = breakdown.debits()?;
    available
        .checked_sub(required)
        .ok_or(EngineError::InsufficientCollateral { required, available })
}

fn check_leverage(position: &Position, prices: &Prices, max_leverage: u32) -> Result<(), EngineError> {
    let size_usd = to_usd(position.size, prices.index.price, prices.index.base_unit)?;
    let collateral_usd = prices.collateral_usd(position.collateral_amount)?;
    let limit = collateral_usd
        .raw()
        .checked_mul(U256::from(max_leverage))
        .ok_or(MathError::Overflow("leverage limit"))?;
    if size_usd.raw() > limit {
        return Err(EngineError::LeverageExceeded {
            size_usd,
            collateral_usd,
            max_leverage,
        });
    }
    Ok(())
}

// side open interest must stay within allocation * reserve factor
fn check_reserve(open_interest: &OpenInterest, side: Side, reserve_factor: Rate) -> Result<(), EngineError> {
    let capacity = Usd(apply_fraction(
        open_interest.max_allocated(side).raw(),
        reserve_factor,
        Rounding::Down,
    )?);
    let used = open_interest.side(side);
    if used > capacity {
        return Err(EngineError::ReserveExceeded {
            side,
            open_interest: used,
            capacity,
        });
    }
    Ok(())
}
