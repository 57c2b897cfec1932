// 7.0: price impact. trades that widen the long/short imbalance pay, trades
// that narrow it are paid out of the impact pool. the impact is folded into
// the execution price as a token adjustment.
// 7.1 skew, 7.2 impact curve, 7.3 impacted price, 7.4 slippage and pool.

use crate::market::{ImpactPool, MarketConfig};
use crate::math::{apply_fraction, mul_div, pow_scaled, to_tokens, to_usd, MathError, Rounding};
use crate::types::{rate_unit, usd_unit, Price, Rate, Side, SignedUsd, TokenAmount, Usd};
use primitive_types::U256;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceImpactError {
    #[error("slippage exceeded: impacted price {impacted} vs reference {reference}, max {max_slippage}")]
    SlippageExceeded {
        impacted: Price,
        reference: Price,
        max_slippage: Rate,
    },

    #[error("price impact consumes the whole trade size")]
    ImpactExceedsSize,

    #[error(transparent)]
    Math(#[from] MathError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeDirection {
    Increase,
    Decrease,
}

/// Increase long and decrease short both buy the index token.
pub fn is_buyer(side: Side, direction: TradeDirection) -> bool {
    matches!(
        (side, direction),
        (Side::Long, TradeDirection::Increase) | (Side::Short, TradeDirection::Decrease)
    )
}

// 7.1: usd value on each side of the book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SkewSnapshot {
    pub long_usd: Usd,
    pub short_usd: Usd,
}

impl SkewSnapshot {
    pub fn new(long_usd: Usd, short_usd: Usd) -> Self {
        Self { long_usd, short_usd }
    }

    /// From token balances valued at their prices.
    pub fn from_balances(
        long: (TokenAmount, Price, U256),
        short: (TokenAmount, Price, U256),
    ) -> Result<Self, MathError> {
        Ok(Self {
            long_usd: to_usd(long.0, long.1, long.2)?,
            short_usd: to_usd(short.0, short.1, short.2)?,
        })
    }

    pub fn imbalance(&self) -> Usd {
        self.long_usd.abs_diff(self.short_usd)
    }

    pub fn after(&self, side: Side, direction: TradeDirection, size: Usd) -> Result<Self, MathError> {
        let mut next = *self;
        let slot = match side {
            Side::Long => &mut next.long_usd,
            Side::Short => &mut next.short_usd,
        };
        *slot = match direction {
            TradeDirection::Increase => slot.checked_add(size).ok_or(MathError::Overflow("skew"))?,
            TradeDirection::Decrease => slot.checked_sub(size).ok_or(MathError::Underflow("skew"))?,
        };
        Ok(next)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImpactCurve {
    pub impact: SignedUsd,
    pub skew_before: Usd,
    pub skew_after: Usd,
    pub flipped: bool,
}

// 7.2: factor * (before^e - after^e) on the same side, split factors on a flip
pub fn calculate_impact_usd(
    config: &MarketConfig,
    skew: &SkewSnapshot,
    side: Side,
    direction: TradeDirection,
    size_delta: Usd,
) -> Result<ImpactCurve, MathError> {
    let next = skew.after(side, direction, size_delta)?;
    let before = skew.imbalance();
    let after = next.imbalance();
    let flipped = !before.is_zero()
        && !after.is_zero()
        && (skew.long_usd > skew.short_usd) != (next.long_usd > next.short_usd);

    let e = config.price_impact_exponent;
    let before_e = pow_scaled(before.raw(), e, usd_unit())?;
    let after_e = pow_scaled(after.raw(), e, usd_unit())?;

    let impact = if flipped {
        let gain = apply_fraction(before_e, config.positive_impact_factor, Rounding::Down)?;
        let cost = apply_fraction(after_e, config.negative_impact_factor, Rounding::Up)?;
        SignedUsd::difference(Usd(gain), Usd(cost))
    } else {
        let worsened = after > before;
        let (factor, rounding) = if worsened {
            (config.negative_impact_factor, Rounding::Up)
        } else {
            (config.positive_impact_factor, Rounding::Down)
        };
        let raw = SignedUsd::difference(Usd(before_e), Usd(after_e));
        let magnitude = apply_fraction(raw.abs().raw(), factor, rounding)?;
        SignedUsd::from_sign(raw.is_negative(), Usd(magnitude))
    };

    Ok(ImpactCurve {
        impact,
        skew_before: before,
        skew_after: after,
        flipped,
    })
}

/// positive impact can't pay out more than the pool holds
pub fn cap_to_pool(impact: SignedUsd, pool: &ImpactPool) -> SignedUsd {
    if impact.is_positive() && impact.abs() > pool.balance {
        SignedUsd::positive(pool.balance)
    } else {
        impact
    }
}

// 7.3: impact becomes extra (or fewer) tokens for the same usd size
pub fn impacted_price(
    size_usd: Usd,
    impact: SignedUsd,
    side: Side,
    direction: TradeDirection,
    reference: Price,
    base_unit: U256,
) -> Result<(Price, TokenAmount), PriceImpactError> {
    let nominal = to_tokens(size_usd, reference, base_unit, Rounding::Down)?;
    if size_usd.is_zero() || impact.is_zero() {
        return Ok((reference, nominal));
    }

    let favorable = impact.is_positive();
    let rounding = if favorable { Rounding::Down } else { Rounding::Up };
    let adjustment = mul_div(nominal, impact.abs().raw(), size_usd.raw(), rounding)?;

    let adjusted = if is_buyer(side, direction) == favorable {
        nominal
            .checked_add(adjustment)
            .ok_or(MathError::Overflow("impacted tokens"))?
    } else {
        nominal
            .checked_sub(adjustment)
            .ok_or(PriceImpactError::ImpactExceedsSize)?
    };
    if adjusted.is_zero() {
        return Err(PriceImpactError::ImpactExceedsSize);
    }

    let price = mul_div(size_usd.raw(), base_unit, adjusted, Rounding::Down)?;
    Ok((Usd(price), adjusted))
}

// 7.4: only unfavorable moves count against max slippage
pub fn check_slippage(
    impacted: Price,
    reference: Price,
    impact: SignedUsd,
    max_slippage: Rate,
) -> Result<(), PriceImpactError> {
    if !impact.is_negative() || reference.is_zero() {
        return Ok(());
    }
    let deviation = mul_div(
        impacted.abs_diff(reference).raw(),
        rate_unit(),
        reference.raw(),
        Rounding::Up,
    )?;
    if deviation > U256::from(max_slippage.unsigned_abs()) {
        return Err(PriceImpactError::SlippageExceeded {
            impacted,
            reference,
            max_slippage,
        });
    }
    Ok(())
}

pub fn apply_to_pool(pool: &mut ImpactPool, impact: SignedUsd) -> Result<(), MathError> {
    pool.balance = if impact.is_positive() {
        pool.balance
            .checked_sub(impact.abs())
            .ok_or(MathError::Underflow("impact pool"))?
    } else {
        pool.balance
            .checked_add(impact.abs())
            .ok_or(MathError::Overflow("impact pool"))?
    };
    Ok(())
}

#[derive(Debug, Clone)]
pub struct ImpactRequest {
    pub skew: SkewSnapshot,
    pub side: Side,
    pub direction: TradeDirection,
    pub size_delta_usd: Usd,
    pub reference_price: Price,
    pub index_base_unit: U256,
    /// None skips the check (forced decreases)
    pub max_slippage: Option<Rate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpactOutcome {
    /// after the pool cap
    pub impact_usd: SignedUsd,
    pub uncapped_impact_usd: SignedUsd,
    pub skew_before: Usd,
    pub skew_after: Usd,
    pub flipped: bool,
    pub execution_price: Price,
    pub size_delta_tokens: TokenAmount,
}

/// Curve, pool cap, impacted price and slippage for one trade.
pub fn execution_price(
    config: &MarketConfig,
    pool: &ImpactPool,
    request: &ImpactRequest,
) -> Result<ImpactOutcome, PriceImpactError> {
    let curve = calculate_impact_usd(
        config,
        &request.skew,
        request.side,
        request.direction,
        request.size_delta_usd,
    )?;
    let impact_usd = cap_to_pool(curve.impact, pool);
    let (price, tokens) = impacted_price(
        request.size_delta_usd,
        impact_usd,
        request.side,
        request.direction,
        request.reference_price,
        request.index_base_unit,
    )?;
    if let Some(max) = request.max_slippage {
        check_slippage(price, request.reference_price, impact_usd, max)?;
    }
    Ok(ImpactOutcome {
        impact_usd,
        uncapped_impact_usd: curve.impact,
        skew_before: curve.skew_before,
        skew_after: curve.skew_after,
        flipped: curve.flipped,
        execution_price: price,
        size_delta_tokens: tokens,
    })
}
