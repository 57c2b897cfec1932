// 8.0: entry price and pnl bookkeeping.
// pnl = sign * |price - entry| * size_usd / entry, in usd. collateral
// conversions round in the pool's favor: profits down, losses up.

use crate::math::{mul_div, to_tokens, MathError, Rounding};
use crate::types::{Price, Side, SignedUsd, TokenAmount, Usd};
use primitive_types::{U256, U512};

// 8.1: size-weighted average of the old entry and the fill
pub fn weighted_average_entry(
    old_entry: Price,
    old_size: TokenAmount,
    fill_price: Price,
    size_delta: TokenAmount,
) -> Result<Price, MathError> {
    let total = old_size
        .checked_add(size_delta)
        .ok_or(MathError::Overflow("position size"))?;
    if total.is_zero() {
        return Ok(Price::ZERO);
    }
    let weighted = U512::from(old_entry.raw()) * U512::from(old_size)
        + U512::from(fill_price.raw()) * U512::from(size_delta);
    let avg = weighted / U512::from(total);
    U256::try_from(avg)
        .map(Price::new)
        .map_err(|_| MathError::Overflow("weighted_average_entry"))
}

/// Entry price is untouched by a partial decrease and reset by a full close.
pub fn entry_after_decrease(entry: Price, size_before: TokenAmount, size_delta: TokenAmount) -> Price {
    if size_delta >= size_before {
        Price::ZERO
    } else {
        entry
    }
}

// 8.2: total pnl of the position at `price`
pub fn calculate_pnl(
    side: Side,
    price: Price,
    entry: Price,
    size_usd: Usd,
) -> Result<SignedUsd, MathError> {
    if entry.is_zero() || size_usd.is_zero() {
        return Ok(SignedUsd::ZERO);
    }
    let magnitude = mul_div(
        price.abs_diff(entry).raw(),
        size_usd.raw(),
        entry.raw(),
        Rounding::Down,
    )?;
    let in_profit = match side {
        Side::Long => price > entry,
        Side::Short => price < entry,
    };
    Ok(SignedUsd::from_sign(!in_profit, Usd(magnitude)))
}

/// Share of the total pnl realized by closing `size_delta` of `size_before`.
pub fn realized_pnl(
    total: SignedUsd,
    size_delta: TokenAmount,
    size_before: TokenAmount,
) -> Result<SignedUsd, MathError> {
    if size_before.is_zero() {
        return Ok(SignedUsd::ZERO);
    }
    if size_delta >= size_before {
        return Ok(total);
    }
    let rounding = if total.is_negative() { Rounding::Up } else { Rounding::Down };
    let magnitude = mul_div(total.abs().raw(), size_delta, size_before, rounding)?;
    Ok(SignedUsd::from_sign(total.is_negative(), Usd(magnitude)))
}

/// Pnl in collateral token units. exactly one side is non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollateralPnl {
    pub profit: TokenAmount,
    pub loss: TokenAmount,
}

// 8.3: usd pnl to collateral tokens
pub fn pnl_to_collateral(
    pnl: SignedUsd,
    collateral_price: Price,
    collateral_base_unit: U256,
) -> Result<CollateralPnl, MathError> {
    if pnl.is_negative() {
        let loss = to_tokens(pnl.abs(), collateral_price, collateral_base_unit, Rounding::Up)?;
        Ok(CollateralPnl { profit: U256::zero(), loss })
    } else {
        let profit = to_tokens(pnl.abs(), collateral_price, collateral_base_unit, Rounding::Down)?;
        Ok(CollateralPnl { profit, loss: U256::zero() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eth(n: u64) -> TokenAmount {
        U256::exp10(18) * n
    }

    #[test]
    fn average_entry_weighted_by_size() {
        // 1 @ 50000 + 1 @ 52000 = 2 @ 51000
        let avg = weighted_average_entry(
            Usd::from_whole(50_000),
            eth(1),
            Usd::from_whole(52_000),
            eth(1),
        )
        .unwrap();
        assert_eq!(avg, Usd::from_whole(51_000));

        // from empty the fill price is taken as is
        let avg = weighted_average_entry(Price::ZERO, U256::zero(), Usd::from_whole(3_000), eth(4)).unwrap();
        assert_eq!(avg, Usd::from_whole(3_000));
    }

    #[test]
    fn full_close_resets_entry() {
        let entry = Usd::from_whole(100);
        assert_eq!(entry_after_decrease(entry, eth(2), eth(1)), entry);
        assert_eq!(entry_after_decrease(entry, eth(2), eth(2)), Price::ZERO);
    }

    #[test]
    fn pnl_signs() {
        let entry = Usd::from_whole(50_000);
        let size = Usd::from_whole(50_000); // 1 BTC
        let up = Usd::from_whole(52_000);
        let down = Usd::from_whole(48_000);

        assert_eq!(
            calculate_pnl(Side::Long, up, entry, size).unwrap(),
            SignedUsd::positive(Usd::from_whole(2_000))
        );
        assert_eq!(
            calculate_pnl(Side::Long, down, entry, size).unwrap(),
            SignedUsd::negative(Usd::from_whole(2_000))
        );
        assert_eq!(
            calculate_pnl(Side::Short, down, entry, size).unwrap(),
            SignedUsd::positive(Usd::from_whole(2_000))
        );
        assert_eq!(calculate_pnl(Side::Short, entry, entry, size).unwrap(), SignedUsd::ZERO);
    }

    #[test]
    fn realized_share() {
        let total = SignedUsd::positive(Usd::from_whole(2_000));
        assert_eq!(
            realized_pnl(total, eth(1), eth(2)).unwrap(),
            SignedUsd::positive(Usd::from_whole(1_000))
        );
        assert_eq!(realized_pnl(total, eth(2), eth(2)).unwrap(), total);
    }

    #[test]
    fn collateral_rounding_favors_pool() {
        // $10 at $3 per 6-decimal token
        let price = Usd::from_whole(3);
        let base = U256::exp10(6);
        let profit = pnl_to_collateral(SignedUsd::positive(Usd::from_whole(10)), price, base).unwrap();
        let loss = pnl_to_collateral(SignedUsd::negative(Usd::from_whole(10)), price, base).unwrap();
        assert_eq!(profit.profit, U256::from(3_333_333u64));
        assert_eq!(loss.loss, U256::from(3_333_334u64));
        assert!(profit.loss.is_zero() && loss.profit.is_zero());
    }
}
