// 2.0: math kernel. every fixed-point product goes through a 512-bit intermediate
// so nothing here can silently wrap. 2.1 mul/div, 2.2 percentages and powers,
// 2.3 token/usd conversion, 2.4 decimal bridges for config and display.

use crate::types::{rate_unit, Price, Rate, TokenAmount, Usd, RATE_DECIMALS, USD_DECIMALS};
use primitive_types::{U256, U512};
use rust_decimal::Decimal;

pub const BPS_DENOMINATOR: u64 = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    Down,
    Up,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MathError {
    #[error("division by zero")]
    DivisionByZero,

    #[error("arithmetic overflow in {0}")]
    Overflow(&'static str),

    #[error("arithmetic underflow in {0}")]
    Underflow(&'static str),

    #[error("negative value where unsigned expected: {0}")]
    Negative(&'static str),
}

// 2.1: a * b / den with a full-width product
pub fn mul_div(a: U256, b: U256, den: U256, rounding: Rounding) -> Result<U256, MathError> {
    if den.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let prod = U512::from(a) * U512::from(b);
    let den = U512::from(den);
    let mut q = prod / den;
    if rounding == Rounding::Up && !(prod % den).is_zero() {
        q += U512::one();
    }
    U256::try_from(q).map_err(|_| MathError::Overflow("mul_div"))
}

pub fn div_round(n: U256, d: U256, rounding: Rounding) -> Result<U256, MathError> {
    if d.is_zero() {
        return Err(MathError::DivisionByZero);
    }
    let q = n / d;
    match rounding {
        Rounding::Up if !(n % d).is_zero() => Ok(q + U256::one()),
        _ => Ok(q),
    }
}

/// ceil(a / b) for magnitudes. used for flip and boundary times.
pub fn div_ceil_u128(a: u128, b: u128) -> Result<u128, MathError> {
    if b == 0 {
        return Err(MathError::DivisionByZero);
    }
    let q = a / b;
    Ok(if a % b == 0 { q } else { q + 1 })
}

pub fn u256_to_u128(v: U256, context: &'static str) -> Result<u128, MathError> {
    if v > U256::from(u128::MAX) {
        return Err(MathError::Overflow(context));
    }
    Ok(v.low_u128())
}

pub fn rate_to_u256(rate: Rate, context: &'static str) -> Result<U256, MathError> {
    if rate.is_negative() {
        return Err(MathError::Negative(context));
    }
    Ok(U256::from(rate.unsigned_abs()))
}

// 2.2: percentages. bps are integer, fractions are Rate (18dp)
pub fn apply_bps(amount: U256, bps: u32) -> Result<U256, MathError> {
    mul_div(amount, U256::from(bps), U256::from(BPS_DENOMINATOR), Rounding::Down)
}

pub fn apply_fraction(amount: U256, fraction: Rate, rounding: Rounding) -> Result<U256, MathError> {
    mul_div(amount, rate_to_u256(fraction, "apply_fraction")?, rate_unit(), rounding)
}

/// x^exp where x is expressed in `unit` scale; the result stays in the same scale.
pub fn pow_scaled(x: U256, exp: u32, unit: U256) -> Result<U256, MathError> {
    let mut result = unit;
    for _ in 0..exp {
        result = mul_div(result, x, unit, Rounding::Down)?;
    }
    Ok(result)
}

// 2.3: tokens <-> usd. price is usd per whole token, base_unit is 10^decimals
pub fn to_usd(amount: TokenAmount, price: Price, base_unit: U256) -> Result<Usd, MathError> {
    mul_div(amount, price.raw(), base_unit, Rounding::Down).map(Usd)
}

pub fn to_tokens(
    usd: Usd,
    price: Price,
    base_unit: U256,
    rounding: Rounding,
) -> Result<TokenAmount, MathError> {
    mul_div(usd.raw(), base_unit, price.raw(), rounding)
}

// 2.4: decimal bridges. settings files and logs speak human numbers.
pub fn decimal_to_usd(value: Decimal) -> Result<Usd, MathError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(MathError::Negative("decimal_to_usd"));
    }
    let mantissa = U256::from(value.mantissa().unsigned_abs());
    let scale = value.scale() as usize;
    let raw = mantissa
        .checked_mul(U256::exp10(USD_DECIMALS - scale))
        .ok_or(MathError::Overflow("decimal_to_usd"))?;
    Ok(Usd(raw))
}

pub fn decimal_to_rate(value: Decimal) -> Result<Rate, MathError> {
    let mantissa = value.mantissa();
    let scale = value.scale() as usize;
    let raw = if scale <= RATE_DECIMALS {
        mantissa
            .checked_mul(10i128.pow((RATE_DECIMALS - scale) as u32))
            .ok_or(MathError::Overflow("decimal_to_rate"))?
    } else {
        mantissa / 10i128.pow((scale - RATE_DECIMALS) as u32)
    };
    Ok(Rate(raw))
}

/// Lossy, 8 decimal places. display only.
pub fn usd_to_decimal(value: Usd) -> Decimal {
    let shown = value.raw() / U256::exp10(USD_DECIMALS - 8);
    if shown > U256::from(i128::MAX as u128) {
        return Decimal::MAX;
    }
    Decimal::try_from_i128_with_scale(shown.low_u128() as i128, 8).unwrap_or(Decimal::MAX)
}

pub fn rate_to_decimal(value: Rate) -> Decimal {
    Decimal::try_from_i128_with_scale(value.raw(), RATE_DECIMALS as u32).unwrap_or(
        if value.is_negative() {
            Decimal::MIN
        } else {
            Decimal::MAX
        },
    )
}

/// Whole-token amount to base units, e.g. `tokens(3, 18)` = 3e18.
pub fn tokens(whole: u64, decimals: usize) -> TokenAmount {
    U256::from(whole) * U256::exp10(decimals)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::usd_unit;
    use rust_decimal_macros::dec;

    #[test]
    fn div_round_directions() {
        let seven = U256::from(7u64);
        let two = U256::from(2u64);
        assert_eq!(div_round(seven, two, Rounding::Down).unwrap(), U256::from(3u64));
        assert_eq!(div_round(seven, two, Rounding::Up).unwrap(), U256::from(4u64));
        assert_eq!(div_round(U256::from(8u64), two, Rounding::Up).unwrap(), U256::from(4u64));
        assert_eq!(div_round(seven, U256::zero(), Rounding::Up), Err(MathError::DivisionByZero));
    }

    #[test]
    fn mul_div_rounds_both_ways() {
        let a = U256::from(10u64);
        let b = U256::from(10u64);
        let d = U256::from(3u64);
        assert_eq!(mul_div(a, b, d, Rounding::Down).unwrap(), U256::from(33u64));
        assert_eq!(mul_div(a, b, d, Rounding::Up).unwrap(), U256::from(34u64));
        assert_eq!(mul_div(a, b, U256::from(4u64), Rounding::Up).unwrap(), U256::from(25u64));
    }

    #[test]
    fn mul_div_survives_wide_products() {
        // (1e40 * 1e40) / 1e40 overflows U256 in the product but not in the result
        let big = U256::exp10(40);
        assert_eq!(mul_div(big, big, big, Rounding::Down).unwrap(), big);
    }

    #[test]
    fn mul_div_errors() {
        assert_eq!(
            mul_div(U256::one(), U256::one(), U256::zero(), Rounding::Down),
            Err(MathError::DivisionByZero)
        );
        assert_eq!(
            mul_div(U256::MAX, U256::MAX, U256::one(), Rounding::Down),
            Err(MathError::Overflow("mul_div"))
        );
    }

    #[test]
    fn ceiling_division() {
        assert_eq!(div_ceil_u128(10, 5).unwrap(), 2);
        assert_eq!(div_ceil_u128(11, 5).unwrap(), 3);
        assert_eq!(div_ceil_u128(0, 5).unwrap(), 0);
        assert!(div_ceil_u128(1, 0).is_err());
    }

    #[test]
    fn bps_and_fractions() {
        let amount = U256::from(1_000_000u64);
        assert_eq!(apply_bps(amount, 10).unwrap(), U256::from(1_000u64)); // 0.1%
        let half = Rate::from_fraction(1, 2);
        assert_eq!(apply_fraction(amount, half, Rounding::Down).unwrap(), U256::from(500_000u64));
        assert!(apply_fraction(amount, Rate(-1), Rounding::Down).is_err());
    }

    #[test]
    fn pow_keeps_scale() {
        let unit = usd_unit();
        let two = U256::from(2u64) * unit;
        assert_eq!(pow_scaled(two, 3, unit).unwrap(), U256::from(8u64) * unit);
        assert_eq!(pow_scaled(two, 0, unit).unwrap(), unit);
    }

    #[test]
    fn token_usd_conversion() {
        // 2 ETH at $3000 = $6000
        let amount = tokens(2, 18);
        let price = Usd::from_whole(3_000);
        let base = U256::exp10(18);
        let usd = to_usd(amount, price, base).unwrap();
        assert_eq!(usd, Usd::from_whole(6_000));
        assert_eq!(to_tokens(usd, price, base, Rounding::Down).unwrap(), amount);
    }

    #[test]
    fn decimal_bridges() {
        assert_eq!(decimal_to_usd(dec!(1.5)).unwrap().raw(), U256::from(15u64) * U256::exp10(29));
        assert_eq!(decimal_to_rate(dec!(0.03)).unwrap(), Rate::from_fraction(3, 100));
        assert_eq!(decimal_to_rate(dec!(-0.5)).unwrap(), Rate::from_fraction(-1, 2));
        assert!(decimal_to_usd(dec!(-1)).is_err());
        assert_eq!(usd_to_decimal(Usd::from_whole(42)), dec!(42));
        assert_eq!(rate_to_decimal(Rate::from_fraction(9, 1000)), dec!(0.009));
    }
}
