// 1.0: all the primitives live here. ids, sides, timestamps and the fixed-point units.
// every unit domain gets its own type so a rate can never be added to a usd amount.
//   Usd        30 decimals, unsigned. usd values and prices (usd per whole token)
//   SignedUsd  30 decimals, sign + magnitude. pnl, price impact, skew
//   Rate       18 decimals, signed. funding rate, velocity, fractions, factors
//   TokenAmount / FeeIndex  raw U256. token base units and 18dp per-unit fee indices

use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

pub const USD_DECIMALS: usize = 30;
pub const RATE_DECIMALS: usize = 18;
pub const SECONDS_PER_DAY: u64 = 86_400;

/// 1e18 as i128, the `Rate` scale.
pub const RATE_UNIT: i128 = 1_000_000_000_000_000_000;

/// Token amount in the token's base units (wei, satoshi...).
pub type TokenAmount = U256;

/// Cumulative fee per unit of position size, 18 decimals.
pub type FeeIndex = U256;

pub fn usd_unit() -> U256 {
    U256::exp10(USD_DECIMALS)
}

pub fn rate_unit() -> U256 {
    U256::exp10(RATE_DECIMALS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarketId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetId(pub u32);

/// Key of a conditional order (stop loss / take profit) attached to a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderKey(pub u64);

// Long = profit when price goes up. Short = profit when price goes down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn is_long(&self) -> bool {
        matches!(self, Side::Long)
    }

    pub fn opposite(&self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

// 1.1: usd amount, 30 decimals. also used for prices: usd per whole token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Usd(pub U256);

/// Price of one whole token in USD (30 decimals).
pub type Price = Usd;

impl Usd {
    pub const ZERO: Usd = Usd(U256([0; 4]));

    pub fn new(raw: U256) -> Self {
        Self(raw)
    }

    /// Whole dollars, e.g. `Usd::from_whole(50_000)` = $50,000.
    pub fn from_whole(dollars: u64) -> Self {
        Self(U256::from(dollars) * usd_unit())
    }

    pub fn raw(&self) -> U256 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(&self, other: Usd) -> Option<Usd> {
        self.0.checked_add(other.0).map(Usd)
    }

    pub fn checked_sub(&self, other: Usd) -> Option<Usd> {
        self.0.checked_sub(other.0).map(Usd)
    }

    pub fn saturating_sub(&self, other: Usd) -> Usd {
        Usd(self.0.saturating_sub(other.0))
    }

    pub fn abs_diff(&self, other: Usd) -> Usd {
        if self.0 >= other.0 {
            Usd(self.0 - other.0)
        } else {
            Usd(other.0 - self.0)
        }
    }
}

impl fmt::Display for Usd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::math::usd_to_decimal(*self))
    }
}

// 1.2: signed usd. sign + magnitude, negative zero is normalized away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SignedUsd {
    negative: bool,
    magnitude: Usd,
}

impl SignedUsd {
    pub const ZERO: SignedUsd = SignedUsd {
        negative: false,
        magnitude: Usd::ZERO,
    };

    pub fn positive(magnitude: Usd) -> Self {
        Self {
            negative: false,
            magnitude,
        }
    }

    pub fn negative(magnitude: Usd) -> Self {
        Self {
            negative: !magnitude.is_zero(),
            magnitude,
        }
    }

    pub fn from_sign(negative: bool, magnitude: Usd) -> Self {
        if negative {
            Self::negative(magnitude)
        } else {
            Self::positive(magnitude)
        }
    }

    /// `a - b` for unsigned inputs.
    pub fn difference(a: Usd, b: Usd) -> Self {
        if a >= b {
            Self::positive(Usd(a.0 - b.0))
        } else {
            Self::negative(Usd(b.0 - a.0))
        }
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn is_positive(&self) -> bool {
        !self.negative && !self.magnitude.is_zero()
    }

    pub fn is_zero(&self) -> bool {
        self.magnitude.is_zero()
    }

    pub fn abs(&self) -> Usd {
        self.magnitude
    }

    pub fn negated(&self) -> Self {
        Self::from_sign(!self.negative, self.magnitude)
    }

    pub fn checked_add(&self, other: SignedUsd) -> Option<SignedUsd> {
        match (self.negative, other.negative) {
            (false, false) => self.magnitude.checked_add(other.magnitude).map(Self::positive),
            (true, true) => self.magnitude.checked_add(other.magnitude).map(Self::negative),
            (false, true) => Some(Self::difference(self.magnitude, other.magnitude)),
            (true, false) => Some(Self::difference(other.magnitude, self.magnitude)),
        }
    }

    pub fn checked_sub(&self, other: SignedUsd) -> Option<SignedUsd> {
        self.checked_add(other.negated())
    }
}

impl PartialOrd for SignedUsd {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SignedUsd {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.negative, other.negative) {
            (false, false) => self.magnitude.cmp(&other.magnitude),
            (true, true) => other.magnitude.cmp(&self.magnitude),
            (false, true) => Ordering::Greater,
            (true, false) => Ordering::Less,
        }
    }
}

impl fmt::Display for SignedUsd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-{}", self.magnitude)
        } else {
            write!(f, "{}", self.magnitude)
        }
    }
}

// 1.3: signed 18-decimal rate. funding rate, velocity, skew fraction, factors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Rate(pub i128);

impl Rate {
    pub const ZERO: Rate = Rate(0);
    pub const ONE: Rate = Rate(RATE_UNIT);

    pub fn new(raw: i128) -> Self {
        Self(raw)
    }

    /// `Rate::from_fraction(9, 1000)` = 0.009.
    pub fn from_fraction(numerator: i128, denominator: i128) -> Self {
        Self(numerator * RATE_UNIT / denominator)
    }

    pub fn raw(&self) -> i128 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_positive(&self) -> bool {
        self.0 > 0
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }

    pub fn unsigned_abs(&self) -> u128 {
        self.0.unsigned_abs()
    }

    pub fn clamp(self, min: Rate, max: Rate) -> Rate {
        Rate(self.0.max(min.0).min(max.0))
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", crate::math::rate_to_decimal(*self))
    }
}

// 1.4: second-resolution timestamp. market accounting never needs sub-second precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    pub fn now() -> Self {
        Self(chrono::Utc::now().timestamp().max(0) as u64)
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// seconds from `earlier` to `self`, zero if `earlier` is in the future.
    pub fn seconds_since(&self, earlier: Timestamp) -> u64 {
        self.0.saturating_sub(earlier.0)
    }

    pub fn plus_secs(&self, secs: u64) -> Self {
        Self(self.0.saturating_add(secs))
    }
}
