//! Market configuration and state.
//!
//! A market is one index asset with its own funding, borrowing, open interest
//! and impact pool. Markets never share state, so every engine call works on
//! exactly one `MarketState` passed by reference.

use crate::borrowing::BorrowingState;
use crate::config::ConfigError;
use crate::funding::FundingState;
use crate::math::MathError;
use crate::types::{AssetId, MarketId, Rate, Side, SignedUsd, Timestamp, Usd};
use serde::{Deserialize, Serialize};

/// Largest exponent accepted for the borrowing and impact curves.
pub const MAX_EXPONENT: u32 = 4;

/// Static market configuration (immutable after creation).
///
/// Funding values are per second: `min_funding_rate`/`max_funding_rate` are
/// fractions of size per second and `max_funding_velocity` is how far the
/// rate may move per second. `borrowing_factor` is a fraction per day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    pub id: MarketId,
    /// Human-readable name (e.g., "ETH-PERP")
    pub name: String,
    pub index_asset: AssetId,
    /// Collateral backing longs
    pub long_asset: AssetId,
    /// Collateral backing shorts
    pub short_asset: AssetId,
    /// Skew at which the funding velocity saturates
    pub skew_scale: Usd,
    pub max_funding_velocity: Rate,
    /// Proportional skew below which the funding rate stops drifting
    pub funding_velocity_clamp: Rate,
    pub min_funding_rate: Rate,
    pub max_funding_rate: Rate,
    pub borrowing_factor: Rate,
    pub borrowing_exponent: u32,
    pub price_impact_exponent: u32,
    pub positive_impact_factor: Rate,
    pub negative_impact_factor: Rate,
    /// Whole multiple, 50 = 50x
    pub max_leverage: u32,
    /// Fraction of the allocated open interest that positions may use
    pub reserve_factor: Rate,
    /// Trading fee on size delta, in basis points
    pub position_fee_bps: u32,
}

impl MarketConfig {
    /// Configuration errors are raised here, before any state is created.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_funding_rate > Rate::ZERO || self.max_funding_rate < Rate::ZERO {
            return Err(ConfigError::InvalidFundingBounds {
                min: self.min_funding_rate,
                max: self.max_funding_rate,
            });
        }
        if self.skew_scale.is_zero() {
            return Err(ConfigError::InvalidSkewScale);
        }
        for (name, value) in [
            ("borrowing_exponent", self.borrowing_exponent),
            ("price_impact_exponent", self.price_impact_exponent),
        ] {
            if value == 0 || value > MAX_EXPONENT {
                return Err(ConfigError::InvalidExponent { name, value });
            }
        }
        for (name, value) in [
            ("max_funding_velocity", self.max_funding_velocity),
            ("funding_velocity_clamp", self.funding_velocity_clamp),
            ("borrowing_factor", self.borrowing_factor),
            ("positive_impact_factor", self.positive_impact_factor),
            ("negative_impact_factor", self.negative_impact_factor),
        ] {
            if value < Rate::ZERO {
                return Err(ConfigError::NegativeFactor { name, value });
            }
        }
        if self.max_leverage == 0 {
            return Err(ConfigError::InvalidLeverage(self.max_leverage));
        }
        if self.reserve_factor <= Rate::ZERO || self.reserve_factor > Rate::ONE {
            return Err(ConfigError::InvalidReserveFactor(self.reserve_factor));
        }
        if self.position_fee_bps > 1_000 {
            return Err(ConfigError::FeeTooHigh(self.position_fee_bps));
        }
        Ok(())
    }
}

/// Open interest per side plus the allocation ceiling supplied by the
/// liquidity-allocation collaborator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenInterest {
    pub long_usd: Usd,
    pub short_usd: Usd,
    pub max_allocated_long_usd: Usd,
    pub max_allocated_short_usd: Usd,
}

impl OpenInterest {
    pub fn side(&self, side: Side) -> Usd {
        match side {
            Side::Long => self.long_usd,
            Side::Short => self.short_usd,
        }
    }

    pub fn max_allocated(&self, side: Side) -> Usd {
        match side {
            Side::Long => self.max_allocated_long_usd,
            Side::Short => self.max_allocated_short_usd,
        }
    }

    /// long - short. positive = long heavy
    pub fn skew(&self) -> SignedUsd {
        SignedUsd::difference(self.long_usd, self.short_usd)
    }

    pub fn increase(&mut self, side: Side, amount: Usd) -> Result<(), MathError> {
        let slot = self.side_mut(side);
        *slot = slot.checked_add(amount).ok_or(MathError::Overflow("open_interest"))?;
        Ok(())
    }

    pub fn decrease(&mut self, side: Side, amount: Usd) -> Result<(), MathError> {
        let slot = self.side_mut(side);
        *slot = slot.checked_sub(amount).ok_or(MathError::Underflow("open_interest"))?;
        Ok(())
    }

    fn side_mut(&mut self, side: Side) -> &mut Usd {
        match side {
            Side::Long => &mut self.long_usd,
            Side::Short => &mut self.short_usd,
        }
    }
}

/// USD available to pay out favorable price impact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImpactPool {
    pub balance: Usd,
}

/// Dynamic market state (changes on every trade or poke)
#[derive(Debug, Clone)]
pub struct MarketState {
    pub config: MarketConfig,
    pub funding: FundingState,
    pub borrowing: BorrowingState,
    pub open_interest: OpenInterest,
    pub impact_pool: ImpactPool,
    pub created_at: Timestamp,
}

impl MarketState {
    pub fn new(config: MarketConfig, timestamp: Timestamp) -> Self {
        Self {
            config,
            funding: FundingState::new(timestamp),
            borrowing: BorrowingState::new(timestamp),
            open_interest: OpenInterest::default(),
            impact_pool: ImpactPool::default(),
            created_at: timestamp,
        }
    }

    pub fn id(&self) -> MarketId {
        self.config.id
    }
}
