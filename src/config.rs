// 12.0 config.rs: market settings as humans write them. decimals, per-day rates.
// 12.1 converts to the fixed-point MarketConfig the engines run on, 12.2 presets.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::market::MarketConfig;
use crate::math::{decimal_to_rate, decimal_to_usd, MathError};
use crate::types::{AssetId, MarketId, Rate, SECONDS_PER_DAY};

pub const BTC: AssetId = AssetId(1);
pub const ETH: AssetId = AssetId(2);
pub const USDC: AssetId = AssetId(3);

// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("funding bounds must satisfy min <= 0 <= max (min {min}, max {max})")]
    InvalidFundingBounds { min: Rate, max: Rate },

    #[error("skew scale must be positive")]
    InvalidSkewScale,

    #[error("{name} must be in 1..={max}, got {value}", max = crate::market::MAX_EXPONENT)]
    InvalidExponent { name: &'static str, value: u32 },

    #[error("{name} must not be negative, got {value}")]
    NegativeFactor { name: &'static str, value: Rate },

    #[error("max leverage must be at least 1, got {0}")]
    InvalidLeverage(u32),

    #[error("reserve factor must be in (0, 1], got {0}")]
    InvalidReserveFactor(Rate),

    #[error("position fee too high (>10%): {0} bps")]
    FeeTooHigh(u32),

    #[error("settings parse error: {0}")]
    Parse(String),

    #[error("settings conversion: {0}")]
    Conversion(#[from] MathError),
}

/** 9.0: one market's settings. rates are per day, factors are plain fractions */
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSettings {
    pub id: MarketId,
    // Market symbol (e.g. "BTC-PERP")
    pub name: String,
    pub index_asset: AssetId,
    pub long_asset: AssetId,
    pub short_asset: AssetId,
    // Skew in USD at which funding velocity maxes out
    pub skew_scale_usd: Decimal,
    // How far the daily funding rate can move in one day
    pub max_funding_velocity_per_day: Decimal,
    // Skew fraction below which the rate holds still
    pub funding_velocity_clamp: Decimal,
    pub min_funding_rate_per_day: Decimal,
    pub max_funding_rate_per_day: Decimal,
    pub borrowing_factor_per_day: Decimal,
    pub borrowing_exponent: u32,
    pub price_impact_exponent: u32,
    pub positive_impact_factor: Decimal,
    pub negative_impact_factor: Decimal,
    pub max_leverage: u32,
    pub reserve_factor: Decimal,
    // Trading fee in basis points
    pub position_fee_bps: u32,
}

impl MarketSettings {
    // 12.2: presets
    pub fn btc_perp() -> Self {
        Self {
            id: MarketId(1),
            name: "BTC-PERP".to_string(),
            index_asset: BTC,
            long_asset: BTC,
            short_asset: USDC,
            skew_scale_usd: dec!(100000000),
            max_funding_velocity_per_day: dec!(0.03),
            funding_velocity_clamp: dec!(0.01),
            min_funding_rate_per_day: dec!(-0.01),
            max_funding_rate_per_day: dec!(0.01),
            borrowing_factor_per_day: dec!(0.0005),
            borrowing_exponent: 1,
            price_impact_exponent: 2,
            positive_impact_factor: dec!(0.0000000005),
            negative_impact_factor: dec!(0.000000001),
            max_leverage: 50,
            reserve_factor: dec!(0.8),
            position_fee_bps: 5, // 0.05%
        }
    }

    pub fn eth_perp() -> Self {
        Self {
            id: MarketId(2),
            name: "ETH-PERP".to_string(),
            index_asset: ETH,
            long_asset: ETH,
            short_asset: USDC,
            skew_scale_usd: dec!(50000000),
            max_funding_velocity_per_day: dec!(0.04),
            borrowing_factor_per_day: dec!(0.0006),
            positive_impact_factor: dec!(0.000000001),
            negative_impact_factor: dec!(0.000000002),
            ..Self::btc_perp()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let settings: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    // Validate the settings for internal consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.to_market_config().map(|_| ())
    }

    // 12.1: per-day funding becomes per-second: rates / 86400, velocity / 86400^2
    pub fn to_market_config(&self) -> Result<MarketConfig, ConfigError> {
        let day = Decimal::from(SECONDS_PER_DAY);
        let per_second = |value: Decimal| -> Result<Rate, ConfigError> {
            Ok(decimal_to_rate(value / day)?)
        };

        let config = MarketConfig {
            id: self.id,
            name: self.name.clone(),
            index_asset: self.index_asset,
            long_asset: self.long_asset,
            short_asset: self.short_asset,
            skew_scale: decimal_to_usd(self.skew_scale_usd)?,
            max_funding_velocity: decimal_to_rate(self.max_funding_velocity_per_day / day / day)?,
            funding_velocity_clamp: decimal_to_rate(self.funding_velocity_clamp)?,
            min_funding_rate: per_second(self.min_funding_rate_per_day)?,
            max_funding_rate: per_second(self.max_funding_rate_per_day)?,
            borrowing_factor: decimal_to_rate(self.borrowing_factor_per_day)?,
            borrowing_exponent: self.borrowing_exponent,
            price_impact_exponent: self.price_impact_exponent,
            positive_impact_factor: decimal_to_rate(self.positive_impact_factor)?,
            negative_impact_factor: decimal_to_rate(self.negative_impact_factor)?,
            max_leverage: self.max_leverage,
            reserve_factor: decimal_to_rate(self.reserve_factor)?,
            position_fee_bps: self.position_fee_bps,
        };
        config.validate()?;
        Ok(config)
    }
}
