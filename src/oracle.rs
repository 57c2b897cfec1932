// 10.0: oracle prices
//
// The engine never trusts a price it did not just ask for. Anything that can
// answer `get_price` (Pyth, Chainlink, a test book) implements `PriceProvider`;
// `OracleBook` is the in-memory implementation with a freshness window.

use crate::math::{mul_div, Rounding};
use crate::types::{rate_unit, AssetId, Price, Rate, Timestamp, Usd};
use primitive_types::U256;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single price observation for one asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OraclePrice {
    /// USD per whole token, 30 decimals
    pub price: Price,
    /// Confidence interval (if provided by source like Pyth)
    pub confidence: Usd,
    /// 10^decimals of the token
    pub base_unit: U256,
    pub published_at: Timestamp,
}

impl OraclePrice {
    pub fn new(price: Price, decimals: usize, published_at: Timestamp) -> Self {
        Self {
            price,
            confidence: Usd::ZERO,
            base_unit: U256::exp10(decimals),
            published_at,
        }
    }

    pub fn with_confidence(mut self, confidence: Usd) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn age(&self, now: Timestamp) -> u64 {
        now.seconds_since(self.published_at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OracleError {
    #[error("no price for asset {0:?}")]
    PriceNotFound(AssetId),

    #[error("price for asset {asset:?} is {age}s old, max {max_age}s")]
    StalePrice { asset: AssetId, age: u64, max_age: u64 },

    #[error("invalid price for asset {0:?}")]
    InvalidPrice(AssetId),

    #[error("confidence interval too wide for asset {0:?}")]
    ConfidenceTooWide(AssetId),
}

pub trait PriceProvider {
    /// Fresh price for `asset` as of `now`, or why there isn't one.
    fn get_price(&self, asset: AssetId, now: Timestamp) -> Result<OraclePrice, OracleError>;
}

/// Latest price per asset with a staleness window
#[derive(Debug, Clone)]
pub struct OracleBook {
    prices: HashMap<AssetId, OraclePrice>,
    max_age_secs: u64,
    /// confidence / price above this is rejected
    max_confidence_ratio: Option<Rate>,
}

impl OracleBook {
    pub fn new(max_age_secs: u64) -> Self {
        Self {
            prices: HashMap::new(),
            max_age_secs,
            max_confidence_ratio: None,
        }
    }

    pub fn with_max_confidence_ratio(mut self, ratio: Rate) -> Self {
        self.max_confidence_ratio = Some(ratio);
        self
    }

    pub fn set_price(&mut self, asset: AssetId, price: OraclePrice) {
        self.prices.insert(asset, price);
    }

    pub fn remove_price(&mut self, asset: AssetId) -> Option<OraclePrice> {
        self.prices.remove(&asset)
    }

    pub fn max_age_secs(&self) -> u64 {
        self.max_age_secs
    }
}

impl PriceProvider for OracleBook {
    fn get_price(&self, asset: AssetId, now: Timestamp) -> Result<OraclePrice, OracleError> {
        let price = self
            .prices
            .get(&asset)
            .copied()
            .ok_or(OracleError::PriceNotFound(asset))?;

        if price.price.is_zero() || price.base_unit.is_zero() {
            return Err(OracleError::InvalidPrice(asset));
        }

        let age = price.age(now);
        if age > self.max_age_secs {
            return Err(OracleError::StalePrice {
                asset,
                age,
                max_age: self.max_age_secs,
            });
        }

        if let Some(max_ratio) = self.max_confidence_ratio {
            let ratio = mul_div(price.confidence.raw(), rate_unit(), price.price.raw(), Rounding::Up)
                .map_err(|_| OracleError::InvalidPrice(asset))?;
            if ratio > U256::from(max_ratio.unsigned_abs()) {
                return Err(OracleError::ConfidenceTooWide(asset));
            }
        }

        Ok(price)
    }
}
