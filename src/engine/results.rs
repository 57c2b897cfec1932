// 14.4: what a request returns and why it can fail.

use crate::borrowing::BorrowingAccrual;
use crate::config::ConfigError;
use crate::funding::FundingRecompute;
use crate::invariant::{InvariantError, MutationKind, SettlementBreakdown};
use crate::math::MathError;
use crate::oracle::OracleError;
use crate::position::{Position, PositionKey};
use crate::price_impact::PriceImpactError;
use crate::types::{AssetId, MarketId, Price, Side, SignedUsd, TokenAmount, Usd};

#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub key: PositionKey,
    pub kind: MutationKind,
    pub size_delta_usd: Usd,
    /// None for collateral-only edits
    pub execution_price: Option<Price>,
    pub price_impact: SignedUsd,
    pub breakdown: SettlementBreakdown,
    /// Collateral to send back to the owner
    pub payout: TokenAmount,
    /// Position after the mutation, None once fully closed
    pub position: Option<Position>,
}

impl ExecutionResult {
    pub fn closed(&self) -> bool {
        self.position.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct AccrualResult {
    pub funding: FundingRecompute,
    pub borrowing: BorrowingAccrual,
    /// indices advanced or rate/velocity repriced
    pub funding_changed: bool,
    pub borrowing_changed: bool,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("Market {0:?} not found")]
    MarketNotFound(MarketId),

    #[error("Market {0:?} already exists")]
    MarketExists(MarketId),

    #[error("Position {0:?} not found")]
    PositionNotFound(PositionKey),

    #[error("Position {0:?} already exists")]
    PositionExists(PositionKey),

    #[error("Asset {0:?} is not a collateral token of this market")]
    InvalidCollateral(AssetId),

    #[error("Size or amount must be non-zero")]
    ZeroAmount,

    #[error("Insufficient collateral: required {required}, available {available}")]
    InsufficientCollateral {
        required: TokenAmount,
        available: TokenAmount,
    },

    #[error("Leverage exceeded: size {size_usd} against collateral {collateral_usd}, max {max_leverage}x")]
    LeverageExceeded {
        size_usd: Usd,
        collateral_usd: Usd,
        max_leverage: u32,
    },

    #[error("Reserve exceeded on {side}: open interest {open_interest}, capacity {capacity}")]
    ReserveExceeded {
        side: Side,
        open_interest: Usd,
        capacity: Usd,
    },

    #[error("Position {0:?} is not in profit, ADL does not apply")]
    AdlNotProfitable(PositionKey),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Price impact error: {0}")]
    PriceImpact(#[from] PriceImpactError),

    #[error("Invariant violated: {0}")]
    Invariant(#[from] InvariantError),

    #[error("Math error: {0}")]
    Math(#[from] MathError),
}
