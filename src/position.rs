// 5.0: position record. size is in index-token base units, entry is a weighted
// average price and both fee snapshots remember the market index they were last
// settled against. 5.1 has the snapshots, 5.2 sizing helpers, 5.3 the
// projections used to prove a mutation left the other fields alone.

use crate::math::{to_usd, MathError};
use crate::types::{
    AccountId, AssetId, FeeIndex, MarketId, OrderKey, Price, Side, SignedUsd, Timestamp,
    TokenAmount, Usd,
};
use primitive_types::U256;
use serde::{Deserialize, Serialize};

/// One position per (market, owner, side).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PositionKey {
    pub market: MarketId,
    pub owner: AccountId,
    pub side: Side,
}

impl PositionKey {
    pub fn new(market: MarketId, owner: AccountId, side: Side) -> Self {
        Self { market, owner, side }
    }
}

// 5.1: settled-up-to markers plus fees waiting to hit collateral
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundingSnapshot {
    pub last_long_cumulative: FeeIndex,
    pub last_short_cumulative: FeeIndex,
    pub fees_earned: TokenAmount,
    pub fees_owed: TokenAmount,
}

impl FundingSnapshot {
    pub fn last_cumulative(&self, side: Side) -> FeeIndex {
        match side {
            Side::Long => self.last_long_cumulative,
            Side::Short => self.last_short_cumulative,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowingSnapshot {
    pub last_long_cumulative: FeeIndex,
    pub last_short_cumulative: FeeIndex,
    pub fees_owed: TokenAmount,
}

impl BorrowingSnapshot {
    pub fn last_cumulative(&self, side: Side) -> FeeIndex {
        match side {
            Side::Long => self.last_long_cumulative,
            Side::Short => self.last_short_cumulative,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub key: PositionKey,
    pub index_asset: AssetId,
    pub collateral_token: AssetId,
    pub collateral_amount: TokenAmount,
    pub size: TokenAmount,
    pub weighted_avg_entry_price: Price,
    pub funding: FundingSnapshot,
    pub borrowing: BorrowingSnapshot,
    /// Lifetime realized pnl in USD
    pub realized_pnl: SignedUsd,
    pub stop_loss_key: Option<OrderKey>,
    pub take_profit_key: Option<OrderKey>,
    pub opened_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Position {
    /// Empty position with snapshots pinned to the given market indices, so a
    /// fresh position owes nothing for time before it existed.
    pub fn open(
        key: PositionKey,
        index_asset: AssetId,
        collateral_token: AssetId,
        funding_index: (FeeIndex, FeeIndex),
        borrowing_index: (FeeIndex, FeeIndex),
        timestamp: Timestamp,
    ) -> Self {
        Self {
            key,
            index_asset,
            collateral_token,
            collateral_amount: U256::zero(),
            size: U256::zero(),
            weighted_avg_entry_price: Price::ZERO,
            funding: FundingSnapshot {
                last_long_cumulative: funding_index.0,
                last_short_cumulative: funding_index.1,
                ..FundingSnapshot::default()
            },
            borrowing: BorrowingSnapshot {
                last_long_cumulative: borrowing_index.0,
                last_short_cumulative: borrowing_index.1,
                ..BorrowingSnapshot::default()
            },
            realized_pnl: SignedUsd::ZERO,
            stop_loss_key: None,
            take_profit_key: None,
            opened_at: timestamp,
            updated_at: timestamp,
        }
    }

    pub fn side(&self) -> Side {
        self.key.side
    }

    pub fn is_long(&self) -> bool {
        self.key.side.is_long()
    }

    pub fn is_empty(&self) -> bool {
        self.size.is_zero()
    }

    // 5.2: usd value of the size at the entry price
    pub fn size_usd(&self, index_base_unit: U256) -> Result<Usd, MathError> {
        to_usd(self.size, self.weighted_avg_entry_price, index_base_unit)
    }

    /// true once every balance and pending fee is zero
    pub fn is_cleared(&self) -> bool {
        self.size.is_zero()
            && self.collateral_amount.is_zero()
            && self.weighted_avg_entry_price.is_zero()
            && self.funding.fees_owed.is_zero()
            && self.funding.fees_earned.is_zero()
            && self.borrowing.fees_owed.is_zero()
    }

    /// Full close. balances and pending fees go to zero; identity and the
    /// settled-up-to markers stay so the record can still be audited.
    pub fn clear(&mut self, timestamp: Timestamp) {
        self.collateral_amount = U256::zero();
        self.size = U256::zero();
        self.weighted_avg_entry_price = Price::ZERO;
        self.funding.fees_owed = U256::zero();
        self.funding.fees_earned = U256::zero();
        self.borrowing.fees_owed = U256::zero();
        self.updated_at = timestamp;
    }

    // 5.3: projections
    pub fn identity(&self) -> PositionIdentity {
        PositionIdentity {
            market: self.key.market,
            index_asset: self.index_asset,
            owner: self.key.owner,
            collateral_token: self.collateral_token,
            side: self.key.side,
            stop_loss_key: self.stop_loss_key,
            take_profit_key: self.take_profit_key,
        }
    }

    /// Fields a mutation must not touch. `with_sizing` adds size and entry
    /// price, for edits that only move collateral.
    pub fn untouched(&self, with_sizing: bool) -> UntouchedFields {
        UntouchedFields {
            identity: self.identity(),
            sizing: with_sizing.then_some((self.size, self.weighted_avg_entry_price)),
        }
    }
}

/// Fields that never change for the life of a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PositionIdentity {
    pub market: MarketId,
    pub index_asset: AssetId,
    pub owner: AccountId,
    pub collateral_token: AssetId,
    pub side: Side,
    pub stop_loss_key: Option<OrderKey>,
    pub take_profit_key: Option<OrderKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UntouchedFields {
    pub identity: PositionIdentity,
    pub sizing: Option<(TokenAmount, Price)>,
}
