// 13.0: every committed state change produces an event. used for audit trails and
// notifying external systems. the EventPayload enum lists all event types.

use crate::funding::CrossingCase;
use crate::invariant::{MutationKind, SettlementBreakdown};
use crate::position::PositionKey;
use crate::types::{FeeIndex, MarketId, Price, Rate, SignedUsd, Timestamp, TokenAmount, Usd};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventId(pub u64);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: EventId,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(id: EventId, timestamp: Timestamp, payload: EventPayload) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    // Market accrual events
    FundingAccrued(FundingAccruedEvent),
    BorrowingAccrued(BorrowingAccruedEvent),
    ImpactPoolUpdated(ImpactPoolUpdatedEvent),

    // Position events
    PositionOpened(PositionChangeEvent),
    PositionIncreased(PositionChangeEvent),
    PositionDecreased(PositionChangeEvent),
    PositionClosed(PositionChangeEvent),
    CollateralChanged(PositionChangeEvent),
    AutoDeleveraged(PositionChangeEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FundingAccruedEvent {
    pub market_id: MarketId,
    pub long_fee_delta: FeeIndex,
    pub short_fee_delta: FeeIndex,
    pub funding_rate: Rate,
    pub funding_rate_velocity: Rate,
    pub case: CrossingCase,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BorrowingAccruedEvent {
    pub market_id: MarketId,
    pub long_fee_delta: FeeIndex,
    pub short_fee_delta: FeeIndex,
    pub long_rate: Rate,
    pub short_rate: Rate,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImpactPoolUpdatedEvent {
    pub market_id: MarketId,
    pub impact: SignedUsd,
    pub balance: Usd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionChangeEvent {
    pub key: PositionKey,
    pub kind: MutationKind,
    pub size_delta_usd: Usd,
    pub execution_price: Option<Price>,
    pub price_impact: SignedUsd,
    pub breakdown: SettlementBreakdown,
    pub size_after: TokenAmount,
    pub collateral_after: TokenAmount,
}

impl EventPayload {
    /// The position payload for a committed mutation.
    pub fn for_mutation(change: PositionChangeEvent, closed: bool) -> Self {
        match change.kind {
            _ if closed => EventPayload::PositionClosed(change),
            MutationKind::NewPosition => EventPayload::PositionOpened(change),
            MutationKind::Increase => EventPayload::PositionIncreased(change),
            MutationKind::Decrease => EventPayload::PositionDecreased(change),
            MutationKind::CollateralIncrease | MutationKind::CollateralDecrease => {
                EventPayload::CollateralChanged(change)
            }
            MutationKind::Adl => EventPayload::AutoDeleveraged(change),
        }
    }

    pub fn market_id(&self) -> MarketId {
        match self {
            EventPayload::FundingAccrued(e) => e.market_id,
            EventPayload::BorrowingAccrued(e) => e.market_id,
            EventPayload::ImpactPoolUpdated(e) => e.market_id,
            EventPayload::PositionOpened(e)
            | EventPayload::PositionIncreased(e)
            | EventPayload::PositionDecreased(e)
            | EventPayload::PositionClosed(e)
            | EventPayload::CollateralChanged(e)
            | EventPayload::AutoDeleveraged(e) => e.key.market,
        }
    }
}
