// perps-accounting: accounting core of a perpetual futures protocol.
// funding, borrowing, price impact, pnl and a per-mutation invariant check.
// all computation is deterministic fixed point with no external I/O.
//
// file map (search X.0 for structs, X.1+ for logic):
//   1.x  types.rs: ids, sides, timestamps, Usd / SignedUsd / Rate units
//   2.x  math.rs: 512-bit mul_div, rounding, token/usd conversion
//   3.x  market.rs: market config, open interest, impact pool, market state
//   4.x  funding.rs: velocity-driven funding, crossing cases, settlement
//   5.x  position.rs: position record, fee snapshots, projections
//   6.x  borrowing.rs: utilization-curve borrowing fees
//   7.x  price_impact.rs: skew impact, impacted price, slippage
//   8.x  pricing.rs: weighted entry, pnl, collateral conversion
//   9.x  invariant.rs: collateral conservation and untouched-field checks
//   10.x oracle.rs: price provider trait and freshness checks
//   11.x store.rs: position storage keyed by market, owner, side
//   12.x config.rs: human-readable market settings and presets
//   13.x events.rs: committed state changes for audit
//   14.x engine/: orchestrator: requests, accrual, mutations, commit
//   14.1 engine/core.rs: execute, poke, event log
//   14.2 engine/accrual.rs: funding and borrowing catch-up
//   14.3 engine/positions.rs: increase, decrease, adl, collateral edits
//   14.4 engine/results.rs: results and errors

// accounting modules
pub mod borrowing;
pub mod funding;
pub mod invariant;
pub mod market;
pub mod math;
pub mod position;
pub mod price_impact;
pub mod pricing;
pub mod types;

// orchestration and collaborators
pub mod config;
pub mod engine;
pub mod events;
pub mod oracle;
pub mod store;

// re exports for convenience
pub use borrowing::{BorrowingAccrual, BorrowingState};
pub use config::{ConfigError, MarketSettings};
pub use engine::{
    AccrualResult, Engine, EngineConfig, EngineError, ExecutionResult, Request, RequestKind,
};
pub use events::{Event, EventId, EventPayload};
pub use funding::{CrossingCase, FundingRecompute, FundingState};
pub use invariant::{InvariantError, MutationKind, SettlementBreakdown};
pub use market::{ImpactPool, MarketConfig, MarketState, OpenInterest};
pub use math::{MathError, Rounding};
pub use oracle::{OracleBook, OracleError, OraclePrice, PriceProvider};
pub use position::{Position, PositionKey};
pub use price_impact::{PriceImpactError, TradeDirection};
pub use store::PositionStore;
pub use types::*;
