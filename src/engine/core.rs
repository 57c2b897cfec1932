// 14.1 engine/core.rs: main engine. holds markets, positions, the oracle and the event log.
// every request runs on copies and is committed in one step at the end.

use super::accrual::accrue;
use super::config::EngineConfig;
use super::positions::{
    apply_collateral_change, apply_decrease, apply_increase, open_interest_after, settle_fees,
    CollateralChange, DecreaseMode, Prices, TradeContext,
};
use super::requests::{Request, RequestKind};
use super::results::{AccrualResult, EngineError, ExecutionResult};
use crate::config::MarketSettings;
use crate::events::{
    BorrowingAccruedEvent, Event, EventId, EventPayload, FundingAccruedEvent,
    ImpactPoolUpdatedEvent, PositionChangeEvent,
};
use crate::invariant::{validate_mutation, MutationRecord};
use crate::market::{MarketConfig, MarketState};
use crate::oracle::PriceProvider;
use crate::position::{Position, PositionKey};
use crate::store::PositionStore;
use crate::types::{MarketId, Side, SignedUsd, Timestamp, Usd};
use std::collections::HashMap;
use tracing::{info, warn};

/** 8.1: main engine struct. all state lives here */
#[derive(Debug)]
pub struct Engine<P: PriceProvider> {
    pub(super) config: EngineConfig,
    pub(super) oracle: P,
    pub(super) markets: HashMap<MarketId, MarketState>,
    pub(super) positions: PositionStore,
    pub(super) events: Vec<Event>,
    pub(super) next_event_id: u64,
    pub(super) current_time: Timestamp,
}

impl<P: PriceProvider> Engine<P> {
    pub fn new(config: EngineConfig, oracle: P) -> Self {
        Self {
            config,
            oracle,
            markets: HashMap::new(),
            positions: PositionStore::new(),
            events: Vec::new(),
            next_event_id: 1,
            current_time: Timestamp::from_secs(0),
        }
    }

    pub fn set_time(&mut self, timestamp: Timestamp) {
        self.current_time = timestamp;
    }

    pub fn time(&self) -> Timestamp {
        self.current_time
    }

    pub fn advance_time(&mut self, secs: u64) {
        self.current_time = self.current_time.plus_secs(secs);
    }

    pub fn oracle(&self) -> &P {
        &self.oracle
    }

    pub fn oracle_mut(&mut self) -> &mut P {
        &mut self.oracle
    }

    // config errors surface here, before any state exists
    pub fn add_market(&mut self, config: MarketConfig) -> Result<MarketId, EngineError> {
        config.validate()?;
        let market_id = config.id;
        if self.markets.contains_key(&market_id) {
            return Err(EngineError::MarketExists(market_id));
        }
        let state = MarketState::new(config, self.current_time);
        self.markets.insert(market_id, state);
        info!(market = market_id.0, "market added");
        Ok(market_id)
    }

    pub fn add_market_from_settings(&mut self, settings: &MarketSettings) -> Result<MarketId, EngineError> {
        let config = settings.to_market_config()?;
        self.add_market(config)
    }

    pub fn get_market(&self, market_id: MarketId) -> Option<&MarketState> {
        self.markets.get(&market_id)
    }

    /// Allocation ceilings pushed by the liquidity collaborator.
    pub fn set_max_allocated(
        &mut self,
        market_id: MarketId,
        long_usd: Usd,
        short_usd: Usd,
    ) -> Result<(), EngineError> {
        let market = self
            .markets
            .get_mut(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?;
        market.open_interest.max_allocated_long_usd = long_usd;
        market.open_interest.max_allocated_short_usd = short_usd;
        Ok(())
    }

    pub fn fund_impact_pool(&mut self, market_id: MarketId, amount: Usd) -> Result<(), EngineError> {
        let market = self
            .markets
            .get_mut(&market_id)
            .ok_or(EngineError::MarketNotFound(market_id))?;
        crate::price_impact::apply_to_pool(&mut market.impact_pool, SignedUsd::negative(amount))?;
        Ok(())
    }

    pub fn get_position(&self, key: &PositionKey) -> Option<&Position> {
        self.positions.get(key)
    }

    pub fn positions(&self) -> &PositionStore {
        &self.positions
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    // 14.1.1: one request, all or nothing
    pub fn execute(&mut self, request: Request) -> Result<ExecutionResult, EngineError> {
        let result = self.try_execute(&request);
        match &result {
            Ok(done) => info!(
                market = request.key.market.0,
                owner = request.key.owner.0,
                side = %request.key.side,
                kind = %done.kind,
                size_delta = %done.size_delta_usd,
                closed = done.closed(),
                "position mutation committed"
            ),
            Err(e) => warn!(
                market = request.key.market.0,
                owner = request.key.owner.0,
                side = %request.key.side,
                kind = %request.kind.mutation_kind(),
                error = %e,
                "request rejected"
            ),
        }
        result
    }

    fn try_execute(&mut self, request: &Request) -> Result<ExecutionResult, EngineError> {
        let now = self.current_time;
        let key = request.key;
        let kind = request.kind.mutation_kind();

        let mut market = self
            .markets
            .get(&key.market)
            .cloned()
            .ok_or(EngineError::MarketNotFound(key.market))?;
        let before = self.positions.get(&key).cloned();

        let collateral_token = match (&request.kind, &before) {
            (RequestKind::NewPosition { .. }, Some(_)) => return Err(EngineError::PositionExists(key)),
            (RequestKind::NewPosition { collateral_token, .. }, None) => {
                if *collateral_token != market.config.long_asset
                    && *collateral_token != market.config.short_asset
                {
                    return Err(EngineError::InvalidCollateral(*collateral_token));
                }
                *collateral_token
            }
            (_, Some(existing)) => existing.collateral_token,
            (_, None) => return Err(EngineError::PositionNotFound(key)),
        };

        let prices = Prices {
            index: self.oracle.get_price(market.config.index_asset, now)?,
            collateral: self.oracle.get_price(collateral_token, now)?,
        };

        let open_interest_after =
            open_interest_after(&market, &request.kind, key.side, before.as_ref(), &prices)?;
        let accrual = accrue(&mut market, &open_interest_after, now)?;

        let mut position = match &before {
            Some(existing) => existing.clone(),
            None => Position::open(
                key,
                market.config.index_asset,
                collateral_token,
                (
                    market.funding.cumulative_long_funding_fee,
                    market.funding.cumulative_short_funding_fee,
                ),
                (
                    market.borrowing.cumulative_long_borrow_fee,
                    market.borrowing.cumulative_short_borrow_fee,
                ),
                now,
            ),
        };
        let fees = settle_fees(&market, &mut position, &prices)?;
        let max_slippage = request.max_slippage.unwrap_or(self.config.default_max_slippage);
        let mut ctx = TradeContext {
            market: &mut market,
            prices: &prices,
            fees,
            now,
        };

        let transition = match &request.kind {
            RequestKind::NewPosition {
                collateral_in,
                size_delta_usd,
                stop_loss,
                take_profit,
                ..
            } => {
                position.stop_loss_key = *stop_loss;
                position.take_profit_key = *take_profit;
                apply_increase(&mut ctx, position, *collateral_in, *size_delta_usd, max_slippage)?
            }
            RequestKind::Increase {
                collateral_in,
                size_delta_usd,
            } => apply_increase(&mut ctx, position, *collateral_in, *size_delta_usd, max_slippage)?,
            RequestKind::Decrease {
                size_delta_usd,
                collateral_out,
            } => apply_decrease(
                &mut ctx,
                position,
                *size_delta_usd,
                DecreaseMode::Trader {
                    collateral_out: *collateral_out,
                    max_slippage,
                },
            )?,
            RequestKind::Adl { size_delta_usd } => {
                apply_decrease(&mut ctx, position, *size_delta_usd, DecreaseMode::Adl)?
            }
            RequestKind::CollateralIncrease { amount } => {
                apply_collateral_change(&mut ctx, position, CollateralChange::Deposit(*amount))?
            }
            RequestKind::CollateralDecrease { amount } => {
                apply_collateral_change(&mut ctx, position, CollateralChange::Withdraw(*amount))?
            }
        };

        validate_mutation(&MutationRecord {
            kind,
            before: before.as_ref(),
            after: &transition.after,
            breakdown: &transition.breakdown,
            funding: &market.funding,
            borrowing: &market.borrowing,
        })?;

        // 14.1.2: commit
        let market_id = market.id();
        let pool_balance = market.impact_pool.balance;
        self.markets.insert(market_id, market);
        let position = if transition.closed {
            self.positions.remove(&key);
            None
        } else {
            self.positions.upsert(transition.after.clone());
            Some(transition.after.clone())
        };

        self.emit_accrual(market_id, &accrual);
        if !transition.price_impact.is_zero() {
            self.emit_event(EventPayload::ImpactPoolUpdated(ImpactPoolUpdatedEvent {
                market_id,
                impact: transition.price_impact,
                balance: pool_balance,
            }));
        }
        self.emit_event(EventPayload::for_mutation(
            PositionChangeEvent {
                key,
                kind,
                size_delta_usd: transition.size_delta_usd,
                execution_price: transition.execution_price,
                price_impact: transition.price_impact,
                breakdown: transition.breakdown.clone(),
                size_after: transition.after.size,
                collateral_after: transition.after.collateral_amount,
            },
            transition.closed,
        ));

        Ok(ExecutionResult {
            key,
            kind,
            size_delta_usd: transition.size_delta_usd,
            execution_price: transition.execution_price,
            price_impact: transition.price_impact,
            payout: transition.breakdown.collateral_out,
            breakdown: transition.breakdown,
            position,
        })
    }

    /// Accrue funding and borrowing without a trade.
    pub fn poke(&mut self, market_id: MarketId) -> Result<AccrualResult, EngineError> {
        let mut market = self
            .markets
            .get(&market_id)
            .cloned()
            .ok_or(EngineError::MarketNotFound(market_id))?;
        let open_interest = market.open_interest.clone();
        let accrual = accrue(&mut market, &open_interest, self.current_time)?;
        self.markets.insert(market_id, market);
        self.emit_accrual(market_id, &accrual);
        Ok(accrual)
    }

    /// Open interest on one side, for collaborators that only need the number.
    pub fn open_interest(&self, market_id: MarketId, side: Side) -> Option<Usd> {
        self.markets.get(&market_id).map(|m| m.open_interest.side(side))
    }

    fn emit_accrual(&mut self, market_id: MarketId, accrual: &AccrualResult) {
        if accrual.funding_changed {
            self.emit_event(EventPayload::FundingAccrued(FundingAccruedEvent {
                market_id,
                long_fee_delta: accrual.funding.long_fee_delta,
                short_fee_delta: accrual.funding.short_fee_delta,
                funding_rate: accrual.funding.new_rate,
                funding_rate_velocity: accrual.funding.new_velocity,
                case: accrual.funding.case,
            }));
        }
        if accrual.borrowing_changed {
            self.emit_event(EventPayload::BorrowingAccrued(BorrowingAccruedEvent {
                market_id,
                long_fee_delta: accrual.borrowing.long_fee_delta,
                short_fee_delta: accrual.borrowing.short_fee_delta,
                long_rate: accrual.borrowing.long_rate,
                short_rate: accrual.borrowing.short_rate,
            }));
        }
    }

    pub(super) fn emit_event(&mut self, payload: EventPayload) {
        let event = Event::new(EventId(self.next_event_id), self.current_time, payload);
        self.next_event_id += 1;

        self.events.push(event);

        if self.events.len() > self.config.max_events {
            let drain_count = self.events.len() - self.config.max_events;
            self.events.drain(0..drain_count);
        }
    }
}
