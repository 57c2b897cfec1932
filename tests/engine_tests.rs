//! Engine integration tests.
//!
//! Full request lifecycles through `Engine::execute`: atomic rejection,
//! fee settlement, round trips and ADL.

use perps_accounting::math::tokens;
use perps_accounting::*;

const ETH: AssetId = AssetId(1);
const USDC: AssetId = AssetId(2);
const MARKET: MarketId = MarketId(7);

fn market_config() -> MarketConfig {
    MarketConfig {
        id: MARKET,
        name: "ETH-PERP".to_string(),
        index_asset: ETH,
        long_asset: ETH,
        short_asset: USDC,
        skew_scale: Usd::from_whole(1_000_000),
        max_funding_velocity: Rate(1_000_000_000),
        funding_velocity_clamp: Rate::ZERO,
        min_funding_rate: Rate(-1_000_000_000_000),
        max_funding_rate: Rate(1_000_000_000_000),
        borrowing_factor: Rate::ZERO,
        borrowing_exponent: 1,
        price_impact_exponent: 2,
        positive_impact_factor: Rate::ZERO,
        negative_impact_factor: Rate::ZERO,
        max_leverage: 50,
        reserve_factor: Rate::ONE,
        position_fee_bps: 0,
    }
}

fn engine_with(config: MarketConfig) -> Engine<OracleBook> {
    let mut engine = Engine::new(EngineConfig::default(), OracleBook::new(60));
    engine.set_time(Timestamp::from_secs(1_000));
    engine.add_market(config).unwrap();
    engine
        .set_max_allocated(MARKET, Usd::from_whole(10_000_000), Usd::from_whole(10_000_000))
        .unwrap();
    set_price(&mut engine, 2_000);
    engine
}

fn engine() -> Engine<OracleBook> {
    engine_with(market_config())
}

fn set_price(engine: &mut Engine<OracleBook>, eth: u64) {
    let now = engine.time();
    engine
        .oracle_mut()
        .set_price(ETH, OraclePrice::new(Usd::from_whole(eth), 18, now));
    engine
        .oracle_mut()
        .set_price(USDC, OraclePrice::new(Usd::from_whole(1), 6, now));
}

fn usdc(whole: u64) -> TokenAmount {
    tokens(whole, 6)
}

fn key(owner: u64, side: Side) -> PositionKey {
    PositionKey::new(MARKET, AccountId(owner), side)
}

#[test]
fn increase_then_inverse_decrease_restores_position() {
    let mut engine = engine();
    let alice = key(1, Side::Long);
    engine
        .execute(Request::open(alice, USDC, usdc(10_000), Usd::from_whole(20_000)))
        .unwrap();
    let before = engine.get_position(&alice).cloned().unwrap();

    engine
        .execute(Request::increase(alice, usdc(5_000), Usd::from_whole(10_000)))
        .unwrap();
    let result = engine
        .execute(Request::decrease(alice, Usd::from_whole(10_000), usdc(5_000)))
        .unwrap();

    let after = result.position.unwrap();
    assert_eq!(after.collateral_amount, before.collateral_amount);
    assert_eq!(after.weighted_avg_entry_price, before.weighted_avg_entry_price);
    assert_eq!(after.size, before.size);
    assert_eq!(result.payout, usdc(5_000));
    assert!(after.realized_pnl.is_zero());
}

#[test]
fn full_close_removes_position_and_pays_out_everything() {
    let mut engine = engine();
    let alice = key(1, Side::Long);
    engine
        .execute(Request::open(alice, USDC, usdc(10_000), Usd::from_whole(20_000)))
        .unwrap();

    set_price(&mut engine, 2_100);
    let result = engine
        .execute(Request::decrease(alice, Usd::from_whole(25_000), usdc(1)))
        .unwrap();

    assert!(result.closed());
    assert_eq!(result.size_delta_usd, Usd::from_whole(20_000));
    // +5% on $20,000
    assert_eq!(result.breakdown.pnl_profit, usdc(1_000));
    assert_eq!(result.payout, usdc(11_000));
    assert!(engine.get_position(&alice).is_none());
    assert_eq!(engine.open_interest(MARKET, Side::Long), Some(Usd::ZERO));
    assert!(matches!(
        engine.events().last().map(|e| &e.payload),
        Some(EventPayload::PositionClosed(_))
    ));
}

#[test]
fn slippage_rejection_leaves_state_untouched() {
    let mut config = market_config();
    // $100,000 of fresh skew costs $10,000, 10%
    config.negative_impact_factor = Rate::from_fraction(1, 1_000_000);
    let mut engine = engine_with(config);
    let whale = key(9, Side::Long);
    let events_before = engine.events().len();

    let err = engine
        .execute(Request::open(whale, USDC, usdc(50_000), Usd::from_whole(100_000)))
        .unwrap_err();
    assert!(matches!(
        err,
        EngineError::PriceImpact(PriceImpactError::SlippageExceeded { .. })
    ));

    assert!(engine.get_position(&whale).is_none());
    let market = engine.get_market(MARKET).unwrap();
    assert!(market.open_interest.long_usd.is_zero());
    assert!(market.impact_pool.balance.is_zero());
    assert_eq!(market.funding.last_funding_update_time, market.created_at);
    assert_eq!(engine.events().len(), events_before);

    // a looser bound lets it through and the cost lands in the pool
    let filled = engine
        .execute(
            Request::open(whale, USDC, usdc(50_000), Usd::from_whole(100_000))
                .with_max_slippage(Rate::from_fraction(20, 100)),
        )
        .unwrap();
    assert_eq!(filled.price_impact, SignedUsd::negative(Usd::from_whole(10_000)));
    let market = engine.get_market(MARKET).unwrap();
    assert_eq!(market.impact_pool.balance, Usd::from_whole(10_000));
}

#[test]
fn funding_flows_from_heavy_side() {
    let mut engine = engine();
    let long = key(1, Side::Long);
    let short = key(2, Side::Short);
    engine
        .execute(Request::open(long, USDC, usdc(20_000), Usd::from_whole(100_000)))
        .unwrap();
    engine
        .execute(Request::open(short, USDC, usdc(5_000), Usd::from_whole(10_000)))
        .unwrap();

    engine.advance_time(3_600);
    set_price(&mut engine, 2_000);
    let accrual = engine.poke(MARKET).unwrap();
    assert!(accrual.funding.new_rate.is_positive());
    assert!(!accrual.funding.long_fee_delta.is_zero());
    assert!(accrual.funding.short_fee_delta.is_zero());

    let paid = engine.execute(Request::deposit(long, usdc(1))).unwrap();
    assert!(!paid.breakdown.funding_owed.is_zero());
    assert!(paid.breakdown.funding_earned.is_zero());
    let position = paid.position.unwrap();
    assert!(position.funding.fees_owed.is_zero());
    assert_eq!(
        position.funding.last_long_cumulative,
        engine.get_market(MARKET).unwrap().funding.cumulative_long_funding_fee
    );

    let earned = engine.execute(Request::deposit(short, usdc(1))).unwrap();
    assert!(!earned.breakdown.funding_earned.is_zero());
    assert!(earned.breakdown.funding_owed.is_zero());
}

#[test]
fn borrowing_charges_only_own_side() {
    let mut config = market_config();
    config.borrowing_factor = Rate::from_fraction(1, 100);
    let mut engine = engine_with(config);
    let long = key(1, Side::Long);
    engine
        .execute(Request::open(long, USDC, usdc(20_000), Usd::from_whole(100_000)))
        .unwrap();

    engine.advance_time(86_400);
    set_price(&mut engine, 2_000);
    let result = engine.execute(Request::deposit(long, usdc(1))).unwrap();
    // 1%/day * (100k / 10M) utilization on $100,000 for a day is $10
    assert_eq!(result.breakdown.borrow_fee, usdc(10));

    let market = engine.get_market(MARKET).unwrap();
    assert!(market.borrowing.cumulative_short_borrow_fee.is_zero());
}

#[test]
fn adl_only_hits_profitable_positions() {
    let mut engine = engine();
    let short = key(3, Side::Short);
    engine
        .execute(Request::open(short, USDC, usdc(10_000), Usd::from_whole(40_000)))
        .unwrap();

    let err = engine.execute(Request::adl(short, Usd::from_whole(20_000))).unwrap_err();
    assert!(matches!(err, EngineError::AdlNotProfitable(_)));

    set_price(&mut engine, 1_800);
    let result = engine.execute(Request::adl(short, Usd::from_whole(20_000))).unwrap();
    assert_eq!(result.kind, MutationKind::Adl);
    assert_eq!(result.breakdown.pnl_profit, usdc(2_000));
    assert_eq!(result.payout, TokenAmount::zero());
    let position = result.position.unwrap();
    assert_eq!(position.collateral_amount, usdc(12_000));
    assert_eq!(position.size, tokens(10, 18));
    assert!(matches!(
        engine.events().last().map(|e| &e.payload),
        Some(EventPayload::AutoDeleveraged(_))
    ));
}

#[test]
fn collateral_edits_keep_size() {
    let mut engine = engine();
    let alice = key(1, Side::Long);
    engine
        .execute(Request::open(alice, USDC, usdc(1_000), Usd::from_whole(20_000)))
        .unwrap();

    let result = engine.execute(Request::deposit(alice, usdc(500))).unwrap();
    let position = result.position.unwrap();
    assert_eq!(position.collateral_amount, usdc(1_500));
    assert_eq!(position.size, tokens(10, 18));

    let err = engine.execute(Request::withdraw(alice, usdc(1_200))).unwrap_err();
    assert!(matches!(err, EngineError::LeverageExceeded { .. }));

    let err = engine.execute(Request::withdraw(alice, usdc(2_000))).unwrap_err();
    assert!(matches!(err, EngineError::InsufficientCollateral { .. }));

    let result = engine.execute(Request::withdraw(alice, usdc(1_100))).unwrap();
    assert_eq!(result.payout, usdc(1_100));
    assert_eq!(result.position.unwrap().collateral_amount, usdc(400));
}

#[test]
fn dust_trades_that_move_no_tokens_are_rejected() {
    let mut engine = engine();
    let alice = key(1, Side::Long);
    // 1e-16 dollars buys a twentieth of a wei at $2,000
    let dust = Usd::new(primitive_types::U256::exp10(14));

    let err = engine
        .execute(Request::open(alice, USDC, usdc(10), dust))
        .unwrap_err();
    assert!(matches!(err, EngineError::ZeroAmount));
    assert!(engine.get_position(&alice).is_none());
    assert_eq!(engine.open_interest(MARKET, Side::Long), Some(Usd::ZERO));

    engine
        .execute(Request::open(alice, USDC, usdc(1_000), Usd::from_whole(2_000)))
        .unwrap();
    for _ in 0..5 {
        let err = engine
            .execute(Request::increase(alice, TokenAmount::zero(), dust))
            .unwrap_err();
        assert!(matches!(err, EngineError::ZeroAmount));
    }
    let err = engine
        .execute(Request::decrease(alice, dust, TokenAmount::zero()))
        .unwrap_err();
    assert!(matches!(err, EngineError::ZeroAmount));

    // book and position still agree
    let position = engine.get_position(&alice).unwrap();
    assert_eq!(position.size, tokens(1, 18));
    assert_eq!(engine.open_interest(MARKET, Side::Long), Some(Usd::from_whole(2_000)));
}

#[test]
fn conditional_order_keys_survive_every_mutation() {
    let mut engine = engine();
    let alice = key(1, Side::Long);
    let (sl, tp) = (Some(OrderKey(11)), Some(OrderKey(12)));
    engine
        .execute(
            Request::open(alice, USDC, usdc(10_000), Usd::from_whole(20_000))
                .with_conditional_orders(sl, tp),
        )
        .unwrap();

    let requests = [
        Request::increase(alice, usdc(1_000), Usd::from_whole(4_000)),
        Request::decrease(alice, Usd::from_whole(6_000), usdc(500)),
        Request::deposit(alice, usdc(250)),
        Request::withdraw(alice, usdc(100)),
    ];
    for request in requests {
        let position = engine.execute(request).unwrap().position.unwrap();
        assert_eq!(position.stop_loss_key, sl);
        assert_eq!(position.take_profit_key, tp);
    }
}

#[test]
fn repricing_at_zero_elapsed_is_logged() {
    let mut config = market_config();
    config.borrowing_factor = Rate::from_fraction(1, 100);
    let mut engine = engine_with(config);
    let long = key(1, Side::Long);
    // same second the market was created
    engine
        .execute(Request::open(long, USDC, usdc(20_000), Usd::from_whole(100_000)))
        .unwrap();

    let market = engine.get_market(MARKET).unwrap();
    assert!(market.borrowing.long_borrowing_rate.is_positive());
    let logged = engine.events().iter().find_map(|e| match &e.payload {
        EventPayload::BorrowingAccrued(b) => Some(b.long_rate),
        _ => None,
    });
    assert_eq!(logged, Some(market.borrowing.long_borrowing_rate));
    assert!(engine
        .events()
        .iter()
        .any(|e| matches!(e.payload, EventPayload::FundingAccrued(_))));

    // nothing moved since, so a poke logs nothing
    let before = engine.events().len();
    engine.poke(MARKET).unwrap();
    assert_eq!(engine.events().len(), before);
}

#[test]
fn stale_or_missing_prices_reject() {
    let mut engine = engine();
    let alice = key(1, Side::Long);
    engine.advance_time(61);

    let err = engine
        .execute(Request::open(alice, USDC, usdc(1_000), Usd::from_whole(2_000)))
        .unwrap_err();
    assert!(matches!(err, EngineError::Oracle(OracleError::StalePrice { .. })));

    set_price(&mut engine, 2_000);
    engine.oracle_mut().remove_price(USDC);
    let err = engine
        .execute(Request::open(alice, USDC, usdc(1_000), Usd::from_whole(2_000)))
        .unwrap_err();
    assert!(matches!(err, EngineError::Oracle(OracleError::PriceNotFound(_))));
}

#[test]
fn request_shape_errors() {
    let mut engine = engine();
    let alice = key(1, Side::Long);

    let err = engine.execute(Request::deposit(alice, usdc(1))).unwrap_err();
    assert!(matches!(err, EngineError::PositionNotFound(_)));

    let err = engine
        .execute(Request::open(alice, AssetId(99), usdc(1_000), Usd::from_whole(2_000)))
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidCollateral(AssetId(99))));

    engine
        .execute(Request::open(alice, USDC, usdc(1_000), Usd::from_whole(2_000)))
        .unwrap();
    let err = engine
        .execute(Request::open(alice, USDC, usdc(1_000), Usd::from_whole(2_000)))
        .unwrap_err();
    assert!(matches!(err, EngineError::PositionExists(_)));

    let err = engine
        .execute(Request::decrease(alice, Usd::ZERO, TokenAmount::zero()))
        .unwrap_err();
    assert!(matches!(err, EngineError::ZeroAmount));

    assert!(matches!(
        engine.execute(Request::deposit(PositionKey::new(MarketId(99), AccountId(1), Side::Long), usdc(1))),
        Err(EngineError::MarketNotFound(MarketId(99)))
    ));
}

#[test]
fn settings_presets_load_into_engine() {
    let mut engine = Engine::new(EngineConfig::default(), OracleBook::new(60));
    let id = engine.add_market_from_settings(&MarketSettings::btc_perp()).unwrap();
    assert!(engine.get_market(id).is_some());
    assert!(matches!(
        engine.add_market_from_settings(&MarketSettings::btc_perp()),
        Err(EngineError::MarketExists(_))
    ));
}
