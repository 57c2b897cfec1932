//! Perpetual accounting core simulation.
//!
//! Walks one ETH market through opens, funding drift, price impact,
//! collateral edits, ADL and full closes. Set `RUST_LOG=debug` to see every
//! accrual the engine performs.

use perps_accounting::config::{ETH, USDC};
use perps_accounting::math::{tokens, usd_to_decimal};
use perps_accounting::*;
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

const START: u64 = 1_700_000_000;
const ETH_DECIMALS: usize = 18;
const USDC_DECIMALS: usize = 6;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .init();

    println!("Perpetual Accounting Core Simulation");
    println!("Single ETH market, USDC collateral\n");

    let scenarios: [(&str, fn() -> Result<(), EngineError>); 5] = [
        ("open and close", scenario_1_round_trip),
        ("funding drift", scenario_2_funding_drift),
        ("price impact and slippage", scenario_3_price_impact),
        ("collateral edits", scenario_4_collateral),
        ("auto-deleveraging", scenario_5_adl),
    ];
    for (name, run) in scenarios {
        if let Err(e) = run() {
            eprintln!("  scenario '{}' failed: {}", name, e);
            std::process::exit(1);
        }
    }

    println!("\nAll simulations completed successfully.");
}

fn setup() -> Result<Engine<OracleBook>, EngineError> {
    let mut engine = Engine::new(EngineConfig::default(), OracleBook::new(60));
    engine.set_time(Timestamp::from_secs(START));
    let market = engine.add_market_from_settings(&MarketSettings::eth_perp())?;
    engine.set_max_allocated(market, Usd::from_whole(50_000_000), Usd::from_whole(50_000_000))?;
    engine.fund_impact_pool(market, Usd::from_whole(250_000))?;
    set_eth_price(&mut engine, 3_000);
    Ok(engine)
}

// publishes fresh ETH and USDC prices at the engine's clock
fn set_eth_price(engine: &mut Engine<OracleBook>, dollars: u64) {
    let now = engine.time();
    let oracle = engine.oracle_mut();
    oracle.set_price(ETH, OraclePrice::new(Usd::from_whole(dollars), ETH_DECIMALS, now));
    oracle.set_price(USDC, OraclePrice::new(Usd::from_whole(1), USDC_DECIMALS, now));
}

fn usdc(whole: u64) -> TokenAmount {
    tokens(whole, USDC_DECIMALS)
}

fn show(amount: TokenAmount, decimals: usize) -> Decimal {
    if amount.bits() > 95 {
        return Decimal::MAX;
    }
    Decimal::try_from_i128_with_scale(amount.low_u128() as i128, decimals as u32).unwrap_or(Decimal::MAX)
}

fn print_position(engine: &Engine<OracleBook>, key: &PositionKey) {
    match engine.get_position(key) {
        Some(p) => println!(
            "    {} {}: {} ETH @ ${}, collateral {} USDC",
            key.owner.0,
            key.side,
            show(p.size, ETH_DECIMALS),
            p.weighted_avg_entry_price,
            show(p.collateral_amount, USDC_DECIMALS),
        ),
        None => println!("    {} {}: closed", key.owner.0, key.side),
    }
}

/// Open then fully close at an unchanged price.
fn scenario_1_round_trip() -> Result<(), EngineError> {
    println!("Scenario 1: Open and Close\n");

    let mut engine = setup()?;
    let alice = PositionKey::new(MarketId(2), AccountId(1), Side::Long);

    let opened = engine.execute(Request::open(alice, USDC, usdc(10_000), Usd::from_whole(30_000)))?;
    println!(
        "  Alice opens $30,000 long with 10,000 USDC, fill ${}, impact ${}",
        opened.execution_price.map(usd_to_decimal).unwrap_or_default(),
        opened.price_impact
    );
    print_position(&engine, &alice);

    let closed = engine.execute(Request::decrease(alice, Usd::from_whole(30_000), TokenAmount::zero()))?;
    println!(
        "  Alice closes, fees {} USDC, payout {} USDC",
        show(closed.breakdown.position_fee, USDC_DECIMALS),
        show(closed.payout, USDC_DECIMALS)
    );
    print_position(&engine, &alice);
    println!();
    Ok(())
}

/// A skewed book moves the funding rate; longs pay shorts over time.
fn scenario_2_funding_drift() -> Result<(), EngineError> {
    println!("Scenario 2: Funding Drift\n");

    let mut engine = setup()?;
    let long = PositionKey::new(MarketId(2), AccountId(1), Side::Long);
    let short = PositionKey::new(MarketId(2), AccountId(2), Side::Short);

    engine.execute(Request::open(long, USDC, usdc(200_000), Usd::from_whole(3_000_000)))?;
    engine.execute(Request::open(short, USDC, usdc(100_000), Usd::from_whole(1_000_000)))?;
    println!("  Book: $3,000,000 long vs $1,000,000 short");

    for hour in [8u64, 16, 24] {
        engine.advance_time(8 * 3_600);
        set_eth_price(&mut engine, 3_000);
        let accrual = engine.poke(MarketId(2))?;
        println!(
            "  After {:>2}h: rate {}/s, velocity {}/s², long index +{}",
            hour, accrual.funding.new_rate, accrual.funding.new_velocity, accrual.funding.long_fee_delta
        );
    }

    let settled = engine.execute(Request::deposit(long, usdc(1)))?;
    println!(
        "  Long settles: funding owed {} USDC, borrow fee {} USDC",
        show(settled.breakdown.funding_owed, USDC_DECIMALS),
        show(settled.breakdown.borrow_fee, USDC_DECIMALS)
    );
    let settled = engine.execute(Request::deposit(short, usdc(1)))?;
    println!(
        "  Short settles: funding earned {} USDC",
        show(settled.breakdown.funding_earned, USDC_DECIMALS)
    );
    print_position(&engine, &long);
    print_position(&engine, &short);
    println!();
    Ok(())
}

/// Trades that worsen the skew pay; trades that heal it are paid from the pool.
fn scenario_3_price_impact() -> Result<(), EngineError> {
    println!("Scenario 3: Price Impact and Slippage\n");

    let mut engine = setup()?;
    let whale = PositionKey::new(MarketId(2), AccountId(3), Side::Long);
    let healer = PositionKey::new(MarketId(2), AccountId(4), Side::Short);

    match engine.execute(Request::open(whale, USDC, usdc(400_000), Usd::from_whole(5_000_000))) {
        Ok(_) => println!("  Whale's $5,000,000 long filled"),
        Err(e) => println!("  Whale's $5,000,000 long rejected: {}", e),
    }

    let filled = engine.execute(
        Request::open(whale, USDC, usdc(400_000), Usd::from_whole(5_000_000))
            .with_max_slippage(Rate::from_fraction(5, 100)),
    )?;
    println!(
        "  Retried with 5% max slippage: fill ${}, impact ${}",
        filled.execution_price.map(usd_to_decimal).unwrap_or_default(),
        filled.price_impact
    );

    let healed = engine.execute(Request::open(healer, USDC, usdc(100_000), Usd::from_whole(2_000_000)))?;
    println!(
        "  $2,000,000 short heals the skew: fill ${}, impact ${}",
        healed.execution_price.map(usd_to_decimal).unwrap_or_default(),
        healed.price_impact
    );
    if let Some(market) = engine.get_market(MarketId(2)) {
        println!("  Impact pool: ${}", market.impact_pool.balance);
    }
    println!();
    Ok(())
}

fn scenario_4_collateral() -> Result<(), EngineError> {
    println!("Scenario 4: Collateral Edits\n");

    let mut engine = setup()?;
    let carol = PositionKey::new(MarketId(2), AccountId(5), Side::Short);
    engine.execute(Request::open(carol, USDC, usdc(2_000), Usd::from_whole(60_000)))?;
    print_position(&engine, &carol);

    engine.execute(Request::deposit(carol, usdc(3_000)))?;
    println!("  Carol deposits 3,000 USDC");
    print_position(&engine, &carol);

    match engine.execute(Request::withdraw(carol, usdc(4_500))) {
        Ok(_) => println!("  Carol withdraws 4,500 USDC"),
        Err(e) => println!("  Withdrawing 4,500 USDC rejected: {}", e),
    }
    engine.execute(Request::withdraw(carol, usdc(1_000)))?;
    println!("  Carol withdraws 1,000 USDC");
    print_position(&engine, &carol);
    println!();
    Ok(())
}

fn scenario_5_adl() -> Result<(), EngineError> {
    println!("Scenario 5: Auto-Deleveraging\n");

    let mut engine = setup()?;
    let dave = PositionKey::new(MarketId(2), AccountId(6), Side::Short);
    engine.execute(Request::open(dave, USDC, usdc(20_000), Usd::from_whole(200_000)))?;
    print_position(&engine, &dave);

    if let Err(e) = engine.execute(Request::adl(dave, Usd::from_whole(100_000))) {
        println!("  ADL at entry rejected: {}", e);
    }

    engine.advance_time(60);
    set_eth_price(&mut engine, 2_700);
    println!("  ETH falls to $2,700");
    let adl = engine.execute(Request::adl(dave, Usd::from_whole(100_000)))?;
    println!(
        "  Half of Dave's short deleveraged, pnl {} USDC",
        show(adl.breakdown.pnl_profit, USDC_DECIMALS)
    );
    print_position(&engine, &dave);

    let close = engine.execute(Request::decrease(dave, Usd::from_whole(100_000), TokenAmount::zero()))?;
    println!("  Dave closes the rest, payout {} USDC", show(close.payout, USDC_DECIMALS));
    println!("  {} events recorded", engine.events().len());
    Ok(())
}
