//! Property-based tests for the accounting math.
//!
//! These tests check the closed forms against naive per-second loops and
//! the sign/symmetry rules of impact and pnl under random inputs.

use perps_accounting::funding::{recompute, series_sum, update_state};
use perps_accounting::price_impact::{calculate_impact_usd, SkewSnapshot};
use perps_accounting::pricing::{calculate_pnl, weighted_average_entry};
use perps_accounting::*;
use primitive_types::U256;
use proptest::prelude::*;

fn config(min_rate: i128, max_rate: i128) -> MarketConfig {
    MarketConfig {
        id: MarketId(1),
        name: "TEST-PERP".to_string(),
        index_asset: AssetId(1),
        long_asset: AssetId(1),
        short_asset: AssetId(2),
        skew_scale: Usd::from_whole(1_000_000),
        max_funding_velocity: Rate::from_fraction(3, 100),
        funding_velocity_clamp: Rate::ZERO,
        min_funding_rate: Rate(min_rate),
        max_funding_rate: Rate(max_rate),
        borrowing_factor: Rate::ZERO,
        borrowing_exponent: 1,
        price_impact_exponent: 2,
        positive_impact_factor: Rate::from_fraction(1, 1_000_000),
        negative_impact_factor: Rate::from_fraction(1, 1_000_000),
        max_leverage: 50,
        reserve_factor: Rate::ONE,
        position_fee_bps: 0,
    }
}

fn state(rate: i128, velocity: i128) -> FundingState {
    let mut state = FundingState::new(Timestamp::from_secs(0));
    state.funding_rate = Rate(rate);
    state.funding_rate_velocity = Rate(velocity);
    state
}

fn as_i128(v: U256) -> i128 {
    v.low_u128() as i128
}

// Strategies for generating test data
fn bounds_strategy() -> impl Strategy<Value = (i128, i128)> {
    (-1_000i128..=0, 0i128..=1_000)
}

fn usd_strategy() -> impl Strategy<Value = Usd> {
    (0u64..5_000_000u64).prop_map(Usd::from_whole)
}

fn price_strategy() -> impl Strategy<Value = Usd> {
    (1u64..100_000u64).prop_map(Usd::from_whole)
}

proptest! {
    /// Closed-form series equals the per-second loop
    #[test]
    fn series_sum_matches_naive(
        first in -1_000i128..1_000,
        step in -100i128..100,
        n in 0u64..=20,
    ) {
        let naive: i128 = (0..n as i128).map(|k| first + step * k).sum();
        prop_assert_eq!(series_sum(first, step, n).unwrap(), naive);
    }

    /// Every window lands in exactly one case and the net charge equals the
    /// naive sum of the clamped per-second rate
    #[test]
    fn crossing_cases_match_clamped_sum(
        (min, max) in bounds_strategy(),
        rate_seed in 0i128..=2_000,
        velocity in -100i128..=100,
        elapsed in 1u64..=50,
    ) {
        let rate = min + rate_seed % (max - min + 1);
        let config = config(min, max);
        let result = recompute(&config, &state(rate, velocity), SignedUsd::ZERO, elapsed).unwrap();

        let naive: i128 = (0..elapsed as i128)
            .map(|k| (rate + velocity * k).clamp(min, max))
            .sum();
        let net = as_i128(result.long_fee_delta) - as_i128(result.short_fee_delta);

        prop_assert_ne!(result.case, CrossingCase::Idle);
        prop_assert_eq!(net, naive, "case {:?}", result.case);
        prop_assert!(result.new_rate >= Rate(min) && result.new_rate <= Rate(max));
    }

    /// Cumulative indices never move backwards across random updates
    #[test]
    fn funding_indices_monotonic(
        steps in proptest::collection::vec((-2_000_000i64..2_000_000i64, 0u64..10_000u64), 1..30),
    ) {
        let config = config(-1_000_000_000_000, 1_000_000_000_000);
        let mut state = FundingState::new(Timestamp::from_secs(0));
        let mut now = Timestamp::from_secs(0);

        for (skew, dt) in steps {
            let before = state.clone();
            now = now.plus_secs(dt);
            let skew = SignedUsd::from_sign(skew < 0, Usd::from_whole(skew.unsigned_abs()));
            update_state(&config, &mut state, skew, now).unwrap();

            prop_assert!(state.cumulative_long_funding_fee >= before.cumulative_long_funding_fee);
            prop_assert!(state.cumulative_short_funding_fee >= before.cumulative_short_funding_fee);
            prop_assert!(state.last_funding_update_time >= before.last_funding_update_time);
            prop_assert!(state.funding_rate <= config.max_funding_rate);
            prop_assert!(state.funding_rate >= config.min_funding_rate);
        }
    }

    /// Mirroring the book and the side gives the same impact
    #[test]
    fn impact_mirror_symmetry(
        long in usd_strategy(),
        short in usd_strategy(),
        size in usd_strategy(),
    ) {
        let config = config(-1, 1);
        let a = calculate_impact_usd(
            &config,
            &SkewSnapshot::new(long, short),
            Side::Long,
            TradeDirection::Increase,
            size,
        )
        .unwrap();
        let b = calculate_impact_usd(
            &config,
            &SkewSnapshot::new(short, long),
            Side::Short,
            TradeDirection::Increase,
            size,
        )
        .unwrap();
        prop_assert_eq!(a, b);
    }

    /// Undoing a trade that doesn't flip the skew returns the impact, up to rounding
    #[test]
    fn impact_reverses_without_flip(
        long in usd_strategy(),
        short in usd_strategy(),
        size in usd_strategy(),
    ) {
        let config = config(-1, 1);
        let skew = SkewSnapshot::new(long, short);
        let there = calculate_impact_usd(&config, &skew, Side::Long, TradeDirection::Increase, size).unwrap();
        prop_assume!(!there.flipped);

        let moved = skew.after(Side::Long, TradeDirection::Increase, size).unwrap();
        let back = calculate_impact_usd(&config, &moved, Side::Long, TradeDirection::Decrease, size).unwrap();
        prop_assume!(!back.flipped);

        let sum = there.impact.checked_add(back.impact).unwrap();
        prop_assert!(sum.abs().raw() <= U256::one());
        prop_assert!(sum.is_negative() || sum.is_zero(), "rounding must favor the pool");
    }

    /// Long profits above entry, short below, nobody at entry
    #[test]
    fn pnl_sign(
        entry in price_strategy(),
        price in price_strategy(),
        size in (1u64..1_000_000u64).prop_map(Usd::from_whole),
    ) {
        let long = calculate_pnl(Side::Long, price, entry, size).unwrap();
        let short = calculate_pnl(Side::Short, price, entry, size).unwrap();

        if price > entry {
            prop_assert!(long.is_positive());
            prop_assert!(short.is_negative());
        } else if price < entry {
            prop_assert!(long.is_negative());
            prop_assert!(short.is_positive());
        } else {
            prop_assert!(long.is_zero() && short.is_zero());
        }
        prop_assert_eq!(long.abs(), short.abs());
    }

    /// Average entry lies between the two fills
    #[test]
    fn weighted_entry_between_fills(
        old_price in price_strategy(),
        new_price in price_strategy(),
        old_size in 1u64..1_000_000u64,
        delta in 1u64..1_000_000u64,
    ) {
        let avg = weighted_average_entry(
            old_price,
            U256::from(old_size),
            new_price,
            U256::from(delta),
        )
        .unwrap();
        prop_assert!(avg >= old_price.min(new_price));
        prop_assert!(avg <= old_price.max(new_price));
    }
}

#[test]
fn concrete_velocity_scenario() {
    // skew 300k against a 1M scale at 0.03 max velocity
    let config = config(-1_000_000_000_000_000_000, 1_000_000_000_000_000_000);
    let skew = SignedUsd::positive(Usd::from_whole(300_000));
    let first = recompute(&config, &state(0, 0), skew, 0).unwrap();
    assert_eq!(first.new_velocity, Rate::from_fraction(9, 1000));

    let moving = state(0, first.new_velocity.raw());
    let one = recompute(&config, &moving, skew, 1).unwrap();
    assert!(one.long_fee_delta.is_zero() && one.short_fee_delta.is_zero());

    let two = recompute(&config, &moving, skew, 2).unwrap();
    assert_eq!(two.long_fee_delta, U256::from(9_000_000_000_000_000u64));
    assert!(two.short_fee_delta.is_zero());
}
