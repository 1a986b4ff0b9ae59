//! Property tests for quantization, the candle window and the position state machine.

mod common;

use common::{btc_filters, GatewayCall, MockGateway};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use strikebot::execution::{
    round_down_to_step, CandleWindow, OrderExecutor, PositionState, SymbolEngine, WINDOW_CAPACITY,
};
use strikebot::{CandleSample, SymbolConfig};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_quantity() -> impl Strategy<Value = Decimal> {
    (0i64..10_000_000_000, 0u32..10).prop_map(|(mantissa, scale)| Decimal::new(mantissa, scale))
}

fn arb_step() -> impl Strategy<Value = Decimal> {
    prop_oneof![
        Just(Decimal::new(1, 8)),
        Just(Decimal::new(1, 5)),
        Just(Decimal::new(1, 3)),
        Just(Decimal::new(5, 2)),
        Just(Decimal::ONE),
        (1i64..1000, 0u32..6).prop_map(|(m, s)| Decimal::new(m, s)),
    ]
}

fn arb_candle() -> impl Strategy<Value = (i64, i64)> {
    (1i64..6, 1i64..6)
}

// ── Quantization ─────────────────────────────────────────────────────

proptest! {
    #[test]
    fn round_down_never_increases(qty in arb_quantity(), step in arb_step()) {
        let rounded = round_down_to_step(qty, Some(step));
        prop_assert!(rounded <= qty);
        prop_assert!(qty - rounded < step);
    }

    #[test]
    fn round_down_is_step_multiple(qty in arb_quantity(), step in arb_step()) {
        let rounded = round_down_to_step(qty, Some(step));
        prop_assert!((rounded % step).is_zero());
    }

    #[test]
    fn round_down_is_idempotent(qty in arb_quantity(), step in arb_step()) {
        let once = round_down_to_step(qty, Some(step));
        prop_assert_eq!(round_down_to_step(once, Some(step)), once);
    }

    #[test]
    fn missing_step_is_identity(qty in arb_quantity()) {
        prop_assert_eq!(round_down_to_step(qty, None), qty);
        prop_assert_eq!(round_down_to_step(qty, Some(Decimal::ZERO)), qty);
    }
}

// ── Candle window ────────────────────────────────────────────────────

proptest! {
    #[test]
    fn window_keeps_newest_in_order(count in 0usize..40) {
        let mut window = CandleWindow::default();
        for i in 0..count {
            window.append(CandleSample::new(Decimal::from(i as i64), Decimal::ZERO));
            prop_assert!(window.len() <= WINDOW_CAPACITY);
        }

        let opens: Vec<i64> = window
            .iter()
            .map(|c| c.open.mantissa() as i64)
            .collect();
        let first = count.saturating_sub(WINDOW_CAPACITY) as i64;
        let expected: Vec<i64> = (first..count as i64).collect();
        prop_assert_eq!(opens, expected);
    }
}

// ── Position state machine ───────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Orders strictly alternate buy, sell, buy... and the final state matches
    #[test]
    fn never_buys_while_holding_or_sells_while_idle(
        candles in prop::collection::vec(arb_candle(), 0..60)
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let gateway = Arc::new(MockGateway::new(Decimal::from(100)));
        let executor = OrderExecutor::new("BTCUSDT", gateway.clone(), btc_filters());
        let config = SymbolConfig::new("BTCUSDT", Decimal::from(12), Duration::ZERO);
        let mut engine = SymbolEngine::with_position(config, executor, PositionState::new());

        runtime.block_on(async {
            for (open, close) in &candles {
                engine
                    .on_candle(CandleSample::new(Decimal::from(*open), Decimal::from(*close)))
                    .await;
            }
        });

        let orders = gateway.order_calls();
        for (i, order) in orders.iter().enumerate() {
            let expected_buy = i % 2 == 0;
            let is_buy = matches!(order, GatewayCall::Buy { .. });
            prop_assert_eq!(is_buy, expected_buy, "order {} was {:?}", i, order);
        }

        let holding = orders.len() % 2 == 1;
        prop_assert_eq!(engine.position().in_position(), holding);
        if holding {
            prop_assert_eq!(engine.position().held_quantity(), Decimal::new(12, 2));
        } else {
            prop_assert_eq!(engine.position().held_quantity(), Decimal::ZERO);
        }
    }
}
