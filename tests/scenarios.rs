mod common;

use common::{
    btc_filters, buy, d, kline, sell, FillMode, LogCapture, MockGateway, ScriptedStream, Session,
};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use strikebot::execution::{
    round_down_to_step, CycleOutcome, OrderExecutor, PositionPhase, PositionState, SymbolEngine,
};
use strikebot::stream::{ReconnectPolicy, StreamConsumer};
use strikebot::{CandleSample, Orchestrator, SymbolConfig, UnitExit};
use tokio::sync::watch;

fn engine_with(
    gateway: Arc<MockGateway>,
    quote: &str,
    position: PositionState,
) -> SymbolEngine {
    let executor = OrderExecutor::new("BTCUSDT", gateway, btc_filters());
    let config = SymbolConfig::new("BTCUSDT", d(quote), Duration::ZERO);
    SymbolEngine::with_position(config, executor, position)
}

fn candle(open: i64, close: i64) -> CandleSample {
    CandleSample::new(Decimal::from(open), Decimal::from(close))
}

#[tokio::test]
async fn scenario_a_three_green_candles_buy_once() {
    let gateway = Arc::new(MockGateway::new(d("27350.5")));
    let mut engine = engine_with(gateway.clone(), "12", PositionState::new());

    for (open, close) in [(1, 2), (2, 3), (3, 4)] {
        engine.on_candle(candle(open, close)).await;
    }

    let expected = round_down_to_step(d("12") / d("27350.5"), Some(d("0.001")));
    // 12 USDT cannot buy a full BTC lot at this price
    assert_eq!(expected, Decimal::ZERO);
    assert!(gateway.order_calls().is_empty());

    // Same run with enough quote for a lot
    let gateway = Arc::new(MockGateway::new(d("2735.05")));
    let mut engine = engine_with(gateway.clone(), "12", PositionState::new());
    for (open, close) in [(1, 2), (2, 3), (3, 4)] {
        engine.on_candle(candle(open, close)).await;
    }

    let expected = round_down_to_step(d("12") / d("2735.05"), Some(d("0.001")));
    assert_eq!(expected, d("0.004"));
    assert_eq!(gateway.order_calls(), vec![buy(expected)]);
    assert_eq!(engine.position().phase(), PositionPhase::Holding);
    assert_eq!(engine.position().held_quantity(), expected);
}

#[tokio::test]
async fn scenario_b_three_red_candles_sell_held() {
    let gateway = Arc::new(MockGateway::new(d("100")));
    let mut engine = engine_with(
        gateway.clone(),
        "12",
        PositionState::from_parts(true, d("0.5")),
    );

    for (open, close) in [(4, 3), (3, 2), (2, 1)] {
        engine.on_candle(candle(open, close)).await;
    }

    let expected = round_down_to_step(d("0.5"), Some(d("0.001")));
    assert_eq!(gateway.order_calls(), vec![sell(expected)]);
    assert_eq!(engine.position().phase(), PositionPhase::Idle);
    assert_eq!(engine.position().held_quantity(), Decimal::ZERO);
}

#[tokio::test]
async fn scenario_c_below_min_notional_is_rejected() {
    let logs = LogCapture::default();
    let _guard = logs.install();

    let gateway = Arc::new(MockGateway::new(d("100")));
    let mut engine = engine_with(gateway.clone(), "5", PositionState::new());

    let mut last = None;
    for (open, close) in [(1, 2), (2, 3), (3, 4)] {
        last = Some(engine.on_candle(candle(open, close)).await);
    }

    assert!(matches!(last, Some(CycleOutcome::Rejected(_))));
    assert!(gateway.order_calls().is_empty());
    assert_eq!(engine.position(), &PositionState::new());
    assert!(logs.contents().contains("min_notional"));
}

#[tokio::test]
async fn scenario_d_empty_holding_is_repaired() {
    let logs = LogCapture::default();
    let _guard = logs.install();

    let gateway = Arc::new(MockGateway::new(d("100")));
    let mut engine = engine_with(
        gateway.clone(),
        "12",
        PositionState::from_parts(true, Decimal::ZERO),
    );

    for (open, close) in [(4, 3), (3, 2), (2, 1)] {
        engine.on_candle(candle(open, close)).await;
    }

    assert!(gateway.order_calls().is_empty());
    assert!(!engine.position().in_position());
    assert!(logs.contents().contains("resetting state"));
}

#[tokio::test(start_paused = true)]
async fn scenario_e_disconnect_resubscribes_after_delay() {
    let stream = Arc::new(ScriptedStream::new().with_sessions(
        "BTCUSDT",
        vec![
            Session::then_close(vec![kline("1", "2"), kline("2", "3")]),
            Session::then_idle(vec![kline("3", "4")]),
        ],
    ));
    let gateway = Arc::new(MockGateway::new(d("100")));
    let policy = ReconnectPolicy::fixed(Duration::from_secs(5), Duration::from_secs(10));
    let consumer = StreamConsumer::new("BTCUSDT", stream.clone(), policy);

    let (stop_tx, stop_rx) = watch::channel(false);
    let task_gateway = gateway.clone();
    let handle = tokio::spawn(async move {
        let mut engine = engine_with(task_gateway, "12", PositionState::new());
        consumer.run(&mut engine, stop_rx).await;
        engine
    });

    tokio::time::sleep(Duration::from_millis(4_900)).await;
    assert_eq!(stream.subscribe_count(), 1);
    assert!(gateway.order_calls().is_empty());

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(stream.subscribe_count(), 2);

    stop_tx.send(true).unwrap();
    let engine = handle.await.unwrap();

    // Window spans the disconnect, so the third candle completed the pattern
    assert_eq!(engine.window().len(), 3);
    assert_eq!(gateway.order_calls(), vec![buy(d("0.12"))]);
    assert!(engine.position().in_position());
}

#[tokio::test]
async fn failed_order_leaves_position_untouched() {
    let gateway = Arc::new(MockGateway::new(d("100")));
    gateway.set_fill(FillMode::Error);
    let mut engine = engine_with(gateway.clone(), "12", PositionState::new());

    for (open, close) in [(1, 2), (2, 3), (3, 4)] {
        engine.on_candle(candle(open, close)).await;
    }

    assert_eq!(gateway.order_calls().len(), 1);
    assert_eq!(engine.position(), &PositionState::new());
}

#[tokio::test(start_paused = true)]
async fn unknown_symbol_does_not_stop_others() {
    let gateway =
        Arc::new(MockGateway::new(d("100")).with_filters("BTCUSDT", btc_filters()));
    let stream = Arc::new(ScriptedStream::new().with_sessions(
        "BTCUSDT",
        vec![Session::then_idle(vec![
            kline("1", "2"),
            kline("2", "3"),
            kline("3", "4"),
        ])],
    ));

    let orchestrator = Orchestrator::new(
        gateway.clone(),
        stream,
        vec![
            SymbolConfig::new("XYZUSDT", d("12"), Duration::from_secs(1)),
            SymbolConfig::new("BTCUSDT", d("12"), Duration::from_secs(1)),
        ],
        ReconnectPolicy::default(),
        Duration::from_secs(5),
    );

    let report = orchestrator
        .run(tokio::time::sleep(Duration::from_secs(120)))
        .await;

    assert!(matches!(report.exit_of("XYZUSDT"), Some(UnitExit::Disabled(_))));
    assert_eq!(report.exit_of("BTCUSDT"), Some(&UnitExit::Stopped));
    assert_eq!(gateway.order_calls(), vec![buy(d("0.12"))]);
}
