use chrono::{DateTime, Utc};

use crate::execution::quantization::QuantizationRejection;
use crate::execution::{CandleWindow, ExecutionOutcome, OrderExecutor, PositionState};
use crate::models::{CandleSample, Order, OrderSide, Signal, SymbolConfig};
use crate::risk::ActionThrottle;
use crate::strategy::{Strategy, StrategyError, ThreeCandleStrike};

/// What a single closed candle led to
#[derive(Debug)]
pub enum CycleOutcome {
    /// Not enough history to evaluate yet
    WarmingUp { have: usize, need: usize },
    /// Too soon after the previous action
    Throttled,
    /// Signal evaluated but no transition applies
    NoAction(Signal),
    Bought(Order),
    Sold(Order),
    Rejected(QuantizationRejection),
    /// Order attempt abandoned for this cycle; state unchanged
    Failed(String),
    /// Empty holding reset to idle
    Repaired,
}

/// Per-symbol trading state machine
///
/// Owns the candle window and the position. Each closed candle is fully
/// processed, including any order call, before the next one is accepted.
pub struct SymbolEngine {
    config: SymbolConfig,
    window: CandleWindow,
    position: PositionState,
    strategy: ThreeCandleStrike,
    executor: OrderExecutor,
    throttle: ActionThrottle,
}

impl SymbolEngine {
    pub fn new(config: SymbolConfig, executor: OrderExecutor) -> Self {
        Self::with_position(config, executor, PositionState::new())
    }

    /// Start from a known position instead of idle
    pub fn with_position(
        config: SymbolConfig,
        executor: OrderExecutor,
        position: PositionState,
    ) -> Self {
        let throttle = ActionThrottle::new(config.min_time_between_actions);
        Self {
            config,
            window: CandleWindow::default(),
            position,
            strategy: ThreeCandleStrike::new(),
            executor,
            throttle,
        }
    }

    pub fn config(&self) -> &SymbolConfig {
        &self.config
    }

    pub fn symbol(&self) -> &str {
        &self.config.symbol
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    pub fn window(&self) -> &CandleWindow {
        &self.window
    }

    pub fn position(&self) -> &PositionState {
        &self.position
    }

    pub async fn on_candle(&mut self, sample: CandleSample) -> CycleOutcome {
        self.on_candle_at(sample, Utc::now()).await
    }

    /// Process one closed candle as of `now`
    pub async fn on_candle_at(
        &mut self,
        sample: CandleSample,
        now: DateTime<Utc>,
    ) -> CycleOutcome {
        match sample.close_time {
            Some(close_time) => tracing::info!(
                "[{}] Candle closed at {}: open={}, close={}",
                self.config.symbol,
                close_time.format("%Y-%m-%d %H:%M:%S"),
                sample.open.normalize(),
                sample.close.normalize()
            ),
            None => tracing::info!(
                "[{}] Candle closed: open={}, close={}",
                self.config.symbol,
                sample.open.normalize(),
                sample.close.normalize()
            ),
        }
        self.window.append(sample);

        let need = self.strategy.min_candles_required();
        if self.window.len() < need {
            return CycleOutcome::WarmingUp {
                have: self.window.len(),
                need,
            };
        }

        if !self.throttle.permits(self.position.last_action(), now) {
            tracing::debug!("[{}] Action throttled", self.config.symbol);
            return CycleOutcome::Throttled;
        }

        let recent = self.window.last_n(need);
        let signal = match self.strategy.generate_signal(&recent) {
            Ok(signal) => signal,
            Err(StrategyError::InsufficientData { have, need }) => {
                return CycleOutcome::WarmingUp { have, need };
            }
        };

        match (signal, self.position.in_position()) {
            (Signal::Buy, false) => {
                tracing::info!(
                    "[{}] Detected 3 consecutive green candles, BUY signal",
                    self.config.symbol
                );
                let outcome = self
                    .executor
                    .execute_buy(&mut self.position, self.config.quote_amount)
                    .await;
                self.settle(outcome, now)
            }
            (Signal::Sell, true) => {
                tracing::info!(
                    "[{}] Detected 3 consecutive red candles, SELL signal",
                    self.config.symbol
                );
                let outcome = self.executor.execute_sell(&mut self.position).await;
                self.settle(outcome, now)
            }
            (signal, _) => CycleOutcome::NoAction(signal),
        }
    }

    fn settle(&mut self, outcome: ExecutionOutcome, now: DateTime<Utc>) -> CycleOutcome {
        match outcome {
            ExecutionOutcome::Executed(order) => {
                self.position.record_action(now);
                match order.side {
                    OrderSide::Buy => CycleOutcome::Bought(order),
                    OrderSide::Sell => CycleOutcome::Sold(order),
                }
            }
            ExecutionOutcome::NotFilled(order) => CycleOutcome::Failed(format!(
                "{} order not filled ({:?})",
                order.side, order.status
            )),
            ExecutionOutcome::Rejected(rejection) => CycleOutcome::Rejected(rejection),
            ExecutionOutcome::Failed(e) => CycleOutcome::Failed(e.to_string()),
            ExecutionOutcome::Repaired => CycleOutcome::Repaired,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::PositionPhase;
    use crate::models::ExchangeFilters;
    use crate::testing::{FillMode, GatewayCall, LogCapture, MockGateway};
    use chrono::TimeZone;
    use rust_decimal::Decimal;
    use std::str::FromStr;
    use std::sync::Arc;
    use std::time::Duration;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn candle(open: i64, close: i64) -> CandleSample {
        CandleSample::new(Decimal::from(open), Decimal::from(close))
    }

    fn create_test_engine(
        min_secs: u64,
        position: PositionState,
    ) -> (Arc<MockGateway>, SymbolEngine) {
        let gateway = Arc::new(MockGateway::new(d("100")));
        let filters = ExchangeFilters::new(Some(d("0.001")), Some(d("0.01")), Some(d("10")));
        let executor = OrderExecutor::new("BTCUSDT", gateway.clone(), filters);
        let config = SymbolConfig::new("BTCUSDT", d("12"), Duration::from_secs(min_secs));
        (gateway, SymbolEngine::with_position(config, executor, position))
    }

    async fn feed(
        engine: &mut SymbolEngine,
        candles: &[(i64, i64)],
        now: DateTime<Utc>,
    ) -> Vec<CycleOutcome> {
        let mut outcomes = Vec::new();
        for &(open, close) in candles {
            outcomes.push(engine.on_candle_at(candle(open, close), now).await);
        }
        outcomes
    }

    #[tokio::test]
    async fn test_warming_up_until_three_candles() {
        let (gateway, mut engine) = create_test_engine(0, PositionState::new());

        let outcomes = feed(&mut engine, &[(1, 2), (2, 3)], at(0)).await;

        assert!(matches!(outcomes[0], CycleOutcome::WarmingUp { have: 1, need: 3 }));
        assert!(matches!(outcomes[1], CycleOutcome::WarmingUp { have: 2, need: 3 }));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_green_run_buys_once() {
        let (gateway, mut engine) = create_test_engine(0, PositionState::new());

        let outcomes = feed(&mut engine, &[(1, 2), (2, 3), (3, 4)], at(0)).await;

        assert!(matches!(outcomes[2], CycleOutcome::Bought(_)));
        assert_eq!(engine.position().phase(), PositionPhase::Holding);
        assert_eq!(engine.position().held_quantity(), d("0.12"));
        assert_eq!(engine.position().last_action(), Some(at(0)));
        assert_eq!(gateway.order_calls().len(), 1);

        // Fourth green candle while holding is a no-op
        let outcome = engine.on_candle_at(candle(4, 5), at(60)).await;
        assert!(matches!(outcome, CycleOutcome::NoAction(Signal::Buy)));
        assert_eq!(gateway.order_calls().len(), 1);
    }

    #[tokio::test]
    async fn test_red_run_while_idle_is_noop() {
        let (gateway, mut engine) = create_test_engine(0, PositionState::new());

        let outcomes = feed(&mut engine, &[(4, 3), (3, 2), (2, 1)], at(0)).await;

        assert!(matches!(outcomes[2], CycleOutcome::NoAction(Signal::Sell)));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_red_run_sells_holding() {
        let (gateway, mut engine) =
            create_test_engine(0, PositionState::from_parts(true, d("0.5")));

        let outcomes = feed(&mut engine, &[(4, 3), (3, 2), (2, 1)], at(0)).await;

        assert!(matches!(outcomes[2], CycleOutcome::Sold(_)));
        assert_eq!(engine.position().phase(), PositionPhase::Idle);
        assert_eq!(engine.position().held_quantity(), Decimal::ZERO);
        assert_eq!(
            gateway.order_calls(),
            vec![GatewayCall::Sell {
                symbol: "BTCUSDT".to_string(),
                quantity: d("0.5"),
            }]
        );
    }

    #[tokio::test]
    async fn test_throttle_blocks_second_action() {
        let (gateway, mut engine) = create_test_engine(120, PositionState::new());

        feed(&mut engine, &[(1, 2), (2, 3), (3, 4)], at(0)).await;
        assert_eq!(gateway.order_calls().len(), 1);

        let outcomes = feed(&mut engine, &[(4, 3), (3, 2), (2, 1)], at(60)).await;
        assert!(matches!(outcomes[2], CycleOutcome::Throttled));
        assert!(engine.position().in_position());

        let outcome = engine.on_candle_at(candle(1, 0), at(121)).await;
        assert!(matches!(outcome, CycleOutcome::Sold(_)));
        assert_eq!(gateway.order_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_order_does_not_record_action() {
        let (gateway, mut engine) = create_test_engine(120, PositionState::new());
        gateway.set_fill(FillMode::Error);

        let outcomes = feed(&mut engine, &[(1, 2), (2, 3), (3, 4)], at(0)).await;
        assert!(matches!(outcomes[2], CycleOutcome::Failed(_)));
        assert!(engine.position().last_action().is_none());

        // Next green candle retries straight away
        gateway.set_fill(FillMode::Full);
        let outcome = engine.on_candle_at(candle(4, 5), at(1)).await;
        assert!(matches!(outcome, CycleOutcome::Bought(_)));
    }

    #[tokio::test]
    async fn test_repair_when_holding_nothing() {
        let (gateway, mut engine) =
            create_test_engine(0, PositionState::from_parts(true, Decimal::ZERO));

        let outcomes = feed(&mut engine, &[(4, 3), (3, 2), (2, 1)], at(0)).await;

        assert!(matches!(outcomes[2], CycleOutcome::Repaired));
        assert!(gateway.order_calls().is_empty());
        assert_eq!(engine.position().phase(), PositionPhase::Idle);
        assert!(engine.position().last_action().is_none());
    }

    #[tokio::test]
    async fn test_window_capped_during_long_run() {
        let (_gateway, mut engine) = create_test_engine(0, PositionState::new());

        for i in 0..25 {
            engine.on_candle_at(candle(i, i), at(i)).await;
        }

        assert_eq!(engine.window().len(), 10);
        assert_eq!(
            engine.window().iter().next().map(|c| c.open),
            Some(Decimal::from(15))
        );
    }

    #[tokio::test]
    async fn test_candle_log_shows_close_time() {
        let logs = LogCapture::default();
        let _guard = logs.install();
        let (_gateway, mut engine) = create_test_engine(0, PositionState::new());

        let sample = candle(1, 2).with_close_time(at(0));
        engine.on_candle_at(sample, at(0)).await;
        engine.on_candle_at(candle(2, 3), at(0)).await;

        let contents = logs.contents();
        assert!(contents.contains("Candle closed at 2023-11-14 22:13:20: open=1, close=2"));
        assert!(contents.contains("[BTCUSDT] Candle closed: open=2, close=3"));
    }

    #[test]
    fn test_engine_runs_three_candle_strike() {
        let (_gateway, engine) = create_test_engine(0, PositionState::new());
        assert_eq!(engine.strategy_name(), "Three Candle Strike");
        assert_eq!(engine.config().min_time_between_actions, Duration::ZERO);
    }
}
