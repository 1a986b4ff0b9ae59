// In-memory gateway and stream fakes shared by unit and integration tests
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::api::{ExchangeGateway, GatewayError};
use crate::models::{ExchangeFilters, OrderAck, OrderStatus};
use crate::stream::{KlineSubscription, MarketStream, StreamError, StreamFrame};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// step 0.001, tick 0.01, min notional 10
pub fn btc_filters() -> ExchangeFilters {
    ExchangeFilters::new(
        Some(Decimal::new(1, 3)),
        Some(Decimal::new(1, 2)),
        Some(Decimal::TEN),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCall {
    Filters(String),
    Price(String),
    Buy { symbol: String, quantity: Decimal },
    Sell { symbol: String, quantity: Decimal },
}

impl GatewayCall {
    pub fn buy(symbol: &str, quantity: Decimal) -> Self {
        Self::Buy {
            symbol: symbol.to_string(),
            quantity,
        }
    }

    pub fn sell(symbol: &str, quantity: Decimal) -> Self {
        Self::Sell {
            symbol: symbol.to_string(),
            quantity,
        }
    }
}

/// How the mock answers order placement
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FillMode {
    /// Fill the requested quantity
    Full,
    /// Fill this exact quantity regardless of the request
    Exactly(Decimal),
    /// Order acknowledged with nothing executed
    Nothing,
    /// Order call errors
    Error,
}

pub struct MockGateway {
    filters: HashMap<String, ExchangeFilters>,
    price: Mutex<Option<Decimal>>,
    fill: Mutex<FillMode>,
    order_delay: Mutex<Duration>,
    calls: Mutex<Vec<GatewayCall>>,
}

impl MockGateway {
    pub fn new(price: Decimal) -> Self {
        Self {
            filters: HashMap::new(),
            price: Mutex::new(Some(price)),
            fill: Mutex::new(FillMode::Full),
            order_delay: Mutex::new(Duration::ZERO),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_filters(mut self, symbol: &str, filters: ExchangeFilters) -> Self {
        self.filters.insert(symbol.to_string(), filters);
        self
    }

    /// `None` makes price lookups fail
    pub fn set_price(&self, price: Option<Decimal>) {
        *lock(&self.price) = price;
    }

    pub fn set_fill(&self, fill: FillMode) {
        *lock(&self.fill) = fill;
    }

    /// Order calls are recorded on entry and answered after `delay`
    pub fn set_order_delay(&self, delay: Duration) {
        *lock(&self.order_delay) = delay;
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        lock(&self.calls).clone()
    }

    pub fn order_calls(&self) -> Vec<GatewayCall> {
        self.calls()
            .into_iter()
            .filter(|c| matches!(c, GatewayCall::Buy { .. } | GatewayCall::Sell { .. }))
            .collect()
    }

    fn record(&self, call: GatewayCall) {
        lock(&self.calls).push(call);
    }

    async fn order(&self, call: GatewayCall, quantity: Decimal) -> Result<OrderAck, GatewayError> {
        self.record(call);

        let delay = *lock(&self.order_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let fill = *lock(&self.fill);
        match fill {
            FillMode::Full => Ok(filled(quantity)),
            FillMode::Exactly(qty) => Ok(filled(qty)),
            FillMode::Nothing => Ok(OrderAck {
                order_id: Some(1),
                executed_qty: Decimal::ZERO,
                status: OrderStatus::Expired,
            }),
            FillMode::Error => Err(api_error(-2010, "Account has insufficient balance")),
        }
    }
}

fn filled(quantity: Decimal) -> OrderAck {
    OrderAck {
        order_id: Some(1),
        executed_qty: quantity,
        status: OrderStatus::Filled,
    }
}

pub fn api_error(code: i64, msg: &str) -> GatewayError {
    GatewayError::Api {
        status: 400,
        code: Some(code),
        msg: msg.to_string(),
    }
}

#[async_trait]
impl ExchangeGateway for MockGateway {
    async fn symbol_filters(&self, symbol: &str) -> Result<ExchangeFilters, GatewayError> {
        self.record(GatewayCall::Filters(symbol.to_string()));
        self.filters
            .get(symbol)
            .cloned()
            .ok_or_else(|| GatewayError::SymbolNotFound(symbol.to_string()))
    }

    async fn current_price(&self, symbol: &str) -> Result<Decimal, GatewayError> {
        self.record(GatewayCall::Price(symbol.to_string()));
        let price = *lock(&self.price);
        price.ok_or_else(|| api_error(-1003, "Too many requests"))
    }

    async fn place_market_buy(
        &self,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<OrderAck, GatewayError> {
        self.order(GatewayCall::buy(symbol, quantity), quantity)
            .await
    }

    async fn place_market_sell(
        &self,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<OrderAck, GatewayError> {
        self.order(GatewayCall::sell(symbol, quantity), quantity)
            .await
    }
}

/// One scripted connection attempt
#[derive(Debug, Clone)]
pub enum Session {
    /// Connect fails
    Refused,
    /// Connect succeeds, then yields these frames and goes quiet
    Frames(Vec<ScriptedFrame>),
}

impl Session {
    /// Closed candles followed by a clean close
    pub fn then_close(klines: Vec<String>) -> Self {
        let mut frames: Vec<ScriptedFrame> = klines.into_iter().map(ScriptedFrame::Text).collect();
        frames.push(ScriptedFrame::Close);
        Self::Frames(frames)
    }

    /// Closed candles followed by silence
    pub fn then_idle(klines: Vec<String>) -> Self {
        Self::Frames(klines.into_iter().map(ScriptedFrame::Text).collect())
    }
}

#[derive(Debug, Clone)]
pub enum ScriptedFrame {
    Text(String),
    Close,
    Error,
}

/// Stream whose sessions are played back in order, per symbol
///
/// Once a symbol's sessions run out, further subscribes connect and stay silent.
#[derive(Default)]
pub struct ScriptedStream {
    sessions: Mutex<HashMap<String, VecDeque<Session>>>,
    subscribes: AtomicUsize,
}

impl ScriptedStream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sessions(self, symbol: &str, sessions: Vec<Session>) -> Self {
        lock(&self.sessions).insert(symbol.to_string(), sessions.into());
        self
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketStream for ScriptedStream {
    async fn subscribe(&self, symbol: &str) -> Result<Box<dyn KlineSubscription>, StreamError> {
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        let next = lock(&self.sessions)
            .get_mut(symbol)
            .and_then(VecDeque::pop_front);

        match next {
            Some(Session::Refused) => Err(StreamError::Other("connection refused".to_string())),
            Some(Session::Frames(frames)) => Ok(Box::new(ScriptedSubscription {
                frames: frames.into(),
            })),
            None => Ok(Box::new(ScriptedSubscription {
                frames: VecDeque::new(),
            })),
        }
    }
}

struct ScriptedSubscription {
    frames: VecDeque<ScriptedFrame>,
}

#[async_trait]
impl KlineSubscription for ScriptedSubscription {
    async fn next_frame(&mut self) -> Result<StreamFrame, StreamError> {
        match self.frames.pop_front() {
            Some(ScriptedFrame::Text(text)) => Ok(StreamFrame::Text(text)),
            Some(ScriptedFrame::Close) => Ok(StreamFrame::Closed {
                code: Some(1000),
                reason: "normal closure".to_string(),
            }),
            Some(ScriptedFrame::Error) => Err(StreamError::Other("connection reset".to_string())),
            None => std::future::pending().await,
        }
    }
}

/// Closed 1m kline frame as Binance sends it
pub fn closed_kline(open: &str, close: &str) -> String {
    format!(
        r#"{{"e":"kline","E":1,"s":"BTCUSDT","k":{{"T":1672515779999,"o":"{open}","c":"{close}","x":true}}}}"#
    )
}

pub fn forming_kline(open: &str, close: &str) -> String {
    format!(r#"{{"e":"kline","k":{{"o":"{open}","c":"{close}","x":false}}}}"#)
}

/// Collects formatted log output for assertions
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    /// Install as the thread-local default subscriber
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || sink.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&lock(&self.0)).into_owned()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        lock(&self.0).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
