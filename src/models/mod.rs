use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Exchange-wide minimum order value in quote units
pub const MIN_NOTIONAL_FLOOR: Decimal = Decimal::TEN;

/// Per-symbol trading parameters, fixed for the lifetime of an engine
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolConfig {
    pub symbol: String,
    pub quote_amount: Decimal, // Quote currency spent per buy
    pub min_time_between_actions: Duration,
}

impl SymbolConfig {
    pub fn new(
        symbol: impl Into<String>,
        quote_amount: Decimal,
        min_time_between_actions: Duration,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            quote_amount,
            min_time_between_actions,
        }
    }

    /// Base asset label used in log lines ("BTCUSDT" -> "BTC")
    pub fn base_asset(&self) -> &str {
        base_asset(&self.symbol)
    }
}

/// Strips the common quote suffixes from a trading pair
pub fn base_asset(symbol: &str) -> &str {
    ["USDT", "USDC", "FDUSD", "BUSD", "BTC", "ETH", "BNB"]
        .iter()
        .find_map(|quote| {
            symbol
                .strip_suffix(quote)
                .filter(|base| !base.is_empty())
        })
        .unwrap_or(symbol)
}

/// Lot-size, price and notional rules for one symbol
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeFilters {
    pub step_size: Option<Decimal>,
    pub tick_size: Option<Decimal>,
    min_notional: Decimal,
}

impl ExchangeFilters {
    /// Build filters, clamping the reported min notional to the exchange floor
    pub fn new(
        step_size: Option<Decimal>,
        tick_size: Option<Decimal>,
        reported_min_notional: Option<Decimal>,
    ) -> Self {
        let min_notional = reported_min_notional
            .unwrap_or(MIN_NOTIONAL_FLOOR)
            .max(MIN_NOTIONAL_FLOOR);

        Self {
            step_size,
            tick_size,
            min_notional,
        }
    }

    pub fn min_notional(&self) -> Decimal {
        self.min_notional
    }
}

impl fmt::Display for ExchangeFilters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: Option<Decimal>| v.map(|d| d.normalize().to_string());
        write!(
            f,
            "Step={}, Tick={}, MinNotional={}",
            show(self.step_size).unwrap_or_else(|| "None".to_string()),
            show(self.tick_size).unwrap_or_else(|| "None".to_string()),
            self.min_notional.normalize()
        )
    }
}

/// Closed candle reduced to what the strategy needs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandleSample {
    pub open: Decimal,
    pub close: Decimal,
    pub close_time: Option<DateTime<Utc>>,
}

impl CandleSample {
    pub fn new(open: Decimal, close: Decimal) -> Self {
        Self {
            open,
            close,
            close_time: None,
        }
    }

    pub fn with_close_time(mut self, close_time: DateTime<Utc>) -> Self {
        self.close_time = Some(close_time);
        self
    }

    pub fn is_green(&self) -> bool {
        self.close > self.open
    }

    pub fn is_red(&self) -> bool {
        self.close < self.open
    }
}

/// Trading signal
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_binance(self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_binance())
    }
}

/// Order status as reported by the exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Canceled,
    PendingCancel,
    Rejected,
    Expired,
    ExpiredInMatch,
    #[serde(other)]
    Unknown,
}

/// Exchange acknowledgement of a market order
#[derive(Debug, Clone, PartialEq)]
pub struct OrderAck {
    pub order_id: Option<u64>,
    pub executed_qty: Decimal,
    pub status: OrderStatus,
}

/// Market order as submitted and acknowledged
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub symbol: String,
    pub side: OrderSide,
    pub requested_qty: Decimal,
    pub executed_qty: Decimal,
    pub status: OrderStatus,
    pub order_id: Option<u64>,
}

impl Order {
    pub fn from_ack(symbol: &str, side: OrderSide, requested_qty: Decimal, ack: OrderAck) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            requested_qty,
            executed_qty: ack.executed_qty,
            status: ack.status,
            order_id: ack.order_id,
        }
    }

    /// True when the exchange reports a non-zero fill
    pub fn is_executed(&self) -> bool {
        self.executed_qty > Decimal::ZERO
            && !matches!(self.status, OrderStatus::Rejected | OrderStatus::New)
    }
}
