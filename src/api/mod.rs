// Exchange REST access
pub mod binance;

pub use binance::{BinanceClient, Credentials};

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{ExchangeFilters, OrderAck};

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("http request error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("exchange api error (status {status}, code {code:?}): {msg}")]
    Api {
        status: u16,
        code: Option<i64>,
        msg: String,
    },
    #[error("symbol {0} not found")]
    SymbolNotFound(String),
    #[error("invalid {field} value '{value}' in exchange response")]
    InvalidNumber { field: &'static str, value: String },
    #[error("failed to sign request: {0}")]
    Signature(String),
}

impl GatewayError {
    /// Worth retrying for idempotent reads
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Blocking-from-the-caller's-view access to the exchange
///
/// One instance is shared by every symbol engine; implementations must not
/// keep per-symbol mutable state.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Lot-size, price and notional filters for a symbol
    async fn symbol_filters(&self, symbol: &str) -> Result<ExchangeFilters, GatewayError>;

    /// Latest traded price
    async fn current_price(&self, symbol: &str) -> Result<Decimal, GatewayError>;

    /// Market buy of `quantity` base units
    async fn place_market_buy(
        &self,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<OrderAck, GatewayError>;

    /// Market sell of `quantity` base units
    async fn place_market_sell(
        &self,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<OrderAck, GatewayError>;
}
