// Market data streaming and the per-symbol consumer loop
pub mod binance_ws;
pub mod consumer;
pub mod kline;
pub mod reconnect;

pub use binance_ws::BinanceKlineStream;
pub use consumer::{Disconnect, StreamConsumer};
pub use kline::{parse_kline_message, KlineParseError};
pub use reconnect::{DisconnectKind, ReconnectPolicy};

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("websocket connect failed: {0}")]
    Connect(#[source] Box<tokio_tungstenite::tungstenite::Error>),
    #[error("websocket transport error: {0}")]
    Transport(#[source] Box<tokio_tungstenite::tungstenite::Error>),
    #[error("stream error: {0}")]
    Other(String),
}

/// One inbound unit from a subscription
#[derive(Debug, Clone, PartialEq)]
pub enum StreamFrame {
    Text(String),
    /// Graceful end of the subscription
    Closed { code: Option<u16>, reason: String },
}

/// Factory for per-symbol candle subscriptions
#[async_trait]
pub trait MarketStream: Send + Sync {
    async fn subscribe(&self, symbol: &str) -> Result<Box<dyn KlineSubscription>, StreamError>;
}

/// Live subscription yielding frames in arrival order
#[async_trait]
pub trait KlineSubscription: Send {
    async fn next_frame(&mut self) -> Result<StreamFrame, StreamError>;
}
