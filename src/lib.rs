// Core modules
pub mod api;
pub mod config;
pub mod execution;
pub mod models;
pub mod orchestrator;
pub mod risk;
pub mod strategy;
pub mod stream;

// Fakes for tests in this crate and under tests/
#[doc(hidden)]
pub mod testing;

// Re-export commonly used types
pub use api::{BinanceClient, Credentials, ExchangeGateway, GatewayError};
pub use config::BotConfig;
pub use models::*;
pub use orchestrator::{Orchestrator, OrchestratorReport, UnitExit};
pub use strategy::ThreeCandleStrike;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use stream::BinanceKlineStream;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Wire the Binance REST client and kline stream for `config` and trade until `shutdown`
pub async fn run_bot<F>(
    config: &BotConfig,
    credentials: Credentials,
    shutdown: F,
) -> Result<OrchestratorReport>
where
    F: Future<Output = ()>,
{
    let network = config.network;
    let gateway = BinanceClient::new(network.rest_url(), credentials, &config.rest)?;
    let stream = BinanceKlineStream::new(network.ws_url(), config.kline_interval.clone());

    let orchestrator = Orchestrator::new(
        Arc::new(gateway),
        Arc::new(stream),
        config.symbol_configs()?,
        config.reconnect.to_policy()?,
        Duration::from_secs(config.shutdown_grace_secs),
    );

    Ok(orchestrator.run(shutdown).await)
}
