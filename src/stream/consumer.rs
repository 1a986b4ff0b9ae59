use std::sync::Arc;
use tokio::sync::watch;

use super::reconnect::DisconnectKind;
use super::{
    parse_kline_message, KlineSubscription, MarketStream, ReconnectPolicy, StreamError,
    StreamFrame,
};
use crate::execution::SymbolEngine;

/// Why a subscription ended
#[derive(Debug)]
pub enum Disconnect {
    Closed { code: Option<u16>, reason: String },
    Error(StreamError),
    Shutdown,
}

/// Keeps one symbol subscribed and feeds closed candles to its engine
pub struct StreamConsumer {
    symbol: String,
    stream: Arc<dyn MarketStream>,
    policy: ReconnectPolicy,
}

impl StreamConsumer {
    pub fn new(
        symbol: impl Into<String>,
        stream: Arc<dyn MarketStream>,
        policy: ReconnectPolicy,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            stream,
            policy,
        }
    }

    /// Subscribe, pump frames, and resubscribe after every disconnect
    ///
    /// Returns only once `shutdown` flips to true (or its sender is dropped).
    /// Shutdown is checked between frames and during reconnect waits, never
    /// while the engine is handling a candle.
    pub async fn run(&self, engine: &mut SymbolEngine, mut shutdown: watch::Receiver<bool>) {
        let symbol = self.symbol.as_str();
        let mut attempt: u32 = 0;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let subscribed = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break,
                result = self.stream.subscribe(symbol) => result,
            };

            let disconnect = match subscribed {
                Ok(mut subscription) => {
                    tracing::info!("[{}] WebSocket connected, monitoring candles", symbol);
                    let (disconnect, received) =
                        self.pump(subscription.as_mut(), engine, &mut shutdown).await;
                    // A connection that never delivered data keeps backing off
                    if received > 0 {
                        attempt = 0;
                    }
                    disconnect
                }
                Err(e) => Disconnect::Error(e),
            };

            attempt = attempt.saturating_add(1);
            let delay = match &disconnect {
                Disconnect::Shutdown => break,
                Disconnect::Closed { code, reason } => {
                    let delay = self.policy.delay(DisconnectKind::Closed, attempt);
                    tracing::warn!(
                        "[{}] WebSocket closed: code={:?}, reason={}. Reconnecting in {:?}",
                        symbol,
                        code,
                        reason,
                        delay
                    );
                    delay
                }
                Disconnect::Error(e) => {
                    let delay = self.policy.delay(DisconnectKind::Error, attempt);
                    tracing::error!(
                        "[{}] WebSocket error: {}. Reconnecting in {:?}",
                        symbol,
                        e,
                        delay
                    );
                    delay
                }
            };

            tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut shutdown) => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        tracing::info!("[{}] Stream consumer stopped", symbol);
    }

    /// Feed frames to the engine until the subscription ends; also returns the text frame count
    async fn pump(
        &self,
        subscription: &mut dyn KlineSubscription,
        engine: &mut SymbolEngine,
        shutdown: &mut watch::Receiver<bool>,
    ) -> (Disconnect, usize) {
        let mut received = 0;
        loop {
            let frame = tokio::select! {
                biased;
                _ = wait_for_shutdown(shutdown) => return (Disconnect::Shutdown, received),
                frame = subscription.next_frame() => frame,
            };

            match frame {
                Ok(StreamFrame::Text(text)) => {
                    received += 1;
                    match parse_kline_message(&text) {
                        // Awaited inline: the next frame waits for this candle
                        Ok(Some(sample)) => {
                            engine.on_candle(sample).await;
                        }
                        Ok(None) => {}
                        Err(e) => {
                            let preview: String = text.chars().take(100).collect();
                            tracing::warn!(
                                "[{}] WebSocket message error: {}. Message: {}...",
                                self.symbol,
                                e,
                                preview
                            );
                        }
                    }
                }
                Ok(StreamFrame::Closed { code, reason }) => {
                    return (Disconnect::Closed { code, reason }, received);
                }
                Err(e) => return (Disconnect::Error(e), received),
            }
        }
    }
}

/// Resolves once the shutdown flag is set
pub(crate) async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    // A dropped sender also means stop
    let _ = shutdown.wait_for(|stop| *stop).await;
}
