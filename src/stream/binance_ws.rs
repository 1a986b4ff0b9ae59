use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use super::{KlineSubscription, MarketStream, StreamError, StreamFrame};

/// Binance raw-stream kline subscriptions
#[derive(Debug, Clone)]
pub struct BinanceKlineStream {
    ws_url: String,
    interval: String,
}

impl BinanceKlineStream {
    pub fn new(ws_url: impl Into<String>, interval: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into(),
            interval: interval.into(),
        }
    }

    pub fn stream_name(&self, symbol: &str) -> String {
        format!("{}@kline_{}", symbol.to_lowercase(), self.interval)
    }

    pub fn stream_url(&self, symbol: &str) -> String {
        format!(
            "{}/{}",
            self.ws_url.trim_end_matches('/'),
            self.stream_name(symbol)
        )
    }
}

#[async_trait]
impl MarketStream for BinanceKlineStream {
    async fn subscribe(&self, symbol: &str) -> Result<Box<dyn KlineSubscription>, StreamError> {
        let url = self.stream_url(symbol);
        tracing::debug!(%url, "opening kline stream");

        let (socket, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| StreamError::Connect(Box::new(e)))?;

        Ok(Box::new(BinanceKlineSubscription { socket }))
    }
}

struct BinanceKlineSubscription {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl KlineSubscription for BinanceKlineSubscription {
    async fn next_frame(&mut self) -> Result<StreamFrame, StreamError> {
        loop {
            let Some(msg) = self.socket.next().await else {
                return Ok(StreamFrame::Closed {
                    code: None,
                    reason: "stream ended".to_string(),
                });
            };

            match msg.map_err(|e| StreamError::Transport(Box::new(e)))? {
                Message::Text(text) => return Ok(StreamFrame::Text(text)),
                Message::Ping(payload) => {
                    // Binance drops connections that miss pongs
                    self.socket
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|e| StreamError::Transport(Box::new(e)))?;
                }
                Message::Close(frame) => {
                    let (code, reason) = match frame {
                        Some(f) => (Some(u16::from(f.code)), f.reason.into_owned()),
                        None => (None, String::new()),
                    };
                    return Ok(StreamFrame::Closed { code, reason });
                }
                Message::Pong(_) | Message::Binary(_) | Message::Frame(_) => continue,
            }
        }
    }
}
