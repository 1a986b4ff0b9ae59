use async_trait::async_trait;
use chrono::Utc;
use governor::{Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Response};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::fmt;
use std::num::NonZeroU32;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use uuid::Uuid;

use super::{ExchangeGateway, GatewayError};
use crate::config::RestSettings;
use crate::models::{ExchangeFilters, OrderAck, OrderSide, OrderStatus};

// Binance Spot REST API
// Docs: https://developers.binance.com/docs/binance-spot-api-docs/rest-api
const MBX_API_KEY_HEADER: &str = "X-MBX-APIKEY";
const INVALID_SYMBOL_CODE: i64 = -1121;
const INITIAL_BACKOFF_MS: u64 = 500;

// Used when a filter is present but omits its value
const DEFAULT_STEP_SIZE: &str = "0.001";
const DEFAULT_TICK_SIZE: &str = "0.000001";

type HmacSha256 = Hmac<Sha256>;

type BinanceRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// API key pair for signed endpoints
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .field("api_secret", &"<redacted>")
            .finish()
    }
}

/// Client for the Binance spot REST API
///
/// Cloneable; all clones share the HTTP pool and the rate limiter.
#[derive(Clone)]
pub struct BinanceClient {
    http: Client,
    rest_url: String,
    credentials: Credentials,
    recv_window_ms: u64,
    max_retries: u32,
    rate_limiter: Arc<BinanceRateLimiter>,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoResponse {
    symbols: Vec<ExchangeInfoSymbol>,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfoSymbol {
    symbol: String,
    #[serde(default)]
    filters: Vec<ExchangeFilterEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExchangeFilterEntry {
    filter_type: String,
    step_size: Option<String>,
    tick_size: Option<String>,
    min_notional: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TickerPriceResponse {
    price: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: u64,
    #[serde(default)]
    executed_qty: String,
    status: OrderStatus,
}

#[derive(Debug, Deserialize)]
struct BinanceErrorResponse {
    code: Option<i64>,
    msg: Option<String>,
}

impl BinanceClient {
    pub fn new(
        rest_url: impl Into<String>,
        credentials: Credentials,
        settings: &RestSettings,
    ) -> Result<Self, GatewayError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        let per_minute = NonZeroU32::new(settings.requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = Arc::new(RateLimiter::direct(Quota::per_minute(per_minute)));

        Ok(Self {
            http,
            rest_url: rest_url.into().trim_end_matches('/').to_string(),
            credentials,
            recv_window_ms: settings.recv_window_ms,
            max_retries: settings.max_retries.max(1),
            rate_limiter,
        })
    }

    pub fn rest_url(&self) -> &str {
        &self.rest_url
    }

    /// Unsigned GET with retry on transient failures
    async fn get_public<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, GatewayError> {
        let mut attempt = 1;

        loop {
            match self.get_public_once(path, params).await {
                Ok(value) => {
                    if attempt > 1 {
                        tracing::info!(path, attempt, "request succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let backoff_ms = INITIAL_BACKOFF_MS * 2_u64.pow(attempt - 1);
                    tracing::warn!(
                        "Attempt {}/{} for {} failed: {}. Retrying in {}ms...",
                        attempt,
                        self.max_retries,
                        path,
                        e,
                        backoff_ms
                    );
                    sleep(Duration::from_millis(backoff_ms)).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_public_once<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, GatewayError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}{}", self.rest_url, path);
        let response = self.http.get(&url).query(params).send().await?;
        decode_response(response).await
    }

    /// Signed MARKET order; never retried
    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: Decimal,
    ) -> Result<OrderAck, GatewayError> {
        let client_order_id = format!("sb{}", Uuid::new_v4().simple());
        let query = format!(
            "symbol={}&side={}&type=MARKET&quantity={}&newClientOrderId={}&newOrderRespType=FULL&recvWindow={}&timestamp={}",
            symbol,
            side.as_binance(),
            quantity.normalize(),
            client_order_id,
            self.recv_window_ms,
            Utc::now().timestamp_millis()
        );
        let signature = signature_hex(&self.credentials.api_secret, &query)?;
        let url = format!(
            "{}/api/v3/order?{}&signature={}",
            self.rest_url, query, signature
        );

        self.rate_limiter.until_ready().await;

        tracing::debug!(symbol, side = %side, %client_order_id, "submitting market order");

        let response = self
            .http
            .post(&url)
            .header(MBX_API_KEY_HEADER, &self.credentials.api_key)
            .send()
            .await?;
        let payload: OrderResponse = decode_response(response).await?;

        Ok(OrderAck {
            order_id: Some(payload.order_id),
            executed_qty: parse_decimal("executedQty", &payload.executed_qty)?,
            status: payload.status,
        })
    }
}

#[async_trait]
impl ExchangeGateway for BinanceClient {
    async fn symbol_filters(&self, symbol: &str) -> Result<ExchangeFilters, GatewayError> {
        let symbol_upper = symbol.to_uppercase();

        let response: ExchangeInfoResponse = match self
            .get_public("/api/v3/exchangeInfo", &[("symbol", symbol_upper.as_str())])
            .await
        {
            Ok(response) => response,
            Err(GatewayError::Api {
                code: Some(INVALID_SYMBOL_CODE),
                ..
            }) => return Err(GatewayError::SymbolNotFound(symbol_upper)),
            Err(e) => return Err(e),
        };

        let info = response
            .symbols
            .into_iter()
            .find(|s| s.symbol.eq_ignore_ascii_case(&symbol_upper))
            .ok_or_else(|| GatewayError::SymbolNotFound(symbol_upper.clone()))?;

        parse_filters(&info.filters)
    }

    async fn current_price(&self, symbol: &str) -> Result<Decimal, GatewayError> {
        let symbol_upper = symbol.to_uppercase();
        let ticker: TickerPriceResponse = self
            .get_public("/api/v3/ticker/price", &[("symbol", symbol_upper.as_str())])
            .await?;

        parse_decimal("price", &ticker.price)
    }

    async fn place_market_buy(
        &self,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<OrderAck, GatewayError> {
        self.place_market_order(symbol, OrderSide::Buy, quantity)
            .await
    }

    async fn place_market_sell(
        &self,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<OrderAck, GatewayError> {
        self.place_market_order(symbol, OrderSide::Sell, quantity)
            .await
    }
}

async fn decode_response<T: DeserializeOwned>(response: Response) -> Result<T, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response.json::<T>().await?);
    }

    let body = response.text().await.unwrap_or_default();
    let parsed: Option<BinanceErrorResponse> = serde_json::from_str(&body).ok();
    let code = parsed.as_ref().and_then(|p| p.code);
    let msg = parsed.and_then(|p| p.msg).unwrap_or(body);

    Err(GatewayError::Api {
        status: status.as_u16(),
        code,
        msg,
    })
}

fn parse_filters(entries: &[ExchangeFilterEntry]) -> Result<ExchangeFilters, GatewayError> {
    let mut step_size = None;
    let mut tick_size = None;
    let mut min_notional = None;

    for entry in entries {
        match entry.filter_type.as_str() {
            "LOT_SIZE" => {
                let raw = entry.step_size.as_deref().unwrap_or(DEFAULT_STEP_SIZE);
                step_size = Some(parse_decimal("stepSize", raw)?);
            }
            "PRICE_FILTER" => {
                let raw = entry.tick_size.as_deref().unwrap_or(DEFAULT_TICK_SIZE);
                tick_size = Some(parse_decimal("tickSize", raw)?);
            }
            "MIN_NOTIONAL" | "NOTIONAL" => {
                if let Some(raw) = entry.min_notional.as_deref() {
                    min_notional = Some(parse_decimal("minNotional", raw)?);
                }
            }
            _ => {}
        }
    }

    Ok(ExchangeFilters::new(step_size, tick_size, min_notional))
}

fn parse_decimal(field: &'static str, raw: &str) -> Result<Decimal, GatewayError> {
    Decimal::from_str(raw.trim()).map_err(|_| GatewayError::InvalidNumber {
        field,
        value: raw.to_string(),
    })
}

fn signature_hex(secret: &str, payload: &str) -> Result<String, GatewayError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| GatewayError::Signature(e.to_string()))?;
    mac.update(payload.as_bytes());
    let digest = mac.finalize().into_bytes();

    Ok(digest.iter().map(|b| format!("{:02x}", b)).collect())
}
