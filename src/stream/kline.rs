use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::str::FromStr;
use thiserror::Error;

use crate::models::CandleSample;

#[derive(Debug, Error)]
pub enum KlineParseError {
    #[error("failed to parse json payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid {field} value '{value}' in kline")]
    InvalidNumber { field: &'static str, value: String },
}

/// `<symbol>@kline_<interval>` event
#[derive(Debug, Deserialize)]
struct KlineEvent {
    #[serde(rename = "k")]
    kline: Option<KlinePayload>,
}

#[derive(Debug, Deserialize)]
struct KlinePayload {
    #[serde(rename = "T")]
    close_time_ms: Option<i64>,
    #[serde(rename = "o")]
    open: String,
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "x", default)]
    is_closed: bool,
}

/// Decode a kline frame
///
/// Returns `Ok(None)` for candles still forming and for frames that carry
/// no kline at all (subscription acks and similar).
pub fn parse_kline_message(raw: &str) -> Result<Option<CandleSample>, KlineParseError> {
    let event: KlineEvent = serde_json::from_str(raw)?;

    let Some(kline) = event.kline else {
        return Ok(None);
    };

    if !kline.is_closed {
        return Ok(None);
    }

    let open = parse_price("open", &kline.open)?;
    let close = parse_price("close", &kline.close)?;

    let mut sample = CandleSample::new(open, close);
    if let Some(close_time) = kline.close_time_ms.and_then(millis_to_utc) {
        sample = sample.with_close_time(close_time);
    }

    Ok(Some(sample))
}

fn parse_price(field: &'static str, raw: &str) -> Result<Decimal, KlineParseError> {
    Decimal::from_str(raw).map_err(|_| KlineParseError::InvalidNumber {
        field,
        value: raw.to_string(),
    })
}

fn millis_to_utc(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}
