// Helpers shared by the integration tests; the fakes live in strikebot::testing
#![allow(dead_code)]

use rust_decimal::Decimal;
use std::str::FromStr;

pub use strikebot::testing::{
    btc_filters, closed_kline as kline, FillMode, GatewayCall, LogCapture, MockGateway, Session,
    ScriptedFrame, ScriptedStream,
};

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn buy(quantity: Decimal) -> GatewayCall {
    GatewayCall::buy("BTCUSDT", quantity)
}

pub fn sell(quantity: Decimal) -> GatewayCall {
    GatewayCall::sell("BTCUSDT", quantity)
}
