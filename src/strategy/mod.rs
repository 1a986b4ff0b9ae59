// Trading strategy module
pub mod three_candle;

pub use three_candle::ThreeCandleStrike;

use crate::models::{CandleSample, Signal};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    #[error("insufficient data: {have} candles, need {need}")]
    InsufficientData { have: usize, need: usize },
}

/// Base trait for candle-pattern strategies
pub trait Strategy: Send + Sync {
    /// Generate a trading signal from closed candles, oldest first
    fn generate_signal(&self, candles: &[CandleSample]) -> Result<Signal, StrategyError>;

    /// Get strategy name
    fn name(&self) -> &str;

    /// Minimum candles required for this strategy
    fn min_candles_required(&self) -> usize;
}
