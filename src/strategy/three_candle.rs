use super::{Strategy, StrategyError};
use crate::models::{CandleSample, Signal};

/// Candles examined per evaluation
pub const PATTERN_LEN: usize = 3;

/// Three-candle strike pattern
///
/// Looks only at the three most recent closed candles:
/// - three strictly green candles (close > open) => Buy
/// - three strictly red candles (close < open) => Sell
/// - anything else, including a single doji, => Hold
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreeCandleStrike;

impl ThreeCandleStrike {
    pub fn new() -> Self {
        Self
    }

    /// Pure pattern check over exactly three candles
    pub fn classify(window: &[CandleSample; PATTERN_LEN]) -> Signal {
        if window.iter().all(CandleSample::is_green) {
            Signal::Buy
        } else if window.iter().all(CandleSample::is_red) {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }
}

impl Strategy for ThreeCandleStrike {
    fn generate_signal(&self, candles: &[CandleSample]) -> Result<Signal, StrategyError> {
        if candles.len() < PATTERN_LEN {
            return Err(StrategyError::InsufficientData {
                have: candles.len(),
                need: PATTERN_LEN,
            });
        }

        let tail = &candles[candles.len() - PATTERN_LEN..];
        let window: &[CandleSample; PATTERN_LEN] =
            tail.try_into().map_err(|_| StrategyError::InsufficientData {
                have: tail.len(),
                need: PATTERN_LEN,
            })?;

        Ok(Self::classify(window))
    }

    fn name(&self) -> &str {
        "Three Candle Strike"
    }

    fn min_candles_required(&self) -> usize {
        PATTERN_LEN
    }
}
