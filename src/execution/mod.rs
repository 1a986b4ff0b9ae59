// Per-symbol trading engine: candle window, position state and order execution
pub mod candle_window;
pub mod engine;
pub mod executor;
pub mod position;
pub mod quantization;

pub use candle_window::{CandleWindow, WINDOW_CAPACITY};
pub use engine::{CycleOutcome, SymbolEngine};
pub use executor::{ExecutionOutcome, OrderExecutor};
pub use position::{PositionPhase, PositionState};
pub use quantization::{
    quantize_buy, quantize_sell, round_down_to_step, validate_notional, QuantizationRejection,
};
