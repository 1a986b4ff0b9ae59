// Risk controls applied before acting on a signal
pub mod throttle;

pub use throttle::ActionThrottle;
