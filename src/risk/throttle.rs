use chrono::{DateTime, Utc};
use std::time::Duration;

/// Minimum spacing between trading actions on one symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionThrottle {
    min_interval: Duration,
}

impl ActionThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self { min_interval }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Whether a new action may be taken at `now`
    ///
    /// A clock that went backwards counts as zero elapsed time.
    pub fn permits(&self, last_action: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        let Some(last) = last_action else {
            return true;
        };

        let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
        elapsed >= self.min_interval
    }
}
