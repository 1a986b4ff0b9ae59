use rand::Rng;
use std::time::Duration;

/// Cause of the wait before a resubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectKind {
    /// Server closed the stream cleanly
    Closed,
    /// Connect failure or transport error
    Error,
}

/// How long to wait before resubscribing
///
/// There is no retry cap: every policy keeps producing delays forever.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectPolicy {
    Fixed {
        after_close: Duration,
        after_error: Duration,
    },
    Exponential {
        base: Duration,
        max: Duration,
        jitter: Duration,
    },
}

impl ReconnectPolicy {
    pub fn fixed(after_close: Duration, after_error: Duration) -> Self {
        Self::Fixed {
            after_close,
            after_error,
        }
    }

    pub fn exponential(base: Duration, max: Duration, jitter: Duration) -> Self {
        Self::Exponential { base, max, jitter }
    }

    /// Delay before attempt number `attempt` (1-based count of consecutive failures)
    pub fn delay(&self, kind: DisconnectKind, attempt: u32) -> Duration {
        match self {
            Self::Fixed {
                after_close,
                after_error,
            } => match kind {
                DisconnectKind::Closed => *after_close,
                DisconnectKind::Error => *after_error,
            },
            Self::Exponential { base, max, jitter } => {
                let base_ms = base.as_millis().max(1) as u64;
                let cap_ms = max.as_millis().max(1) as u64;
                let shift = attempt.saturating_sub(1).min(16);
                let multiplier = 1u64.checked_shl(shift).unwrap_or(u64::MAX);
                let backoff_ms = base_ms.saturating_mul(multiplier).min(cap_ms);

                let jitter_ms = jitter.as_millis() as u64;
                let extra_ms = if jitter_ms > 0 {
                    rand::thread_rng().gen_range(0..=jitter_ms)
                } else {
                    0
                };

                Duration::from_millis(backoff_ms + extra_ms)
            }
        }
    }
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::fixed(Duration::from_secs(5), Duration::from_secs(10))
    }
}
