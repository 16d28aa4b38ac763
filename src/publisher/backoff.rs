use std::time::Duration;

/// Shortest delay between retries.
pub const MIN_RETRY_DELAY: Duration = Duration::from_secs(1);
/// Longest delay between retries.
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(60 * 60);

/// Exponential reconnect delay, doubling from `min` up to `max`.
///
/// Both bounds are clamped to `MIN_RETRY_DELAY..=MAX_RETRY_DELAY`.
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        let min = min.clamp(MIN_RETRY_DELAY, MAX_RETRY_DELAY);
        let max = max.clamp(min, MAX_RETRY_DELAY);
        Self {
            min,
            max,
            current: min,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.min;
    }
}
