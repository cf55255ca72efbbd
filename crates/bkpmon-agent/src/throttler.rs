// Per-key diagnostic throttling for the scheduler's "waiting for window"
// messages, so a 60s polling cadence does not flood the tail log with one
// line per task per tick.

use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default minimum spacing between identical diagnostics.
const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);

/// Rate-limits messages by key: at most one emission per key per interval.
pub struct MessageThrottler {
    interval: Duration,
    last_emitted: HashMap<String, Instant>,
}

impl MessageThrottler {
    /// Create a throttler with the default interval.
    pub fn new() -> Self {
        Self::with_interval(DEFAULT_INTERVAL)
    }

    /// Create a throttler with an explicit interval.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last_emitted: HashMap::new(),
        }
    }

    /// Returns `true` when a message for `key` may be emitted now, and
    /// records the emission.
    pub fn should_emit(&mut self, key: &str) -> bool {
        let now = Instant::now();
        match self.last_emitted.get(key) {
            Some(last) if now.duration_since(*last) < self.interval => false,
            _ => {
                self.last_emitted.insert(key.to_string(), now);
                true
            }
        }
    }

    /// Forget a key, so its next message emits immediately.
    pub fn reset(&mut self, key: &str) {
        self.last_emitted.remove(key);
    }
}

impl Default for MessageThrottler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_emission_passes_second_is_suppressed() {
        let mut throttler = MessageThrottler::with_interval(Duration::from_secs(60));
        assert!(throttler.should_emit("task|12:00"));
        assert!(!throttler.should_emit("task|12:00"));
    }

    #[test]
    fn keys_are_independent() {
        let mut throttler = MessageThrottler::with_interval(Duration::from_secs(60));
        assert!(throttler.should_emit("task|12:00"));
        assert!(throttler.should_emit("task|18:00"));
        assert!(throttler.should_emit("other|12:00"));
    }

    #[test]
    fn zero_interval_never_suppresses() {
        let mut throttler = MessageThrottler::with_interval(Duration::ZERO);
        assert!(throttler.should_emit("task|12:00"));
        assert!(throttler.should_emit("task|12:00"));
    }

    #[test]
    fn reset_rearms_a_key() {
        let mut throttler = MessageThrottler::with_interval(Duration::from_secs(60));
        assert!(throttler.should_emit("task|12:00"));
        throttler.reset("task|12:00");
        assert!(throttler.should_emit("task|12:00"));
    }
}
