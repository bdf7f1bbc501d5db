use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Sliding-window event limiter keyed by client address.
///
/// Each key holds a time-ordered list of event instants. Entries older than
/// the window are pruned lazily on access; a key is limited once the surviving
/// count reaches `max_events`. A successful login does not clear the address
/// history; lockout ends only when the window slides past the failures.
#[derive(Debug)]
pub struct SlidingWindowLimiter {
    max_events: usize,
    window: Duration,
    events: DashMap<String, Vec<Instant>>,
}

impl SlidingWindowLimiter {
    #[must_use]
    pub fn new(max_events: usize, window: Duration) -> Self {
        Self {
            max_events,
            window,
            events: DashMap::new(),
        }
    }

    #[must_use]
    pub fn is_limited(&self, key: &str) -> bool {
        self.is_limited_at(key, Instant::now())
    }

    pub fn record(&self, key: &str) {
        self.record_at(key, Instant::now());
    }

    fn is_limited_at(&self, key: &str, now: Instant) -> bool {
        let limited = {
            let Some(mut events) = self.events.get_mut(key) else {
                return false;
            };
            if let Some(cutoff) = now.checked_sub(self.window) {
                let expired = events.partition_point(|t| *t < cutoff);
                events.drain(..expired);
            }
            events.len() >= self.max_events
        };
        // guard dropped above: removing while holding it would deadlock the shard
        self.events.remove_if(key, |_, events| events.is_empty());
        limited
    }

    fn record_at(&self, key: &str, now: Instant) {
        self.events.entry(key.to_owned()).or_default().push(now);
    }
}
