//! Outbound request rate limiting.
//!
//! [`RateLimiter`] keeps a sliding log of reserved request slots. For
//! fractional limits (e.g. 0.2 req/s) slots are pre-booked in the future, so
//! a burst of callers queues up one interval apart instead of all firing once
//! the oldest timestamp ages out.

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use tokio::time::{sleep, Duration, Instant};

#[derive(Debug)]
struct LimiterState {
    slots: Vec<Instant>,
    last_touch: Instant,
}

#[derive(Debug)]
pub struct RateLimiter {
    capacity: usize,
    interval: Duration,
    state: Mutex<LimiterState>,
}

impl RateLimiter {
    /// `limit_per_second` may be fractional; 0.2 means one request every
    /// five seconds.
    pub fn new(limit_per_second: f64) -> Self {
        let limit = limit_per_second.max(f64::MIN_POSITIVE);
        let capacity = (limit.floor() as usize).max(1);
        let interval = Duration::from_secs_f64(capacity as f64 / limit);
        Self {
            capacity,
            interval,
            state: Mutex::new(LimiterState {
                slots: Vec::new(),
                last_touch: Instant::now(),
            }),
        }
    }

    fn prune(&self, state: &mut LimiterState, now: Instant) {
        let horizon = now.checked_sub(self.interval);
        if let Some(horizon) = horizon {
            state.slots.retain(|slot| *slot > horizon);
        }
    }

    fn delay_locked(&self, state: &mut LimiterState, now: Instant) -> Duration {
        self.prune(state, now);
        state.last_touch = now;
        if state.slots.len() < self.capacity {
            return Duration::ZERO;
        }
        let anchor = state.slots[state.slots.len() - self.capacity];
        (anchor + self.interval).saturating_duration_since(now)
    }

    fn record(&self, state: &mut LimiterState, slot: Instant) {
        let idx = state.slots.partition_point(|s| *s <= slot);
        state.slots.insert(idx, slot);
    }

    /// Delay the next request would have to wait right now. Does not record
    /// anything.
    pub fn delay(&self) -> Duration {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.delay_locked(&mut state, now)
    }

    /// Reserves a slot and suspends the caller until it is due.
    pub async fn throttle(&self) {
        let wait = {
            let now = Instant::now();
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let wait = self.delay_locked(&mut state, now);
            self.record(&mut state, now + wait);
            wait
        };
        if !wait.is_zero() {
            sleep(wait).await;
        }
    }

    /// Non-blocking mode: returns true (recording nothing) when the request
    /// would have to wait, otherwise records it and returns false.
    pub fn should_reject(&self) -> bool {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if !self.delay_locked(&mut state, now).is_zero() {
            return true;
        }
        self.record(&mut state, now);
        false
    }

    fn idle_for(&self, now: Instant) -> Duration {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        now.saturating_duration_since(state.last_touch)
    }
}

/// Keyed collection of limiters, owned by whichever component needs them.
///
/// Keys accumulate as new identities show up, so owners are expected to call
/// [`RateLimiterRegistry::evict_idle`] periodically to drop limiters nothing
/// has touched recently.
#[derive(Debug, Default)]
pub struct RateLimiterRegistry {
    limiters: DashMap<String, Arc<RateLimiter>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches the limiter for `key`, creating it at `limit_per_second` on
    /// first use. The limit is fixed for the lifetime of the entry.
    pub fn get(&self, key: &str, limit_per_second: f64) -> Arc<RateLimiter> {
        self.limiters
            .entry(key.to_owned())
            .or_insert_with(|| Arc::new(RateLimiter::new(limit_per_second)))
            .clone()
    }

    /// Removes limiters idle for longer than `max_idle`; returns how many
    /// were dropped.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let now = Instant::now();
        let before = self.limiters.len();
        self.limiters
            .retain(|_, limiter| limiter.idle_for(now) <= max_idle);
        before - self.limiters.len()
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}
