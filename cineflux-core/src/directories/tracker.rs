use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};

use cineflux_model::DirectoryStatus;

#[derive(Debug, Default)]
struct TrackerState {
    queue: u32,
    successes: Vec<DateTime<Utc>>,
    failures: Vec<DateTime<Utc>>,
    last_request: Option<DateTime<Utc>>,
}

/// Per-client request accounting behind [`DirectoryStatus`].
///
/// Counts are kept over a rolling 24 hour window; older entries are pruned
/// on every completed request.
#[derive(Debug, Default)]
pub struct RequestTracker {
    state: Mutex<TrackerState>,
}

/// Keeps the in-flight count accurate even when a request future is dropped
/// mid-way.
#[derive(Debug)]
pub struct QueueGuard<'a> {
    tracker: &'a RequestTracker,
}

impl Drop for QueueGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.tracker.state.lock().unwrap_or_else(|e| e.into_inner());
        state.queue = state.queue.saturating_sub(1);
    }
}

impl RequestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a request as entering the queue.
    pub fn begin(&self) -> QueueGuard<'_> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.queue += 1;
        QueueGuard { tracker: self }
    }

    pub fn record_success(&self) {
        self.record(true);
    }

    pub fn record_failure(&self) {
        self.record(false);
    }

    fn record(&self, success: bool) {
        let now = Utc::now();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.last_request = Some(now);
        if success {
            state.successes.push(now);
        } else {
            state.failures.push(now);
        }
        let cutoff = now - Duration::hours(24);
        state.successes.retain(|t| *t >= cutoff);
        state.failures.retain(|t| *t >= cutoff);
    }

    pub fn snapshot(&self, name: &str) -> DirectoryStatus {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        DirectoryStatus {
            name: name.to_owned(),
            queue: state.queue,
            successes: state.successes.len() as u32,
            failures: state.failures.len() as u32,
            last_request: state.last_request,
        }
    }
}
