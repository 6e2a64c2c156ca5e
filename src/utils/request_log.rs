use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

pub const WINDOW_MINUTES: [i64; 4] = [1, 5, 10, 30];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowCounts {
    pub last_1min: usize,
    pub last_5min: usize,
    pub last_10min: usize,
    pub last_30min: usize,
}

impl WindowCounts {
    pub fn render(&self) -> String {
        format!(
            "Amount of requests in the past:\n1min: {}\n5min: {}\n10min: {}\n30min: {}",
            self.last_1min, self.last_5min, self.last_10min, self.last_30min
        )
    }
}

/// Timestamps of accepted generation requests for this process. Anything
/// older than the widest window is dropped on append.
#[derive(Debug, Default)]
pub struct RequestLog {
    entries: Mutex<VecDeque<DateTime<Utc>>>,
}

impl RequestLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn retention() -> Duration {
        Duration::minutes(WINDOW_MINUTES[WINDOW_MINUTES.len() - 1])
    }

    pub fn record(&self, at: DateTime<Utc>) {
        let mut entries = self.entries.lock();
        let cutoff = at - Self::retention();
        while entries.front().is_some_and(|oldest| *oldest <= cutoff) {
            entries.pop_front();
        }
        entries.push_back(at);
    }

    /// Entries strictly newer than `now - window`.
    pub fn count_since(&self, now: DateTime<Utc>, window: Duration) -> usize {
        let cutoff = now - window;
        self.entries
            .lock()
            .iter()
            .filter(|timestamp| **timestamp > cutoff)
            .count()
    }

    pub fn window_counts(&self, now: DateTime<Utc>) -> WindowCounts {
        let [one, five, ten, thirty] =
            WINDOW_MINUTES.map(|minutes| self.count_since(now, Duration::minutes(minutes)));
        WindowCounts {
            last_1min: one,
            last_5min: five,
            last_10min: ten,
            last_30min: thirty,
        }
    }

    /// Appends `now` and returns the counts including it.
    pub fn record_and_count(&self, now: DateTime<Utc>) -> WindowCounts {
        self.record(now);
        self.window_counts(now)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}
