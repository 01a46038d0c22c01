//! Sliding-window submission rate limiter.
//!
//! Each account keeps the timestamps of its recent submissions. A new
//! submission is allowed while fewer than `max_per_window` of them fall
//! inside the last `window_ms` milliseconds.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct RateWindow {
    /// Submission times in ms, monotonically non-decreasing.
    stamps: VecDeque<i64>,
    window_ms: u64,
    max_per_window: usize,
}

impl RateWindow {
    #[must_use]
    pub fn new(window_ms: u64, max_per_window: usize) -> Self {
        Self {
            stamps: VecDeque::with_capacity(max_per_window.min(64)),
            window_ms,
            max_per_window,
        }
    }

    /// Record a submission at `now` if the window has room.
    ///
    /// Returns `false`, recording nothing, when the limit is reached.
    pub fn check_and_record(&mut self, now: DateTime<Utc>) -> bool {
        let now_ms = now.timestamp_millis();
        self.prune(now_ms);
        if self.stamps.len() >= self.max_per_window {
            return false;
        }
        self.stamps.push_back(now_ms);
        true
    }

    /// Submissions still inside the window at `now`.
    #[must_use]
    pub fn count(&self, now: DateTime<Utc>) -> usize {
        let cutoff = cutoff(now.timestamp_millis(), self.window_ms);
        self.stamps.iter().filter(|&&at| at > cutoff).count()
    }

    fn prune(&mut self, now_ms: i64) {
        let cutoff = cutoff(now_ms, self.window_ms);
        while let Some(&front) = self.stamps.front() {
            if front <= cutoff {
                self.stamps.pop_front();
            } else {
                break;
            }
        }
    }
}

fn cutoff(now_ms: i64, window_ms: u64) -> i64 {
    now_ms.saturating_sub(i64::try_from(window_ms).unwrap_or(i64::MAX))
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + TimeDelta::milliseconds(ms)
    }

    #[test]
    fn allows_within_limit() {
        let mut window = RateWindow::new(1000, 5);
        for i in 0..5 {
            assert!(window.check_and_record(at(100 + i)), "submission {i} should pass");
        }
        assert_eq!(window.count(at(200)), 5);
    }

    #[test]
    fn blocks_exceeding_window() {
        let mut window = RateWindow::new(1000, 3);
        assert!(window.check_and_record(at(100)));
        assert!(window.check_and_record(at(200)));
        assert!(window.check_and_record(at(300)));
        assert!(!window.check_and_record(at(400)));
        // Rejected attempts are not recorded.
        assert_eq!(window.count(at(400)), 3);
    }

    #[test]
    fn window_slides() {
        let mut window = RateWindow::new(1000, 2);
        assert!(window.check_and_record(at(0)));
        assert!(window.check_and_record(at(500)));
        assert!(!window.check_and_record(at(999)));
        // The first stamp leaves the window at exactly 1000ms.
        assert!(window.check_and_record(at(1000)));
        assert!(!window.check_and_record(at(1200)));
        assert!(window.check_and_record(at(1500)));
    }
}
