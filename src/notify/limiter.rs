//! Cooldown and cap gate in front of the alert transport.

use chrono::{Duration, NaiveDateTime};
use tracing::debug;

/// Rate limiter state.
///
/// The "daily" cap is scoped to one active session: [`RateLimiter::reset`]
/// runs at session end, which with one session per day amounts to a daily cap.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    max_per_day: u32,
    last_sent_at: Option<NaiveDateTime>,
    count_today: u32,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, max_per_day: u32) -> Self {
        Self {
            min_interval,
            max_per_day,
            last_sent_at: None,
            count_today: 0,
        }
    }

    /// Whether an alert may go out at `now`.
    pub fn check_conditions(&self, now: NaiveDateTime) -> bool {
        if let Some(last) = self.last_sent_at {
            if now - last < self.min_interval {
                debug!("min notification interval has not elapsed, rejecting notification request");
                return false;
            }
        }
        if self.count_today >= self.max_per_day {
            debug!("max notifications per day reached, rejecting notification request");
            return false;
        }
        true
    }

    /// Record a confirmed send.
    pub fn record_sent(&mut self, now: NaiveDateTime) {
        self.last_sent_at = Some(now);
        self.count_today += 1;
    }

    pub fn count_today(&self) -> u32 {
        self.count_today
    }

    pub fn last_sent_at(&self) -> Option<NaiveDateTime> {
        self.last_sent_at
    }

    pub fn reset(&mut self) {
        self.count_today = 0;
        self.last_sent_at = None;
    }
}
