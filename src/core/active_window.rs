//! The daily active window.

use chrono::{Duration, NaiveDateTime, NaiveTime};

/// Time-of-day interval during which recording and detection run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ActiveWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Strictly inside the window; both boundaries are outside.
    pub fn contains(&self, now: NaiveDateTime) -> bool {
        let t = now.time();
        self.start < t && t < self.end
    }

    /// The window's end on the day of `now`.
    pub fn end_on(&self, now: NaiveDateTime) -> NaiveDateTime {
        now.date().and_time(self.end)
    }

    /// Next instant the window opens.
    ///
    /// Today's start, or tomorrow's once today's window has closed. Inside
    /// today's window the result is already in the past.
    pub fn next_start(&self, now: NaiveDateTime) -> NaiveDateTime {
        let start_today = now.date().and_time(self.start);
        if now.time() >= self.end {
            start_today + Duration::days(1)
        } else {
            start_today
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn window() -> ActiveWindow {
        ActiveWindow::new(
            NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(19, 0, 0).unwrap(),
        )
    }

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_contains_is_strict() {
        let w = window();
        assert!(!w.contains(at(1, 7, 0)));
        assert!(w.contains(at(1, 7, 1)));
        assert!(w.contains(at(1, 18, 59)));
        assert!(!w.contains(at(1, 19, 0)));
        assert!(!w.contains(at(1, 2, 0)));
    }

    #[test]
    fn test_next_start_before_dawn() {
        assert_eq!(window().next_start(at(1, 3, 30)), at(1, 7, 0));
    }

    #[test]
    fn test_next_start_after_dusk() {
        assert_eq!(window().next_start(at(1, 21, 15)), at(2, 7, 0));
    }

    #[test]
    fn test_next_start_at_window_end() {
        assert_eq!(window().next_start(at(1, 19, 0)), at(2, 7, 0));
    }

    #[test]
    fn test_end_on() {
        assert_eq!(window().end_on(at(3, 9, 0)), at(3, 19, 0));
    }
}
