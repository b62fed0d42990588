//! Deadlines driving the active session loop.
//!
//! Each periodic action is a tagged `(trigger, deadline)` pair. Every tick the
//! loop asks which triggers are due against one `now`, then runs them in the
//! fixed order of [`Trigger::ORDER`].

use chrono::{Duration, DurationRound, NaiveDateTime};
use tracing::debug;

/// A split closer than this many seconds to the window end is pushed back.
pub const SPLIT_END_GUARD_SECS: i64 = 30;

/// Periodic actions of a session, besides frame grabbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    RoiRefresh,
    BehaviorCheck,
    VideoSplit,
}

impl Trigger {
    /// Execution order within one iteration.
    pub const ORDER: [Trigger; 3] = [
        Trigger::RoiRefresh,
        Trigger::BehaviorCheck,
        Trigger::VideoSplit,
    ];
}

/// Cadences for one session.
#[derive(Debug, Clone)]
pub struct SessionTimings {
    pub framegrab: Duration,
    pub roi_update: Duration,
    pub behavior_check_window: Duration,
    pub behavior_check_interval: Duration,
    pub video_split: Duration,
    /// Align the first split to the top of the hour
    pub round_video_split: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    pub trigger: Trigger,
    pub at: NaiveDateTime,
}

/// The set of next-trigger instants of a running session.
#[derive(Debug, Clone)]
pub struct SessionClock {
    timings: SessionTimings,
    deadlines: [Deadline; 3],
    next_framegrab: NaiveDateTime,
    end_of_window: NaiveDateTime,
}

impl SessionClock {
    /// Deadlines for a session starting at `now` and ending at `end_of_window`.
    ///
    /// The ROI is refreshed immediately, the first behavior check waits one
    /// full check window, and the first split lands one split interval out.
    pub fn new(timings: SessionTimings, now: NaiveDateTime, end_of_window: NaiveDateTime) -> Self {
        let mut first_split = now + timings.video_split;
        if timings.round_video_split {
            first_split = first_split
                .duration_trunc(Duration::hours(1))
                .unwrap_or(first_split);
        }
        let first_split = guard_split(first_split, end_of_window);

        let deadlines = [
            Deadline {
                trigger: Trigger::RoiRefresh,
                at: now,
            },
            Deadline {
                trigger: Trigger::BehaviorCheck,
                at: now + timings.behavior_check_window,
            },
            Deadline {
                trigger: Trigger::VideoSplit,
                at: first_split,
            },
        ];

        Self {
            timings,
            deadlines,
            next_framegrab: now,
            end_of_window,
        }
    }

    pub fn deadline(&self, trigger: Trigger) -> NaiveDateTime {
        self.slot(trigger).at
    }

    /// Whether the session should keep looping at `now`.
    pub fn in_window(&self, now: NaiveDateTime) -> bool {
        now < self.end_of_window
    }

    /// Start a frame cycle: the next grab is one interval after `now`.
    pub fn begin_cycle(&mut self, now: NaiveDateTime) -> NaiveDateTime {
        self.next_framegrab = self.next_framegrab.max(now + self.timings.framegrab);
        self.next_framegrab
    }

    /// Triggers due at `now`, in execution order.
    pub fn due(&self, now: NaiveDateTime) -> Vec<Trigger> {
        Trigger::ORDER
            .into_iter()
            .filter(|t| now >= self.deadline(*t))
            .collect()
    }

    /// A ROI was found at `now`; refresh again after the ROI interval.
    pub fn roi_refreshed(&mut self, now: NaiveDateTime) {
        let next = now + self.timings.roi_update;
        self.advance(Trigger::RoiRefresh, next);
    }

    /// A behavior check ran at `now`, whatever its outcome.
    pub fn behavior_checked(&mut self, now: NaiveDateTime) {
        let next = now + self.timings.behavior_check_interval;
        self.advance(Trigger::BehaviorCheck, next);
    }

    /// A segment split happened. The next boundary is anchored to the previous
    /// one, not to `now`, so splits stay on the hour.
    pub fn video_split(&mut self) {
        let next = self.deadline(Trigger::VideoSplit) + self.timings.video_split;
        let next = guard_split(next, self.end_of_window);
        self.advance(Trigger::VideoSplit, next);
    }

    fn slot(&self, trigger: Trigger) -> &Deadline {
        // ORDER and deadlines are built in the same order
        let idx = Trigger::ORDER.iter().position(|t| *t == trigger).unwrap_or(0);
        &self.deadlines[idx]
    }

    fn advance(&mut self, trigger: Trigger, next: NaiveDateTime) {
        if let Some(slot) = self.deadlines.iter_mut().find(|d| d.trigger == trigger) {
            // Deadlines never move backwards
            slot.at = slot.at.max(next);
        }
    }
}

/// Push a split that would land within ±30 s of the window end one hour later.
pub fn guard_split(split: NaiveDateTime, end_of_window: NaiveDateTime) -> NaiveDateTime {
    let guard = Duration::seconds(SPLIT_END_GUARD_SECS);
    let gap = end_of_window - split;
    if gap > -guard && gap < guard {
        debug!(split = %split, "skipping video split: too close to end time");
        split + Duration::hours(1)
    } else {
        split
    }
}
