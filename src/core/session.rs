//! The active session loop.
//!
//! One session runs from window entry to window exit. Each iteration grabs a
//! frame, refreshes the ROI when due, counts occupants inside it, and then runs
//! the behavior check and video split triggers that are due. The camera is
//! leased for the whole session and released on every exit path.

use super::active_window::ActiveWindow;
use super::behavior::{BehaviorAnalyzer, Sample};
use super::roi::{thumbnail, RegionOfInterest};
use super::timers::{SessionClock, SessionTimings, Trigger};
use crate::camera::{Camera, CameraError};
use crate::clock::{Clock, Interrupted};
use crate::config::Settings;
use crate::detect::{sort_by_confidence, Detector, DetectorError};
use crate::media::overlay::draw_detections;
use crate::media::{ClipFrame, ClipWriter};
use crate::notify::{Delivery, Notification, Notifier};
use chrono::{Local, NaiveDateTime};
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

/// Read-only parameters of a session.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub project_id: String,
    pub window: ActiveWindow,
    pub timings: SessionTimings,
    /// Samples a full behavior window should hold
    pub expected_samples: f64,
    pub clip_fps: u32,
    /// Where event clips are written
    pub video_dir: PathBuf,
}

impl SessionSettings {
    pub fn from_settings(settings: &Settings, video_dir: PathBuf) -> Self {
        Self {
            project_id: settings.project_id.clone(),
            window: settings.active_window(),
            timings: settings.timings(),
            expected_samples: settings.expected_samples(),
            clip_fps: settings.clip_fps(),
            video_dir,
        }
    }

    /// Below this many buffered samples a behavior check is skipped.
    pub fn minimum_viable_samples(&self) -> usize {
        (self.expected_samples / 2.0).floor().max(0.0) as usize
    }
}

/// Counters for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub frames: u64,
    pub samples: u64,
    pub behavior_checks: u64,
    pub degraded_checks: u64,
    pub behaviors_detected: u64,
    pub alerts_sent: u64,
    pub alerts_suppressed: u64,
    pub video_splits: u64,
}

/// Exclusive hold on the camera for one session.
///
/// Releasing is idempotent; dropping the lease releases the camera if it was
/// not released explicitly, so an unwinding session still frees the device.
pub struct CameraLease<'a> {
    camera: &'a mut dyn Camera,
    released: bool,
}

impl<'a> CameraLease<'a> {
    pub fn new(camera: &'a mut dyn Camera) -> Self {
        Self {
            camera,
            released: false,
        }
    }

    pub fn release(&mut self) {
        if !self.released {
            self.released = true;
            debug!("releasing camera");
            if let Err(e) = self.camera.stop_recording() {
                warn!("failed to stop recording: {e}");
            }
            self.camera.shutdown();
        }
    }
}

impl<'a> Deref for CameraLease<'a> {
    type Target = dyn Camera + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.camera
    }
}

impl<'a> DerefMut for CameraLease<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.camera
    }
}

impl Drop for CameraLease<'_> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Runs active sessions. Owns the analyzer, the detectors and the notifier.
pub struct ActiveSessionController {
    settings: SessionSettings,
    analyzer: BehaviorAnalyzer,
    notifier: Notifier,
    roi_detector: Box<dyn Detector>,
    ooi_detector: Box<dyn Detector>,
    clip_writer: Box<dyn ClipWriter>,
    roi: Option<RegionOfInterest>,
    summary: SessionSummary,
}

impl ActiveSessionController {
    pub fn new(
        settings: SessionSettings,
        analyzer: BehaviorAnalyzer,
        notifier: Notifier,
        roi_detector: Box<dyn Detector>,
        ooi_detector: Box<dyn Detector>,
        clip_writer: Box<dyn ClipWriter>,
    ) -> Self {
        Self {
            settings,
            analyzer,
            notifier,
            roi_detector,
            ooi_detector,
            clip_writer,
            roi: None,
            summary: SessionSummary::default(),
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn notifier_mut(&mut self) -> &mut Notifier {
        &mut self.notifier
    }

    pub fn analyzer(&self) -> &BehaviorAnalyzer {
        &self.analyzer
    }

    /// Counters of the current or most recent session.
    pub fn summary(&self) -> &SessionSummary {
        &self.summary
    }

    /// Run one session until the active window closes.
    ///
    /// Whatever the outcome, the camera is shut down and the limiter, buffer
    /// and ROI are cleared before this returns.
    pub fn run(&mut self, camera: &mut dyn Camera, clock: &dyn Clock) -> Result<SessionSummary, SessionError> {
        let start = clock.now();
        let end_of_window = self.settings.window.end_on(start);
        let span = info_span!("session", id = %Uuid::new_v4());
        let _enter = span.enter();

        info!(end_of_window = %end_of_window, "entering active collection mode");
        self.summary = SessionSummary::default();
        self.roi = None;

        let mut lease = CameraLease::new(camera);
        let result = self.run_loop(&mut lease, clock, start, end_of_window);
        lease.release();
        self.end_session();

        match &result {
            Ok(()) => info!(
                frames = self.summary.frames,
                samples = self.summary.samples,
                alerts = self.summary.alerts_sent,
                "active session complete"
            ),
            Err(e) => warn!("active session ended early: {e}"),
        }
        result.map(|()| self.summary.clone())
    }

    fn end_session(&mut self) {
        self.notifier.reset();
        self.analyzer.reset();
        self.roi = None;
    }

    fn run_loop(
        &mut self,
        camera: &mut CameraLease<'_>,
        clock: &dyn Clock,
        start: NaiveDateTime,
        end_of_window: NaiveDateTime,
    ) -> Result<(), SessionError> {
        camera.start_recording()?;
        let mut timers = SessionClock::new(self.settings.timings.clone(), start, end_of_window);
        debug!(
            next_video_split = %timers.deadline(Trigger::VideoSplit),
            next_behavior_check = %timers.deadline(Trigger::BehaviorCheck),
            "session timers armed"
        );

        let mut now = start;
        while timers.in_window(now) {
            let next_framegrab = timers.begin_cycle(now);
            let frame = camera.capture_frame()?;
            self.summary.frames += 1;

            let due = timers.due(now);
            if due.contains(&Trigger::RoiRefresh) && self.refresh_roi(&frame, now)? {
                timers.roi_refreshed(now);
            }
            self.record_sample(&frame, now)?;

            for trigger in due {
                match trigger {
                    Trigger::RoiRefresh => {}
                    Trigger::BehaviorCheck => {
                        self.check_behavior(now);
                        timers.behavior_checked(now);
                    }
                    Trigger::VideoSplit => {
                        debug!("splitting recording");
                        camera.split_recording()?;
                        self.summary.video_splits += 1;
                        timers.video_split();
                    }
                }
            }

            clock.sleep_until(next_framegrab)?;
            now = clock.now();
        }
        Ok(())
    }

    /// Look for a new ROI. Returns whether one was found; a miss keeps the old ROI.
    fn refresh_roi(&mut self, frame: &RgbImage, now: NaiveDateTime) -> Result<bool, SessionError> {
        let mut detections = self.roi_detector.detect(frame)?;
        sort_by_confidence(&mut detections);
        let found = detections
            .first()
            .and_then(|best| RegionOfInterest::from_detection(best, frame.width(), frame.height(), now));

        match found {
            Some(roi) => {
                debug!(bbox = ?roi.bounding_box, "roi updated");
                self.roi = Some(roi);
                Ok(true)
            }
            None => {
                match &self.roi {
                    Some(previous) => debug!(
                        age_secs = (now - previous.established_at).num_seconds(),
                        "no roi detected, keeping previous roi"
                    ),
                    None => debug!("no roi detected yet"),
                }
                Ok(false)
            }
        }
    }

    /// Count occupants inside the ROI and buffer the sample. Skipped without a ROI.
    fn record_sample(&mut self, frame: &RgbImage, now: NaiveDateTime) -> Result<(), SessionError> {
        let Some(roi) = &self.roi else {
            return Ok(());
        };
        let mut crop = roi.crop(frame);
        let detections = self.ooi_detector.detect(&crop)?;
        let occupancy = detections.len() as u32;
        draw_detections(&mut crop, &detections);

        self.analyzer.append(Sample {
            timestamp: now,
            occupancy,
            thumbnail: thumbnail(&crop),
        });
        self.summary.samples += 1;
        Ok(())
    }

    fn check_behavior(&mut self, now: NaiveDateTime) {
        self.summary.behavior_checks += 1;
        let buffered = self.analyzer.len();
        if self.analyzer.is_empty() || buffered < self.settings.minimum_viable_samples() {
            warn!(
                "Data buffer unusually short. Expected approximately {:.0}. Got {buffered}",
                self.settings.expected_samples
            );
            self.summary.degraded_checks += 1;
            return;
        }
        if !self.analyzer.check_for_behavior() {
            return;
        }

        self.summary.behaviors_detected += 1;
        if !self.notifier.check_conditions(now) {
            debug!("possible behavior event detected but notification conditions not passed");
            self.summary.alerts_suppressed += 1;
            return;
        }

        info!("possible behavioral event. Sending notification");
        let fraction = self.analyzer.activity_fraction().unwrap_or(0.0);
        let mut notification = Notification::new(
            format!("possible behavioral event in {}", self.settings.project_id),
            format!("activity fraction: {fraction}"),
        );

        let clip_path = self
            .settings
            .video_dir
            .join(format!("eventclip_{}.mp4", unix_timestamp(now)));
        let frames: Vec<ClipFrame<'_>> = self
            .analyzer
            .samples()
            .map(|s| ClipFrame {
                occupancy: s.occupancy,
                image: &s.thumbnail,
            })
            .collect();
        match self
            .clip_writer
            .write_clip(&clip_path, &frames, self.settings.clip_fps)
        {
            Ok(()) => notification = notification.with_attachment(clip_path),
            Err(e) => warn!("failed to write event clip, sending without attachment: {e}"),
        }

        if self.notifier.send_user(&notification, now) == Delivery::Sent {
            self.summary.alerts_sent += 1;
        }
    }
}

/// Seconds since the epoch for a local wall-clock instant.
fn unix_timestamp(now: NaiveDateTime) -> i64 {
    now.and_local_timezone(Local)
        .earliest()
        .map(|t| t.timestamp())
        .unwrap_or_else(|| now.and_utc().timestamp())
}

/// Errors that end a session early.
#[derive(Debug)]
pub enum SessionError {
    Camera(CameraError),
    Detector(DetectorError),
    /// Operator interrupt observed while waiting for the next frame
    Interrupted,
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::Camera(e) => write!(f, "{e}"),
            SessionError::Detector(e) => write!(f, "{e}"),
            SessionError::Interrupted => write!(f, "session interrupted"),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::Camera(e) => Some(e),
            SessionError::Detector(e) => Some(e),
            SessionError::Interrupted => None,
        }
    }
}

impl From<CameraError> for SessionError {
    fn from(e: CameraError) -> Self {
        SessionError::Camera(e)
    }
}

impl From<DetectorError> for SessionError {
    fn from(e: DetectorError) -> Self {
        SessionError::Detector(e)
    }
}

impl From<Interrupted> for SessionError {
    fn from(_: Interrupted) -> Self {
        SessionError::Interrupted
    }
}
