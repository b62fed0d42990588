//! Fakes shared by the integration tests.
//!
//! Every fake keeps its observable state behind `Rc<RefCell<_>>` so a test can
//! hand the fake to the code under test and still inspect it afterwards.

#![allow(dead_code)]

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use fieldcam_agent::camera::{Camera, CameraError};
use fieldcam_agent::core::{ActiveWindow, BehaviorConfig, SessionSettings, SessionTimings};
use fieldcam_agent::detect::{BoundingBox, Detection, Detector, DetectorError};
use fieldcam_agent::media::{Archiver, ClipError, ClipFrame, ClipWriter, SyncError, SyncReport};
use fieldcam_agent::notify::{AlertTransport, Notification, TransportError};
use image::RgbImage;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::rc::Rc;

pub fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
    on(1, h, m, s)
}

pub fn on(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 6, day)
        .unwrap()
        .and_hms_opt(h, m, s)
        .unwrap()
}

pub fn time(h: u32, m: u32, s: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, s).unwrap()
}

/// Daylight window used by most tests.
pub fn daylight() -> ActiveWindow {
    ActiveWindow::new(time(7, 0, 0), time(19, 0, 0))
}

pub fn timings(framegrab_secs: i64, check_window_secs: i64, check_interval_secs: i64) -> SessionTimings {
    SessionTimings {
        framegrab: Duration::seconds(framegrab_secs),
        roi_update: Duration::seconds(600),
        behavior_check_window: Duration::seconds(check_window_secs),
        behavior_check_interval: Duration::seconds(check_interval_secs),
        video_split: Duration::hours(3),
        round_video_split: true,
    }
}

pub fn session_settings(window: ActiveWindow, timings: SessionTimings) -> SessionSettings {
    let expected_samples = timings.behavior_check_window.num_milliseconds() as f64
        / timings.framegrab.num_milliseconds() as f64;
    SessionSettings {
        project_id: "burrow-7".to_string(),
        window,
        timings,
        expected_samples,
        clip_fps: 1,
        video_dir: PathBuf::from("Videos"),
    }
}

pub fn band(min: u32, max: u32, window_secs: i64, min_fraction: f64) -> BehaviorConfig {
    BehaviorConfig {
        window: Duration::seconds(window_secs),
        min_individuals: min,
        max_individuals: max,
        min_fraction,
    }
}

// ---------------------------------------------------------------------------
// Camera
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct CameraLog {
    pub starts: u32,
    pub splits: u32,
    pub stops: u32,
    pub shutdowns: u32,
    pub frames: u32,
    pub recording: bool,
    pub open: bool,
}

/// What the fake camera does on a given capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFault {
    /// Fail the Nth capture (1-based) with a device error
    FailOn(u32),
    /// Panic on the Nth capture
    PanicOn(u32),
}

pub struct FakeCamera {
    pub log: Rc<RefCell<CameraLog>>,
    fault: Option<CaptureFault>,
}

impl FakeCamera {
    pub fn new() -> (Self, Rc<RefCell<CameraLog>>) {
        let log = Rc::new(RefCell::new(CameraLog {
            open: true,
            ..CameraLog::default()
        }));
        (
            Self {
                log: log.clone(),
                fault: None,
            },
            log,
        )
    }

    pub fn with_fault(fault: CaptureFault) -> (Self, Rc<RefCell<CameraLog>>) {
        let (mut camera, log) = Self::new();
        camera.fault = Some(fault);
        (camera, log)
    }
}

impl Camera for FakeCamera {
    fn start_recording(&mut self) -> Result<(), CameraError> {
        let mut log = self.log.borrow_mut();
        log.starts += 1;
        log.open = true;
        log.recording = true;
        Ok(())
    }

    fn split_recording(&mut self) -> Result<(), CameraError> {
        let mut log = self.log.borrow_mut();
        if !log.recording {
            return Err(CameraError::Device("not recording".into()));
        }
        log.splits += 1;
        Ok(())
    }

    fn stop_recording(&mut self) -> Result<(), CameraError> {
        let mut log = self.log.borrow_mut();
        if log.recording {
            log.stops += 1;
            log.recording = false;
        }
        Ok(())
    }

    fn capture_frame(&mut self) -> Result<RgbImage, CameraError> {
        let n = {
            let mut log = self.log.borrow_mut();
            log.frames += 1;
            log.frames
        };
        match self.fault {
            Some(CaptureFault::FailOn(k)) if k == n => {
                Err(CameraError::Device("sensor timeout".into()))
            }
            Some(CaptureFault::PanicOn(k)) if k == n => panic!("sensor wedged"),
            _ => Ok(RgbImage::new(64, 48)),
        }
    }

    fn shutdown(&mut self) {
        let mut log = self.log.borrow_mut();
        log.shutdowns += 1;
        log.recording = false;
        log.open = false;
    }

    fn is_recording(&self) -> bool {
        self.log.borrow().recording
    }
}

// ---------------------------------------------------------------------------
// Detectors
// ---------------------------------------------------------------------------

/// Returns scripted answers in order, then repeats `fallback`.
pub struct ScriptedDetector {
    script: VecDeque<Vec<Detection>>,
    fallback: Vec<Detection>,
    pub calls: Rc<RefCell<u32>>,
}

impl ScriptedDetector {
    /// Always find the same region.
    pub fn fixed_roi() -> Self {
        Self::constant(vec![detection(8, 8, 56, 40, 0.9)])
    }

    pub fn constant(answer: Vec<Detection>) -> Self {
        Self {
            script: VecDeque::new(),
            fallback: answer,
            calls: Rc::new(RefCell::new(0)),
        }
    }

    pub fn nothing() -> Self {
        Self::constant(Vec::new())
    }

    /// One answer per call, occupants given as counts; empty afterwards.
    pub fn occupancy(counts: &[u32]) -> Self {
        Self {
            script: counts.iter().map(|&n| occupants(n)).collect(),
            fallback: Vec::new(),
            calls: Rc::new(RefCell::new(0)),
        }
    }

    /// Prefix the script with `misses` empty answers.
    pub fn after_misses(mut self, misses: usize) -> Self {
        for _ in 0..misses {
            self.script.push_front(Vec::new());
        }
        self
    }
}

impl Detector for ScriptedDetector {
    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        *self.calls.borrow_mut() += 1;
        Ok(self.script.pop_front().unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Fails every call, like a helper that was killed mid-frame.
pub struct FailingDetector {
    reason: String,
}

impl FailingDetector {
    pub fn new(reason: &str) -> Self {
        Self {
            reason: reason.to_string(),
        }
    }
}

impl Detector for FailingDetector {
    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Detection>, DetectorError> {
        Err(DetectorError::Protocol(self.reason.clone()))
    }
}

pub fn detection(x0: u32, y0: u32, x1: u32, y1: u32, score: f32) -> Detection {
    Detection {
        bbox: BoundingBox::new(x0, y0, x1, y1),
        score,
    }
}

pub fn occupants(n: u32) -> Vec<Detection> {
    (0..n).map(|i| detection(i * 4, 2, i * 4 + 3, 6, 0.8)).collect()
}

// ---------------------------------------------------------------------------
// Alert transport
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SentMail {
    pub to: String,
    pub subject: String,
    pub message: String,
    pub attachment: Option<PathBuf>,
}

pub struct RecordingTransport {
    pub sent: Rc<RefCell<Vec<SentMail>>>,
    pub attempts: Rc<RefCell<u32>>,
    fail: bool,
}

impl RecordingTransport {
    pub fn new(fail: bool) -> (Self, Rc<RefCell<Vec<SentMail>>>, Rc<RefCell<u32>>) {
        let sent = Rc::new(RefCell::new(Vec::new()));
        let attempts = Rc::new(RefCell::new(0));
        (
            Self {
                sent: sent.clone(),
                attempts: attempts.clone(),
                fail,
            },
            sent,
            attempts,
        )
    }
}

impl AlertTransport for RecordingTransport {
    fn send(&self, to: &str, notification: &Notification) -> Result<(), TransportError> {
        *self.attempts.borrow_mut() += 1;
        if self.fail {
            return Err(TransportError::Server {
                status: 500,
                message: "mail service down".into(),
            });
        }
        self.sent.borrow_mut().push(SentMail {
            to: to.to_string(),
            subject: notification.subject.clone(),
            message: notification.message.clone(),
            attachment: notification.attachment.clone(),
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Clip writer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct WrittenClip {
    pub path: PathBuf,
    pub occupancies: Vec<u32>,
    pub fps: u32,
}

pub struct FakeClipWriter {
    pub clips: Rc<RefCell<Vec<WrittenClip>>>,
    fail: bool,
}

impl FakeClipWriter {
    pub fn new(fail: bool) -> (Self, Rc<RefCell<Vec<WrittenClip>>>) {
        let clips = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                clips: clips.clone(),
                fail,
            },
            clips,
        )
    }
}

impl ClipWriter for FakeClipWriter {
    fn write_clip(&self, path: &Path, frames: &[ClipFrame<'_>], fps: u32) -> Result<(), ClipError> {
        if self.fail {
            return Err(ClipError::Encoder("codec unavailable".into()));
        }
        self.clips.borrow_mut().push(WrittenClip {
            path: path.to_path_buf(),
            occupancies: frames.iter().map(|f| f.occupancy).collect(),
            fps,
        });
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Archiver
// ---------------------------------------------------------------------------

pub struct FakeArchiver {
    pub calls: Rc<RefCell<u32>>,
}

impl FakeArchiver {
    pub fn new() -> (Self, Rc<RefCell<u32>>) {
        let calls = Rc::new(RefCell::new(0));
        (
            Self {
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl Archiver for FakeArchiver {
    fn convert_and_upload(&mut self) -> Result<SyncReport, SyncError> {
        *self.calls.borrow_mut() += 1;
        Ok(SyncReport::default())
    }
}
