//! Integration tests for the duty-cycle scheduler.

mod common;

use chrono::Duration;
use common::*;
use fieldcam_agent::clock::ManualClock;
use fieldcam_agent::core::{
    ActiveSessionController, BehaviorAnalyzer, DutyCycleScheduler, ExitReason,
    PassiveSyncController,
};
use fieldcam_agent::detect::Detector;
use fieldcam_agent::notify::{Notifier, RateLimiter};
use fieldcam_agent::stats::StatsLog;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;

struct Rig {
    scheduler: DutyCycleScheduler,
    camera: Rc<RefCell<CameraLog>>,
    archiver_calls: Rc<RefCell<u32>>,
    sent: Rc<RefCell<Vec<SentMail>>>,
}

fn rig(clock: &ManualClock, camera: FakeCamera, camera_log: Rc<RefCell<CameraLog>>) -> Rig {
    rig_with_roi_detector(clock, camera, camera_log, Box::new(ScriptedDetector::fixed_roi()))
}

fn rig_with_roi_detector(
    clock: &ManualClock,
    camera: FakeCamera,
    camera_log: Rc<RefCell<CameraLog>>,
    roi_detector: Box<dyn Detector>,
) -> Rig {
    let (transport, sent, _) = RecordingTransport::new(false);
    let (writer, _) = FakeClipWriter::new(false);
    let (archiver, archiver_calls) = FakeArchiver::new();

    let notifier = Notifier::new(
        Box::new(transport),
        Some("biologist@example.org".into()),
        Some("admin@example.org".into()),
        RateLimiter::new(Duration::seconds(600), 20),
    );
    let session = ActiveSessionController::new(
        session_settings(daylight(), timings(60, 600, 300)),
        BehaviorAnalyzer::new(band(2, 3, 600, 0.25)),
        notifier,
        roi_detector,
        Box::new(ScriptedDetector::constant(occupants(1))),
        Box::new(writer),
    );
    let passive = PassiveSyncController::new(Box::new(archiver), daylight());
    let scheduler = DutyCycleScheduler::new(
        Box::new(clock.clone()),
        Box::new(camera),
        session,
        passive,
        StatsLog::new(),
    );

    Rig {
        scheduler,
        camera: camera_log,
        archiver_calls,
        sent,
    }
}

#[test]
fn test_interrupt_while_sleeping_at_night() {
    let clock = ManualClock::new(at(3, 0, 0));
    clock.interrupt_at(at(5, 0, 0));
    let (camera, camera_log) = FakeCamera::new();
    let mut rig = rig(&clock, camera, camera_log);

    assert_eq!(rig.scheduler.run(), ExitReason::Interrupted);

    // One passive cycle, then the final sync during shutdown
    assert_eq!(*rig.archiver_calls.borrow(), 2);
    assert_eq!(rig.camera.borrow().starts, 0);
    assert!(rig.camera.borrow().shutdowns >= 1);
    assert!(rig.sent.borrow().is_empty());
}

#[test]
fn test_full_day_cycle() {
    let clock = ManualClock::new(at(6, 59, 0));
    clock.interrupt_at(on(2, 3, 0, 0));
    let (camera, camera_log) = FakeCamera::new();
    let mut rig = rig(&clock, camera, camera_log);

    assert_eq!(rig.scheduler.run(), ExitReason::Interrupted);

    let stats = rig.scheduler.stats().stats();
    assert_eq!(stats.sessions_completed, 1);
    assert_eq!(stats.sessions_failed, 0);
    // 06:59, 07:00 sharp (still outside the window), and after dusk
    assert_eq!(stats.passive_cycles, 3);
    assert_eq!(stats.totals.frames, 720);
    assert_eq!(*rig.archiver_calls.borrow(), 4);

    let camera = rig.camera.borrow();
    assert_eq!(camera.starts, 1);
    assert!(!camera.recording);
}

#[test]
fn test_failure_notifies_user_and_admin() {
    let clock = ManualClock::new(at(8, 0, 0));
    let (camera, camera_log) = FakeCamera::with_fault(CaptureFault::FailOn(2));
    let mut rig = rig(&clock, camera, camera_log);

    let reason = rig.scheduler.run();

    match reason {
        ExitReason::Failed(detail) => assert!(detail.contains("sensor timeout")),
        other => panic!("unexpected exit: {other:?}"),
    }
    let sent = rig.sent.borrow();
    let recipients: Vec<&str> = sent.iter().map(|m| m.to.as_str()).collect();
    assert_eq!(recipients, vec!["biologist@example.org", "admin@example.org"]);
    assert!(sent.iter().all(|m| m.subject == "Unexpected Error in burrow-7"));
    assert!(sent[0].message.contains("sensor timeout"));

    assert_eq!(*rig.archiver_calls.borrow(), 1);
    assert!(!rig.camera.borrow().recording);
    assert_eq!(rig.scheduler.stats().stats().sessions_failed, 1);
}

#[test]
fn test_error_report_attaches_log() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("debug.log");
    std::fs::write(&log_path, "2024-06-01 08:00:00 INFO entering active collection mode\n").unwrap();

    let clock = ManualClock::new(at(8, 0, 0));
    let (camera, camera_log) = FakeCamera::with_fault(CaptureFault::FailOn(1));
    let Rig {
        scheduler,
        sent,
        ..
    } = rig(&clock, camera, camera_log);
    let mut scheduler = scheduler.with_error_attachment(log_path.clone());

    assert!(matches!(scheduler.run(), ExitReason::Failed(_)));
    let sent = sent.borrow();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].attachment, Some(log_path));
}

#[test]
fn test_missing_log_is_not_attached() {
    let clock = ManualClock::new(at(8, 0, 0));
    let (camera, camera_log) = FakeCamera::with_fault(CaptureFault::FailOn(1));
    let Rig {
        scheduler,
        sent,
        ..
    } = rig(&clock, camera, camera_log);
    let mut scheduler = scheduler.with_error_attachment(PathBuf::from("/nonexistent/debug.log"));

    scheduler.run();
    assert!(sent.borrow().iter().all(|m| m.attachment.is_none()));
}

#[test]
fn test_panic_is_contained() {
    let clock = ManualClock::new(at(8, 0, 0));
    let (camera, camera_log) = FakeCamera::with_fault(CaptureFault::PanicOn(3));
    let mut rig = rig(&clock, camera, camera_log);

    let reason = rig.scheduler.run();

    assert_eq!(reason, ExitReason::Failed("sensor wedged".to_string()));
    let camera = rig.camera.borrow();
    assert!(camera.shutdowns >= 1);
    assert!(!camera.recording);
    assert!(!camera.open);
    assert_eq!(rig.sent.borrow().len(), 2);
    assert_eq!(*rig.archiver_calls.borrow(), 1);
}

#[test]
fn test_shutdown_twice() {
    let clock = ManualClock::new(at(8, 0, 0));
    let (camera, camera_log) = FakeCamera::with_fault(CaptureFault::FailOn(2));
    let mut rig = rig(&clock, camera, camera_log);

    rig.scheduler.run();
    rig.scheduler.shutdown();
    rig.scheduler.shutdown();

    assert_eq!(*rig.archiver_calls.borrow(), 1);
    assert!(!rig.camera.borrow().recording);
    assert!(!rig.camera.borrow().open);
    assert_eq!(rig.camera.borrow().stops, 1);
}

#[test]
fn test_detector_failure_with_pending_interrupt_exits_cleanly() {
    let clock = ManualClock::new(at(8, 0, 0));
    clock.interrupt_at(at(8, 0, 0));
    let (camera, camera_log) = FakeCamera::new();
    let mut rig = rig_with_roi_detector(
        &clock,
        camera,
        camera_log,
        Box::new(FailingDetector::new("helper exited with signal: 2 (SIGINT)")),
    );

    assert_eq!(rig.scheduler.run(), ExitReason::Interrupted);

    assert!(rig.sent.borrow().is_empty());
    assert!(!rig.camera.borrow().recording);
    assert_eq!(*rig.archiver_calls.borrow(), 1);
    assert_eq!(rig.scheduler.stats().stats().sessions_failed, 1);
}

#[test]
fn test_detector_failure_without_interrupt_is_reported() {
    let clock = ManualClock::new(at(8, 0, 0));
    let (camera, camera_log) = FakeCamera::new();
    let mut rig = rig_with_roi_detector(
        &clock,
        camera,
        camera_log,
        Box::new(FailingDetector::new("model file unreadable")),
    );

    match rig.scheduler.run() {
        ExitReason::Failed(detail) => assert!(detail.contains("model file unreadable")),
        other => panic!("unexpected exit: {other:?}"),
    }
    assert_eq!(rig.sent.borrow().len(), 2);
}
