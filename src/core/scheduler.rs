//! Day/night duty cycle.
//!
//! The scheduler samples the wall clock, runs an active session while inside
//! the daily window and a passive sync cycle otherwise, sleeping until the next
//! window start. It is also the single place where interrupts and unexpected
//! failures end the program: both go through the same shutdown sequence.

use super::active_window::ActiveWindow;
use super::passive::PassiveSyncController;
use super::session::{ActiveSessionController, SessionError};
use crate::camera::Camera;
use crate::clock::Clock;
use crate::notify::Notification;
use crate::stats::StatsLog;
use chrono::Duration;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use tracing::{debug, error, info, warn};

/// Why the scheduler stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    /// Operator interrupt
    Interrupted,
    /// Unexpected error or panic, with its description
    Failed(String),
}

/// Top-level loop owning the camera and both mode controllers.
pub struct DutyCycleScheduler {
    clock: Box<dyn Clock>,
    camera: Box<dyn Camera>,
    session: ActiveSessionController,
    passive: PassiveSyncController,
    window: ActiveWindow,
    stats: StatsLog,
    error_attachment: Option<PathBuf>,
    synced_on_shutdown: bool,
}

impl DutyCycleScheduler {
    pub fn new(
        clock: Box<dyn Clock>,
        camera: Box<dyn Camera>,
        session: ActiveSessionController,
        passive: PassiveSyncController,
        stats: StatsLog,
    ) -> Self {
        let window = session.settings().window;
        Self {
            clock,
            camera,
            session,
            passive,
            window,
            stats,
            error_attachment: None,
            synced_on_shutdown: false,
        }
    }

    /// Attach this file (normally the debug log) to error reports.
    pub fn with_error_attachment(mut self, path: PathBuf) -> Self {
        self.error_attachment = Some(path);
        self
    }

    pub fn stats(&self) -> &StatsLog {
        &self.stats
    }

    /// Run until interrupted or until something fails, then shut down.
    pub fn run(&mut self) -> ExitReason {
        info!("Entering main run loop. Press Ctrl-C at any time to exit");
        let reason = match panic::catch_unwind(AssertUnwindSafe(|| self.run_cycles())) {
            Ok(reason) => reason,
            Err(payload) => ExitReason::Failed(panic_message(payload.as_ref())),
        };

        match &reason {
            ExitReason::Interrupted => {
                info!("Interrupt detected. Running cleanup operations, please wait until the program exits");
            }
            ExitReason::Failed(detail) => {
                error!("unknown exception: {detail}");
                warn!("shutting down due to unknown exception");
                if panic::catch_unwind(AssertUnwindSafe(|| self.report_failure(detail))).is_err() {
                    error!("error notification panicked");
                }
            }
        }
        self.shutdown();
        reason
    }

    fn run_cycles(&mut self) -> ExitReason {
        loop {
            let now = self.clock.now();
            if self.window.contains(now) {
                match self.session.run(self.camera.as_mut(), self.clock.as_ref()) {
                    Ok(summary) => {
                        self.stats.absorb(&summary, true);
                        if let Err(e) = self.stats.save() {
                            warn!("failed to save stats: {e}");
                        }
                    }
                    Err(SessionError::Interrupted) => {
                        self.stats.absorb(self.session.summary(), false);
                        return ExitReason::Interrupted;
                    }
                    Err(e) => {
                        self.stats.absorb(self.session.summary(), false);
                        // A failure racing an interrupt is still an interrupt
                        if self.clock.poll_interrupt().is_err() {
                            info!("session ended by interrupt: {e}");
                            return ExitReason::Interrupted;
                        }
                        return ExitReason::Failed(e.to_string());
                    }
                }
            } else {
                let next_start = self.passive.run(now);
                self.stats.record_passive_cycle();
                // The start instant itself is still outside the window
                let wake = next_start.max(now + Duration::seconds(1));
                debug!(wake = %wake, "sleeping until next active window");
                if self.clock.sleep_until(wake).is_err() {
                    return ExitReason::Interrupted;
                }
            }

            if self.clock.poll_interrupt().is_err() {
                return ExitReason::Interrupted;
            }
        }
    }

    /// Best-effort error report to the user and the administrator.
    fn report_failure(&mut self, detail: &str) {
        let subject = format!("Unexpected Error in {}", self.session.settings().project_id);
        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string());
        let mut notification = Notification::new(subject, format!("{detail}\n\nhost: {host}"));
        if let Some(path) = self.error_attachment.as_ref().filter(|p| p.exists()) {
            notification = notification.with_attachment(path.clone());
        }

        info!("attempting to notify user and admin of error");
        let now = self.clock.now();
        let notifier = self.session.notifier_mut();
        notifier.send_user(&notification, now);
        notifier.send_admin(&notification, now);
    }

    /// Release the camera, push remaining footage and persist stats.
    ///
    /// Safe to call more than once: the camera release repeats harmlessly and
    /// the final sync runs only the first time.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.camera.stop_recording() {
            warn!("failed to stop recording: {e}");
        }
        self.camera.shutdown();

        if !self.synced_on_shutdown {
            self.synced_on_shutdown = true;
            info!("uploading remaining data, please wait");
            if panic::catch_unwind(AssertUnwindSafe(|| {
                self.passive.sync();
            }))
            .is_err()
            {
                error!("final sync panicked");
            }
        }

        if let Err(e) = self.stats.save() {
            warn!("failed to save stats: {e}");
        }
        info!("Shutdown complete");
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("camera driver exploded");
        assert_eq!(panic_message(payload.as_ref()), "camera driver exploded");

        let payload: Box<dyn Any + Send> = Box::new(String::from("bad frame"));
        assert_eq!(panic_message(payload.as_ref()), "bad frame");

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "panic with non-string payload");
    }
}
