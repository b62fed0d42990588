//! Inactive-hours work: convert and upload footage, then pick a wake time.

use super::active_window::ActiveWindow;
use crate::media::{Archiver, SyncReport};
use chrono::NaiveDateTime;
use tracing::{info, warn};

/// Drives convert-and-upload outside the active window.
pub struct PassiveSyncController {
    archiver: Box<dyn Archiver>,
    window: ActiveWindow,
    last_report: Option<SyncReport>,
}

impl PassiveSyncController {
    pub fn new(archiver: Box<dyn Archiver>, window: ActiveWindow) -> Self {
        Self {
            archiver,
            window,
            last_report: None,
        }
    }

    /// One passive cycle. Returns the instant the next active window opens.
    ///
    /// Sync failures are logged only; unconverted sources stay on disk and are
    /// retried next cycle.
    pub fn run(&mut self, now: NaiveDateTime) -> NaiveDateTime {
        info!("entering passive upload mode");
        self.sync();
        let next_start = self.window.next_start(now);
        info!(next_start = %next_start, "passive cycle complete");
        next_start
    }

    /// Convert and upload once, logging the outcome.
    pub fn sync(&mut self) -> Option<&SyncReport> {
        info!("converting and uploading videos");
        match self.archiver.convert_and_upload() {
            Ok(report) => {
                if report.failed > 0 {
                    warn!(
                        failed = report.failed,
                        "some recordings failed to convert and will be retried"
                    );
                }
                info!(
                    converted = report.converted,
                    uploaded = report.uploaded,
                    "conversion and upload complete"
                );
                self.last_report = Some(report);
            }
            Err(e) => {
                warn!("conversion and upload failed: {e}");
                self.last_report = None;
            }
        }
        self.last_report.as_ref()
    }

    pub fn last_report(&self) -> Option<&SyncReport> {
        self.last_report.as_ref()
    }
}
