//! Cumulative field statistics.
//!
//! Counters survive restarts through a small JSON file in the project
//! directory, so `fieldcam status` can report on a trap that has been running
//! for weeks.

use crate::core::SessionSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Totals across every session of a project.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldStats {
    #[serde(flatten)]
    pub totals: SessionSummary,
    pub sessions_completed: u64,
    pub sessions_failed: u64,
    pub passive_cycles: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Statistics log with optional persistence.
#[derive(Debug, Default)]
pub struct StatsLog {
    stats: FieldStats,
    persist_path: Option<PathBuf>,
}

impl StatsLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a stats log backed by `path`, loading earlier totals if present.
    pub fn with_persistence(path: PathBuf) -> Self {
        let mut log = Self {
            stats: FieldStats::default(),
            persist_path: Some(path),
        };
        if let Err(e) = log.load() {
            warn!("could not load previous stats: {e}");
        }
        log
    }

    /// Fold one session's counters into the totals.
    pub fn absorb(&mut self, session: &SessionSummary, completed: bool) {
        let t = &mut self.stats.totals;
        t.frames += session.frames;
        t.samples += session.samples;
        t.behavior_checks += session.behavior_checks;
        t.degraded_checks += session.degraded_checks;
        t.behaviors_detected += session.behaviors_detected;
        t.alerts_sent += session.alerts_sent;
        t.alerts_suppressed += session.alerts_suppressed;
        t.video_splits += session.video_splits;
        if completed {
            self.stats.sessions_completed += 1;
        } else {
            self.stats.sessions_failed += 1;
        }
    }

    pub fn record_passive_cycle(&mut self) {
        self.stats.passive_cycles += 1;
    }

    pub fn stats(&self) -> &FieldStats {
        &self.stats
    }

    /// Human-readable summary for the status command.
    pub fn summary(&self) -> String {
        let s = &self.stats;
        let updated = s
            .last_updated
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        format!(
            "Field Statistics:\n\
             - Sessions completed: {}\n\
             - Sessions ended early: {}\n\
             - Passive cycles: {}\n\
             - Frames captured: {}\n\
             - Samples recorded: {}\n\
             - Behavior checks: {} ({} skipped for short buffers)\n\
             - Behaviors detected: {}\n\
             - Alerts sent: {} ({} suppressed by rate limit)\n\
             - Video splits: {}\n\
             - Last updated: {}",
            s.sessions_completed,
            s.sessions_failed,
            s.passive_cycles,
            s.totals.frames,
            s.totals.samples,
            s.totals.behavior_checks,
            s.totals.degraded_checks,
            s.totals.behaviors_detected,
            s.totals.alerts_sent,
            s.totals.alerts_suppressed,
            s.totals.video_splits,
            updated
        )
    }

    /// Save stats to disk.
    pub fn save(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            self.stats.last_updated = Some(Utc::now());
            let json = serde_json::to_string_pretty(&self.stats).map_err(std::io::Error::other)?;
            std::fs::write(path, json)?;
            debug!(path = %path.display(), "stats saved");
        }
        Ok(())
    }

    fn load(&mut self) -> Result<(), std::io::Error> {
        if let Some(ref path) = self.persist_path {
            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                self.stats = serde_json::from_str(&content).map_err(std::io::Error::other)?;
            }
        }
        Ok(())
    }
}
