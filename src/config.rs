//! Project configuration for the field camera trap.
//!
//! A project's settings live in `config.json` next to its recordings. They are
//! loaded once when the agent starts and shared read-only afterwards.

use crate::core::active_window::ActiveWindow;
use crate::core::behavior::BehaviorConfig;
use crate::core::timers::SessionTimings;
use crate::notify::RateLimiter;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Horizontal resolution must be a multiple of this.
const H_RESOLUTION_ALIGN: u32 = 32;
/// Vertical resolution must be a multiple of this.
const V_RESOLUTION_ALIGN: u32 = 16;

/// Main configuration for one camera-trap project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Unique name for the project
    pub project_id: String,

    /// Remote (rclone) directory the project is mirrored into, e.g. `remote:/traps`
    pub cloud_data_dir: Option<String>,

    pub user_email: Option<String>,
    pub admin_email: Option<String>,
    pub sendgrid_api_key: Option<String>,
    pub sendgrid_from_email: Option<String>,

    /// Minimum time between two alerts
    #[serde(with = "duration_serde")]
    pub min_notification_interval: Duration,

    /// Alert cap, scoped to one active session
    pub max_notifications_per_day: u32,

    /// Model file names, resolved against the models directory
    pub roi_model: String,
    pub ooi_model: String,
    pub roi_confidence_thresh: f32,
    pub ooi_confidence_thresh: f32,

    /// Length of the window analyzed at each behavior check
    #[serde(with = "duration_serde")]
    pub behavior_check_window: Duration,

    /// Time between behavior checks
    #[serde(with = "duration_serde")]
    pub behavior_check_interval: Duration,

    /// Inclusive occupancy band that counts as activity
    pub behavior_min_individuals_roi: u32,
    pub behavior_max_individuals_roi: u32,

    /// Fraction of recent samples inside the band needed to alert
    pub behavior_min_fraction_for_notification: f64,

    pub framerate: u32,
    pub h_resolution: u32,
    pub v_resolution: u32,

    /// Time between frame grabs (fractional seconds allowed)
    #[serde(with = "duration_serde")]
    pub framegrab_interval: Duration,

    /// Time between ROI refreshes
    #[serde(with = "duration_serde")]
    pub roi_update_interval: Duration,

    /// Active window, as whole hours of the local day
    pub start_hour: u32,
    pub end_hour: u32,

    pub video_split_hours: u32,

    /// Align the first segment boundary to the top of the hour
    #[serde(default = "default_true")]
    pub round_video_split_time: bool,

    /// Inference helper invoked by the command detector
    #[serde(default = "default_detector_command")]
    pub detector_command: Vec<String>,

    /// Frame source
    #[serde(default)]
    pub camera: CameraSource,
}

/// Where frames come from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum CameraSource {
    /// Black frames, no recording
    #[default]
    Noop,
    /// Frames decoded from an existing video file
    Replay { source: PathBuf },
}

fn default_true() -> bool {
    true
}

fn default_detector_command() -> Vec<String> {
    vec!["fieldcam-detect".to_string()]
}

impl Settings {
    /// Generate the default configuration for a new project.
    pub fn new_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            cloud_data_dir: None,
            user_email: None,
            admin_email: None,
            sendgrid_api_key: None,
            sendgrid_from_email: None,
            min_notification_interval: Duration::from_secs(600),
            max_notifications_per_day: 20,
            roi_model: "roi.tflite".to_string(),
            ooi_model: "ooi.tflite".to_string(),
            roi_confidence_thresh: 0.75,
            ooi_confidence_thresh: 0.25,
            behavior_check_window: Duration::from_secs(60),
            behavior_check_interval: Duration::from_secs(30),
            behavior_min_individuals_roi: 2,
            behavior_max_individuals_roi: 3,
            behavior_min_fraction_for_notification: 0.25,
            framerate: 30,
            h_resolution: 1632,
            v_resolution: 1232,
            framegrab_interval: Duration::from_millis(200),
            roi_update_interval: Duration::from_secs(600),
            start_hour: 7,
            end_hour: 19,
            video_split_hours: 3,
            round_video_split_time: true,
            detector_command: default_detector_command(),
            camera: CameraSource::Noop,
        }
    }

    /// Load, normalize and validate the configuration at `path`.
    ///
    /// If normalization changed anything the corrected file is written back.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        let mut settings: Settings =
            serde_json::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        if settings.normalize() {
            settings.save(path)?;
        } else {
            debug!("config passed all checks");
        }
        settings.validate()?;
        Ok(settings)
    }

    /// Save configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;
        debug!(path = %path.display(), "config written");
        Ok(())
    }

    /// Round the capture resolution down to what the sensor accepts.
    ///
    /// Returns true if anything changed.
    pub fn normalize(&mut self) -> bool {
        let mut updated = false;
        if self.h_resolution % H_RESOLUTION_ALIGN != 0 {
            let fixed = self.h_resolution - self.h_resolution % H_RESOLUTION_ALIGN;
            warn!(
                "horizontal resolution must be a multiple of {H_RESOLUTION_ALIGN}. Updated to {fixed}"
            );
            self.h_resolution = fixed;
            updated = true;
        }
        if self.v_resolution % V_RESOLUTION_ALIGN != 0 {
            let fixed = self.v_resolution - self.v_resolution % V_RESOLUTION_ALIGN;
            warn!(
                "vertical resolution must be a multiple of {V_RESOLUTION_ALIGN}. Updated to {fixed}"
            );
            self.v_resolution = fixed;
            updated = true;
        }
        updated
    }

    /// Reject settings the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.end_hour > 23 || self.start_hour >= self.end_hour {
            return invalid(format!(
                "active window {}h..{}h must satisfy start < end <= 23",
                self.start_hour, self.end_hour
            ));
        }
        if self.behavior_min_individuals_roi > self.behavior_max_individuals_roi {
            return invalid(format!(
                "occupancy band [{}, {}] is empty",
                self.behavior_min_individuals_roi, self.behavior_max_individuals_roi
            ));
        }
        if !(0.0..=1.0).contains(&self.behavior_min_fraction_for_notification) {
            return invalid(format!(
                "behavior_min_fraction_for_notification {} is outside [0, 1]",
                self.behavior_min_fraction_for_notification
            ));
        }
        for (name, value) in [
            ("framegrab_interval", self.framegrab_interval),
            ("roi_update_interval", self.roi_update_interval),
            ("behavior_check_window", self.behavior_check_window),
            ("behavior_check_interval", self.behavior_check_interval),
        ] {
            if value.is_zero() {
                return invalid(format!("{name} must be greater than zero"));
            }
        }
        if self.video_split_hours == 0 {
            return invalid("video_split_hours must be at least 1".to_string());
        }
        if self.h_resolution == 0 || self.v_resolution == 0 {
            return invalid("resolution must be non-zero".to_string());
        }
        if self.detector_command.is_empty() {
            return invalid("detector_command must name a program".to_string());
        }
        Ok(())
    }

    /// Whether both the recipient and the API key needed for email are present.
    pub fn email_enabled(&self) -> bool {
        self.user_email.is_some() && self.sendgrid_api_key.is_some()
    }

    /// The daily active window.
    pub fn active_window(&self) -> ActiveWindow {
        let at_hour = |h: u32| NaiveTime::from_hms_opt(h, 0, 0).unwrap_or(NaiveTime::MIN);
        ActiveWindow::new(at_hour(self.start_hour), at_hour(self.end_hour))
    }

    /// Cadences for the active session loop.
    pub fn timings(&self) -> SessionTimings {
        SessionTimings {
            framegrab: to_delta(self.framegrab_interval),
            roi_update: to_delta(self.roi_update_interval),
            behavior_check_window: to_delta(self.behavior_check_window),
            behavior_check_interval: to_delta(self.behavior_check_interval),
            video_split: chrono::Duration::hours(i64::from(self.video_split_hours)),
            round_video_split: self.round_video_split_time,
        }
    }

    /// Parameters for the sliding-window analyzer.
    pub fn behavior(&self) -> BehaviorConfig {
        BehaviorConfig {
            window: to_delta(self.behavior_check_window),
            min_individuals: self.behavior_min_individuals_roi,
            max_individuals: self.behavior_max_individuals_roi,
            min_fraction: self.behavior_min_fraction_for_notification,
        }
    }

    /// A fresh rate limiter for the alert transport.
    pub fn rate_limiter(&self) -> RateLimiter {
        RateLimiter::new(
            to_delta(self.min_notification_interval),
            self.max_notifications_per_day,
        )
    }

    /// Samples expected in one behavior window.
    pub fn expected_samples(&self) -> f64 {
        self.behavior_check_window.as_secs_f64() / self.framegrab_interval.as_secs_f64()
    }

    /// Frame rate of event clips: one clip frame per grabbed frame.
    pub fn clip_fps(&self) -> u32 {
        let fps = (1.0 / self.framegrab_interval.as_secs_f64()).floor();
        if fps.is_finite() && fps >= 1.0 {
            fps as u32
        } else {
            1
        }
    }
}

/// Convert a std duration to a chrono delta, saturating at millisecond precision.
pub(crate) fn to_delta(d: Duration) -> chrono::Duration {
    let ms = d.as_millis().min(i64::MAX as u128 / 2) as i64;
    chrono::Duration::milliseconds(ms)
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    IoError(String),
    ParseError(String),
    SerializeError(String),
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {e}"),
            ConfigError::ParseError(e) => write!(f, "Parse error: {e}"),
            ConfigError::SerializeError(e) => write!(f, "Serialize error: {e}"),
            ConfigError::Invalid(e) => write!(f, "Invalid config: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Serde support for Duration as (fractional) seconds.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            duration.as_secs().serialize(serializer)
        } else {
            duration.as_secs_f64().serialize(serializer)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let settings = Settings::new_project("burrow-7");
        assert_eq!(settings.project_id, "burrow-7");
        assert_eq!(settings.framegrab_interval, Duration::from_millis(200));
        assert_eq!(settings.camera, CameraSource::Noop);
        assert!(!settings.email_enabled());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_fractional_durations_roundtrip() {
        let settings = Settings::new_project("p");
        let json = serde_json::to_string(&settings).unwrap();
        assert!(json.contains("\"framegrab_interval\":0.2"));
        assert!(json.contains("\"roi_update_interval\":600"));

        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(back.framegrab_interval, Duration::from_millis(200));
    }

    #[test]
    fn test_normalize_resolution() {
        let mut settings = Settings::new_project("p");
        settings.h_resolution = 1640;
        settings.v_resolution = 1240;
        assert!(settings.normalize());
        assert_eq!(settings.h_resolution, 1632);
        assert_eq!(settings.v_resolution, 1232);
        assert!(!settings.normalize());
    }

    #[test]
    fn test_validate_rejects_bad_window() {
        let mut settings = Settings::new_project("p");
        settings.start_hour = 19;
        settings.end_hour = 7;
        assert!(matches!(settings.validate(), Err(ConfigError::Invalid(_))));

        let mut settings = Settings::new_project("p");
        settings.behavior_min_individuals_roi = 4;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_writes_back_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut settings = Settings::new_project("p");
        settings.h_resolution = 1000;
        settings.save(&path).unwrap();

        let loaded = Settings::load(&path).unwrap();
        assert_eq!(loaded.h_resolution, 992);
        let on_disk: Settings =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk.h_resolution, 992);
    }

    #[test]
    fn test_replay_camera_source_parsing() {
        let json = r#"{"backend": "replay", "source": "/data/clip.mp4"}"#;
        let source: CameraSource = serde_json::from_str(json).unwrap();
        assert_eq!(
            source,
            CameraSource::Replay {
                source: PathBuf::from("/data/clip.mp4")
            }
        );
    }

    #[test]
    fn test_clip_fps() {
        let mut settings = Settings::new_project("p");
        assert_eq!(settings.clip_fps(), 5);
        settings.framegrab_interval = Duration::from_secs(2);
        assert_eq!(settings.clip_fps(), 1);
        assert!((settings.expected_samples() - 30.0).abs() < 1e-9);
    }
}
