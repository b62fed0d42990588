//! Fieldcam Agent - autonomous field camera trap.
//!
//! During daylight the agent records continuous video, locates a region of
//! interest with a coarse detector, counts occupants inside it with a finer
//! one, and raises a rate-limited alert when occupancy stays inside a
//! configured band for enough of a rolling window. Outside active hours it
//! converts and uploads the collected footage.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       Duty-Cycle Scheduler                        │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   active window                          inactive hours           │
//! │  ┌──────────────────────────┐          ┌──────────────────────┐   │
//! │  │  Active Session          │          │  Passive Sync        │   │
//! │  │  Controller              │          │  Controller          │   │
//! │  │  Camera ─▶ ROI ─▶ OOI    │          │  ffmpeg ─▶ rclone    │   │
//! │  └──────────┬───────────────┘          └──────────────────────┘   │
//! │             ▼                                                     │
//! │  ┌──────────────────────────┐   ┌──────────────┐   ┌───────────┐  │
//! │  │  Behavior Analyzer       │──▶│ Rate Limiter │──▶│ Transport │  │
//! │  │  (sliding window)        │   └──────────────┘   └───────────┘  │
//! │  └──────────────────────────┘                                     │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All work happens on one thread. Hardware, inference and delivery sit
//! behind the [`camera::Camera`], [`detect::Detector`],
//! [`notify::AlertTransport`], [`media::ClipWriter`] and [`media::Archiver`]
//! traits.
//!
//! # Example
//!
//! ```no_run
//! use fieldcam_agent::config::Settings;
//! use fieldcam_agent::project::Project;
//!
//! let project = Project::with_defaults("burrow-7");
//! let settings = Settings::load(&project.config_path()).expect("valid config");
//! println!("active from {:?}", settings.active_window());
//! ```

pub mod camera;
pub mod clock;
pub mod config;
pub mod core;
pub mod detect;
pub mod media;
pub mod notify;
pub mod project;
pub mod stats;
mod subprocess;

// Re-export key types at crate root for convenience
pub use camera::{Camera, CameraConfig, CameraError};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{CameraSource, ConfigError, Settings};
pub use crate::core::{
    ActiveSessionController, BehaviorAnalyzer, DutyCycleScheduler, ExitReason,
    PassiveSyncController, SessionError, SessionSettings, SessionSummary,
};
pub use detect::{BoundingBox, Detection, Detector, DetectorError};
pub use notify::{AlertTransport, Notification, Notifier, RateLimiter, TransportError};
pub use project::Project;
pub use stats::StatsLog;

#[cfg(feature = "email")]
pub use notify::SendGridTransport;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
