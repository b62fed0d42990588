//! Core scheduling and behavior detection for the camera trap.
//!
//! This module contains:
//! - The day/night duty-cycle scheduler
//! - The active session loop and its deadline set
//! - The sliding-window behavior analyzer
//! - ROI tracking and the passive sync controller

pub mod active_window;
pub mod behavior;
pub mod passive;
pub mod roi;
pub mod scheduler;
pub mod session;
pub mod timers;

// Re-export commonly used types
pub use active_window::ActiveWindow;
pub use behavior::{BehaviorAnalyzer, BehaviorConfig, Sample};
pub use passive::PassiveSyncController;
pub use roi::RegionOfInterest;
pub use scheduler::{DutyCycleScheduler, ExitReason};
pub use session::{ActiveSessionController, CameraLease, SessionError, SessionSettings, SessionSummary};
pub use timers::{SessionClock, SessionTimings, Trigger};
