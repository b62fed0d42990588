//! Alert delivery for behavioral events and fatal errors.
//!
//! The [`Notifier`] sits between the core loop and an [`AlertTransport`]. It
//! owns the [`RateLimiter`] and updates it only on confirmed sends, so a failed
//! send never counts against the cap.

pub mod limiter;

#[cfg(feature = "email")]
pub mod sendgrid;

pub use limiter::RateLimiter;

#[cfg(feature = "email")]
pub use sendgrid::SendGridTransport;

use chrono::NaiveDateTime;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// An outbound alert.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub subject: String,
    pub message: String,
    pub attachment: Option<PathBuf>,
}

impl Notification {
    pub fn new(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            message: message.into(),
            attachment: None,
        }
    }

    pub fn with_attachment(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachment = Some(path.into());
        self
    }
}

/// Delivers one notification to one recipient.
pub trait AlertTransport {
    fn send(&self, to: &str, notification: &Notification) -> Result<(), TransportError>;
}

/// Transport used when email is not configured: every send is dropped.
#[derive(Debug, Default)]
pub struct DisabledTransport;

impl AlertTransport for DisabledTransport {
    fn send(&self, _to: &str, _notification: &Notification) -> Result<(), TransportError> {
        Err(TransportError::Disabled)
    }
}

/// Outcome of a notification attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    /// Light mode or no recipient configured
    Skipped,
    Failed,
}

/// Recipients, transport and rate limiting.
pub struct Notifier {
    transport: Box<dyn AlertTransport>,
    user_email: Option<String>,
    admin_email: Option<String>,
    limiter: RateLimiter,
    light_mode: bool,
}

impl Notifier {
    pub fn new(
        transport: Box<dyn AlertTransport>,
        user_email: Option<String>,
        admin_email: Option<String>,
        limiter: RateLimiter,
    ) -> Self {
        let light_mode = user_email.is_none();
        if light_mode {
            info!(
                "Notifier initialized in light mode. To enable email notifications, provide values \
                 for both \"sendgrid_api_key\" and \"user_email\" in the project config file."
            );
        }
        Self {
            transport,
            user_email,
            admin_email,
            limiter,
            light_mode,
        }
    }

    /// A notifier that never sends.
    pub fn disabled(limiter: RateLimiter) -> Self {
        Self::new(Box::new(DisabledTransport), None, None, limiter)
    }

    pub fn is_light_mode(&self) -> bool {
        self.light_mode
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Whether the rate limiter currently allows an alert.
    pub fn check_conditions(&self, now: NaiveDateTime) -> bool {
        debug!("checking notification conditions");
        self.limiter.check_conditions(now)
    }

    /// Send to the end user. Not gated by the limiter; callers check first.
    pub fn send_user(&mut self, notification: &Notification, now: NaiveDateTime) -> Delivery {
        if self.light_mode {
            debug!("ignoring notification call because notifier is in light mode");
            return Delivery::Skipped;
        }
        let to = self.user_email.clone().unwrap_or_default();
        self.deliver(&to, notification, now)
    }

    /// Send to the administrator, if one is configured.
    pub fn send_admin(&mut self, notification: &Notification, now: NaiveDateTime) -> Delivery {
        if self.light_mode {
            return Delivery::Skipped;
        }
        match self.admin_email.clone() {
            Some(to) => self.deliver(&to, notification, now),
            None => {
                debug!("admin email not found. skipping.");
                Delivery::Skipped
            }
        }
    }

    fn deliver(&mut self, to: &str, notification: &Notification, now: NaiveDateTime) -> Delivery {
        match self.transport.send(to, notification) {
            Ok(()) => {
                debug!(subject = %notification.subject, "notification appears to have sent successfully");
                self.limiter.record_sent(now);
                Delivery::Sent
            }
            Err(TransportError::Disabled) => Delivery::Skipped,
            Err(e) => {
                warn!("notification to {to} failed: {e}");
                Delivery::Failed
            }
        }
    }

    /// Clear limiter state at session end.
    pub fn reset(&mut self) {
        self.limiter.reset();
    }
}

/// Alert transport errors.
#[derive(Debug)]
pub enum TransportError {
    /// Transport intentionally not configured
    Disabled,
    /// Attachment could not be read
    Attachment(String),
    /// Network/HTTP error
    Network(String),
    /// Service answered with an unexpected status
    Server { status: u16, message: String },
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Disabled => write!(f, "alert transport disabled"),
            TransportError::Attachment(msg) => write!(f, "attachment error: {msg}"),
            TransportError::Network(msg) => write!(f, "network error: {msg}"),
            TransportError::Server { status, message } => {
                write!(f, "mail service error ({status}): {message}")
            }
        }
    }
}

impl std::error::Error for TransportError {}
