//! SendGrid mail transport.

use super::{AlertTransport, Notification, TransportError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use std::path::Path;
use tracing::debug;

const DEFAULT_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

#[derive(Debug, Serialize)]
struct MailRequest<'a> {
    personalizations: Vec<Personalization<'a>>,
    from: Address<'a>,
    subject: &'a str,
    content: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    attachments: Vec<Attachment>,
}

#[derive(Debug, Serialize)]
struct Personalization<'a> {
    to: Vec<Address<'a>>,
}

#[derive(Debug, Serialize)]
struct Address<'a> {
    email: &'a str,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    value: &'a str,
}

#[derive(Debug, Serialize)]
struct Attachment {
    content: String,
    filename: String,
    #[serde(rename = "type")]
    mime: String,
    disposition: &'static str,
}

/// Async SendGrid client.
pub struct SendGridClient {
    client: reqwest::Client,
    api_key: String,
    from_email: String,
    endpoint: String,
}

impl SendGridClient {
    pub fn new(api_key: impl Into<String>, from_email: impl Into<String>) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            from_email: from_email.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        })
    }

    /// Point the client at a different mail endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub async fn send(&self, to: &str, notification: &Notification) -> Result<(), TransportError> {
        let attachments = match &notification.attachment {
            Some(path) => vec![encode_attachment(path)?],
            None => Vec::new(),
        };
        let request = MailRequest {
            personalizations: vec![Personalization {
                to: vec![Address { email: to }],
            }],
            from: Address {
                email: &self.from_email,
            },
            subject: &notification.subject,
            content: vec![Content {
                kind: "text/plain",
                value: &notification.message,
            }],
            attachments,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() != 202 {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(TransportError::Server {
                status: status.as_u16(),
                message,
            });
        }
        debug!(to, "mail accepted");
        Ok(())
    }
}

/// Blocking SendGrid transport for the synchronous core loop.
pub struct SendGridTransport {
    inner: SendGridClient,
    runtime: tokio::runtime::Runtime,
}

impl SendGridTransport {
    pub fn new(api_key: impl Into<String>, from_email: impl Into<String>) -> Result<Self, TransportError> {
        Self::from_client(SendGridClient::new(api_key, from_email)?)
    }

    pub fn from_client(inner: SendGridClient) -> Result<Self, TransportError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to create runtime: {e}")))?;
        Ok(Self { inner, runtime })
    }
}

impl AlertTransport for SendGridTransport {
    fn send(&self, to: &str, notification: &Notification) -> Result<(), TransportError> {
        self.runtime.block_on(self.inner.send(to, notification))
    }
}

fn encode_attachment(path: &Path) -> Result<Attachment, TransportError> {
    let bytes = std::fs::read(path)
        .map_err(|e| TransportError::Attachment(format!("{}: {e}", path.display())))?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    Ok(Attachment {
        content: STANDARD.encode(bytes),
        mime: mime_for(path).to_string(),
        filename,
        disposition: "attachment",
    })
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("mp4") => "video/mp4",
        Some("log") | Some("txt") => "text/plain",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}
