use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Response;
use serde::Serialize;
use thiserror::Error;

use super::ChannelConfig;

pub mod telegram;
pub mod webhook;

#[derive(Error, Debug)]
pub enum SenderError {
    #[error("{channel} endpoint answered {status}: {body}")]
    Rejected {
        channel: &'static str,
        status: u16,
        body: String,
    },
    #[error("{sender} sender was handed a {found} channel")]
    WrongChannel {
        sender: &'static str,
        found: &'static str,
    },
    #[error("Invalid channel configuration: {0}")]
    Config(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Template error: {0}")]
    Template(#[from] tera::Error),
}

/// One operator alert, rendered per channel by its sender.
#[derive(Debug, Clone, Serialize)]
pub struct Alert {
    pub subject: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn new(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Delivery to one channel type.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn send(&self, config: &ChannelConfig, alert: &Alert) -> Result<(), SenderError>;
}

/// Maps a non-2xx answer to `SenderError::Rejected`, keeping the body for the log.
pub(crate) async fn ensure_accepted(
    channel: &'static str,
    response: Response,
) -> Result<(), SenderError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(SenderError::Rejected {
        channel,
        status: status.as_u16(),
        body,
    })
}
