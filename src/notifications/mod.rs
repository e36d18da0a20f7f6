//! Operator alerts (e.g. ONUs discovered by a ZTP sweep that match no subscriber).

pub mod senders;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};

use senders::{Alert, NotificationSender, SenderError, telegram::TelegramSender, webhook::WebhookSender};

/// One configured alert destination.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChannelConfig {
    Telegram {
        bot_token: String,
        chat_id: String,
    },
    Webhook {
        url: String,
        method: String, // "GET" or "POST"
        headers: Option<HashMap<String, String>>,
        body_template: Option<String>, // Tera template for POST bodies
    },
}

impl ChannelConfig {
    pub fn channel_type(&self) -> &'static str {
        match self {
            ChannelConfig::Telegram { .. } => "telegram",
            ChannelConfig::Webhook { .. } => "webhook",
        }
    }
}

#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("No notification channels configured")]
    NoChannels,
    #[error("All {0} notification channels failed")]
    AllChannelsFailed(usize),
    #[error("Sender error: {0}")]
    SenderError(#[from] SenderError),
}

/// The single "send operator alert" call the orchestration layer depends on.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(&self, subject: &str, message: &str) -> Result<(), NotificationError>;
}

/// Fans an alert out to every configured channel.
///
/// Succeeds if at least one channel accepted the message.
pub struct OperatorNotifier {
    channels: Vec<ChannelConfig>,
    telegram: TelegramSender,
    webhook: WebhookSender,
}

impl OperatorNotifier {
    pub fn new(channels: Vec<ChannelConfig>) -> Self {
        Self {
            channels,
            telegram: TelegramSender::new(),
            webhook: WebhookSender::new(),
        }
    }

    async fn dispatch(&self, config: &ChannelConfig, alert: &Alert) -> Result<(), SenderError> {
        match config {
            ChannelConfig::Telegram { .. } => self.telegram.send(config, alert).await,
            ChannelConfig::Webhook { .. } => self.webhook.send(config, alert).await,
        }
    }
}

#[async_trait]
impl NotificationSink for OperatorNotifier {
    async fn notify(&self, subject: &str, message: &str) -> Result<(), NotificationError> {
        if self.channels.is_empty() {
            warn!(subject = subject, "Operator alert dropped: no notification channels configured.");
            return Err(NotificationError::NoChannels);
        }

        let alert = Alert::new(subject, message);
        let mut failures = 0;
        for channel in &self.channels {
            match self.dispatch(channel, &alert).await {
                Ok(()) => {
                    info!(channel = channel.channel_type(), subject = subject, "Operator alert sent.");
                }
                Err(e) => {
                    failures += 1;
                    warn!(channel = channel.channel_type(), error = %e, "Failed to send operator alert.");
                }
            }
        }

        if failures == self.channels.len() {
            return Err(NotificationError::AllChannelsFailed(failures));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_config_uses_type_tag() {
        let config: ChannelConfig = serde_json::from_value(serde_json::json!({
            "type": "telegram",
            "bot_token": "123:abc",
            "chat_id": "-100200",
        }))
        .unwrap();
        assert_eq!(config.channel_type(), "telegram");

        let config: ChannelConfig = serde_json::from_value(serde_json::json!({
            "type": "webhook",
            "url": "https://hooks.example.net/noc",
            "method": "POST",
        }))
        .unwrap();
        assert_eq!(config.channel_type(), "webhook");
    }

    #[tokio::test]
    async fn notifier_without_channels_reports_it() {
        let notifier = OperatorNotifier::new(Vec::new());
        assert!(matches!(
            notifier.notify("ZTP", "1 unmatched ONU").await,
            Err(NotificationError::NoChannels)
        ));
    }

    #[tokio::test]
    async fn notifier_fails_when_every_channel_is_invalid() {
        let notifier = OperatorNotifier::new(vec![ChannelConfig::Webhook {
            url: "http://127.0.0.1:1/alert".to_string(),
            method: "PATCH".to_string(),
            headers: None,
            body_template: None,
        }]);
        assert!(matches!(
            notifier.notify("ZTP", "1 unmatched ONU").await,
            Err(NotificationError::AllChannelsFailed(1))
        ));
    }
}
