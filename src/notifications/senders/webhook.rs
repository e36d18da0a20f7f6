use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, header};
use std::collections::HashMap;
use tera::{Context, Tera};

use super::{Alert, NotificationSender, SenderError, ensure_accepted};
use crate::notifications::ChannelConfig;

/// Body used when a POST webhook has no template of its own.
const DEFAULT_BODY_TEMPLATE: &str = r#"{"subject": {{ subject | json_encode() }}, "message": {{ message | json_encode() }}, "timestamp": {{ timestamp | json_encode() }}}"#;

/// Pushes alerts to an operator-supplied HTTP endpoint.
///
/// POST sends a tera-rendered JSON body; GET carries the alert as query parameters.
pub struct WebhookSender {
    client: Client,
}

impl Default for WebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookSender {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn build(
        &self,
        url: &str,
        method: Method,
        headers: Option<&HashMap<String, String>>,
        body_template: Option<&str>,
        alert: &Alert,
    ) -> Result<RequestBuilder, SenderError> {
        let mut request = self.client.request(method.clone(), url);
        if let Some(h) = headers {
            request = request.headers(header_map(h)?);
        }
        Ok(if method == Method::POST {
            let body = render_body(body_template.unwrap_or(DEFAULT_BODY_TEMPLATE), alert)?;
            request.header(header::CONTENT_TYPE, "application/json").body(body)
        } else {
            let timestamp = alert.timestamp.to_rfc3339();
            request.query(&[
                ("subject", alert.subject.as_str()),
                ("message", alert.message.as_str()),
                ("timestamp", timestamp.as_str()),
            ])
        })
    }
}

fn parse_method(method: &str) -> Result<Method, SenderError> {
    match method.to_ascii_uppercase().as_str() {
        "POST" => Ok(Method::POST),
        "GET" => Ok(Method::GET),
        other => Err(SenderError::Config(format!("webhook method {other} is not supported"))),
    }
}

fn header_map(headers: &HashMap<String, String>) -> Result<header::HeaderMap, SenderError> {
    headers
        .iter()
        .map(|(key, value)| {
            let name = header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| SenderError::Config(format!("header name {key:?}: {e}")))?;
            let value = header::HeaderValue::from_str(value)
                .map_err(|e| SenderError::Config(format!("header {key:?} value: {e}")))?;
            Ok((name, value))
        })
        .collect()
}

fn render_body(template: &str, alert: &Alert) -> Result<String, SenderError> {
    let context = Context::from_serialize(alert)?;
    Ok(Tera::one_off(template, &context, false)?)
}

#[async_trait]
impl NotificationSender for WebhookSender {
    async fn send(&self, config: &ChannelConfig, alert: &Alert) -> Result<(), SenderError> {
        let ChannelConfig::Webhook {
            url,
            method,
            headers,
            body_template,
        } = config
        else {
            return Err(SenderError::WrongChannel {
                sender: "webhook",
                found: config.channel_type(),
            });
        };

        let request = self.build(
            url,
            parse_method(method)?,
            headers.as_ref(),
            body_template.as_deref(),
            alert,
        )?;
        ensure_accepted("webhook", request.send().await?).await
    }
}
