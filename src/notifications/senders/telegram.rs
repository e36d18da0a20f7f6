use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use super::{Alert, NotificationSender, SenderError, ensure_accepted};
use crate::notifications::ChannelConfig;

const API_BASE: &str = "https://api.telegram.org";
/// Bot API limit on the text of a single message.
const MAX_TEXT_CHARS: usize = 4096;
const TRUNCATION_MARK: &str = "\n…";

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

/// Sends alerts through the Telegram Bot API as HTML-formatted messages.
pub struct TelegramSender {
    client: Client,
    api_base: String,
}

impl Default for TelegramSender {
    fn default() -> Self {
        Self::new()
    }
}

impl TelegramSender {
    pub fn new() -> Self {
        Self::with_api_base(API_BASE)
    }

    /// Points the sender at a different Bot API host (a local bot server, for instance).
    pub fn with_api_base(api_base: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, bot_token: &str) -> String {
        format!("{}/bot{bot_token}/sendMessage", self.api_base)
    }
}

fn escaped(c: char) -> Option<&'static str> {
    match c {
        '&' => Some("&amp;"),
        '<' => Some("&lt;"),
        '>' => Some("&gt;"),
        _ => None,
    }
}

fn escaped_len(c: char) -> usize {
    escaped(c).map_or(1, |e| e.len())
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match escaped(c) {
            Some(entity) => out.push_str(entity),
            None => out.push(c),
        }
    }
    out
}

/// Escapes whole lines of `message` while they fit in `budget` characters, then
/// appends the truncation mark. Cutting the raw text keeps every entity intact.
fn escape_truncated(message: &str, budget: usize) -> String {
    let budget = budget.saturating_sub(TRUNCATION_MARK.chars().count());
    let mut out = String::new();
    let mut used = 0;
    for (index, line) in message.lines().enumerate() {
        let separator = usize::from(index > 0);
        let cost: usize = line.chars().map(escaped_len).sum::<usize>() + separator;
        if used + cost > budget {
            if index == 0 {
                // One oversized first line: cut it by characters.
                for c in line.chars() {
                    used += escaped_len(c);
                    if used > budget {
                        break;
                    }
                    out.push_str(&escape_html(c.encode_utf8(&mut [0; 4])));
                }
            }
            break;
        }
        if separator == 1 {
            out.push('\n');
        }
        out.push_str(&escape_html(line));
        used += cost;
    }
    out.push_str(TRUNCATION_MARK);
    out
}

/// Subject in bold, body as preformatted text so serial/port listings stay aligned.
fn render(alert: &Alert) -> String {
    let subject = escape_html(&alert.subject);
    let budget = MAX_TEXT_CHARS
        .saturating_sub(subject.chars().count() + "<b></b>\n<pre></pre>".len());

    let mut body = escape_html(&alert.message);
    if body.chars().count() > budget {
        body = escape_truncated(&alert.message, budget);
    }
    format!("<b>{subject}</b>\n<pre>{body}</pre>")
}

#[async_trait]
impl NotificationSender for TelegramSender {
    async fn send(&self, config: &ChannelConfig, alert: &Alert) -> Result<(), SenderError> {
        let ChannelConfig::Telegram { bot_token, chat_id } = config else {
            return Err(SenderError::WrongChannel {
                sender: "telegram",
                found: config.channel_type(),
            });
        };
        if bot_token.is_empty() || chat_id.is_empty() {
            return Err(SenderError::Config(
                "telegram channel needs both bot_token and chat_id".to_string(),
            ));
        }

        let payload = SendMessage {
            chat_id,
            text: render(alert),
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };
        let response = self
            .client
            .post(self.endpoint(bot_token))
            .json(&payload)
            .send()
            .await?;
        ensure_accepted("telegram", response).await
    }
}
