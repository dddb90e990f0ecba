//! Telegram Bot API notifier.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{ChannelId, FormatMode, Notifier, NotifyError};

/// Public Bot API endpoint.
pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Longest text `sendMessage` accepts, in UTF-16 code units.
const MAX_MESSAGE_LEN: usize = 4096;

/// Longest API error body kept in a [`NotifyError::Rejected`].
const MAX_DESCRIPTION_LEN: usize = 200;

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct BotUser {
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    first_name: String,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
    disable_web_page_preview: bool,
}

/// Sends messages through `sendMessage`.
pub struct TelegramNotifier {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl TelegramNotifier {
    /// Build a notifier without contacting the API.
    pub fn new(token: &str, api_base: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NotifyError::Transport(e.without_url()))?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Build a notifier and verify the token with `getMe`.
    pub async fn connect(token: &str, api_base: &str, timeout: Duration) -> Result<Self, NotifyError> {
        let notifier = Self::new(token, api_base, timeout)?;
        let name = notifier.get_me().await?;
        info!("telegram bot authorized as {name}");
        Ok(notifier)
    }

    /// Name of the bot the token belongs to.
    pub async fn get_me(&self) -> Result<String, NotifyError> {
        let resp = self
            .client
            .get(self.method_url("getMe"))
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.without_url()))?;
        let user: Option<BotUser> = read_response(resp).await?;
        Ok(user
            .map(|u| u.username.map(|n| format!("@{n}")).unwrap_or(u.first_name))
            .unwrap_or_default())
    }

    // The token is part of the path, so errors carrying this URL must be stripped.
    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(
        &self,
        destination: &ChannelId,
        text: &str,
        mode: FormatMode,
    ) -> Result<(), NotifyError> {
        let parse_mode = match mode {
            FormatMode::PlainText => None,
            FormatMode::Markdown => Some("Markdown"),
            FormatMode::Html => Some("HTML"),
        };
        let parts = split_message(text, MAX_MESSAGE_LEN);
        if parts.len() > 1 {
            debug!("message of {} chars sent in {} parts", text.len(), parts.len());
        }

        for part in &parts {
            let body = SendMessage {
                chat_id: destination.as_str(),
                text: part,
                parse_mode,
                disable_web_page_preview: true,
            };
            let resp = self
                .client
                .post(self.method_url("sendMessage"))
                .json(&body)
                .send()
                .await
                .map_err(|e| NotifyError::Transport(e.without_url()))?;
            read_response::<serde_json::Value>(resp).await?;
        }
        Ok(())
    }
}

/// Split `text` into parts of at most `limit` UTF-16 units.
///
/// Cuts fall on line boundaries, where no report markup is open. A single line
/// longer than `limit` is cut between characters. Blank parts are dropped.
fn split_message(text: &str, limit: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len: usize = line.chars().map(char::len_utf16).sum();
        if current_len + line_len > limit && !current.is_empty() {
            parts.push(std::mem::take(&mut current));
            current_len = 0;
        }
        if line_len <= limit {
            current.push_str(line);
            current_len += line_len;
            continue;
        }
        for c in line.chars() {
            if current_len + c.len_utf16() > limit && !current.is_empty() {
                parts.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current.push(c);
            current_len += c.len_utf16();
        }
    }
    parts.push(current);

    parts.retain(|p| !p.trim().is_empty());
    if parts.is_empty() {
        parts.push(text.to_string());
    }
    parts
}

async fn read_response<T: for<'de> Deserialize<'de>>(
    resp: reqwest::Response,
) -> Result<Option<T>, NotifyError> {
    let status = resp.status();
    let text = resp
        .text()
        .await
        .map_err(|e| NotifyError::Transport(e.without_url()))?;

    match serde_json::from_str::<ApiResponse<T>>(&text) {
        Ok(api) if api.ok && status.is_success() => Ok(api.result),
        Ok(api) => Err(NotifyError::Rejected {
            status: status.as_u16(),
            description: api
                .description
                .unwrap_or_else(|| "no description".to_string()),
        }),
        Err(_) => Err(NotifyError::Rejected {
            status: status.as_u16(),
            description: text.chars().take(MAX_DESCRIPTION_LEN).collect(),
        }),
    }
}
