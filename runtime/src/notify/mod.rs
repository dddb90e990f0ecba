//! Outbound notification channels.
//!
//! The primary channel receives rendered reports; operational failures go to a
//! separate [`OpsSink`] so they never mix with subscriber content.

pub mod ops;
pub mod telegram;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use statwatch::Emphasis;
use std::fmt;
use std::io::Write;

pub use ops::OpsSink;
pub use telegram::TelegramNotifier;

/// Delivery destination, e.g. a Telegram chat id or `@channel` name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(pub String);

impl ChannelId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// How the destination should interpret markup in the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatMode {
    PlainText,
    Markdown,
    Html,
}

impl From<Emphasis> for FormatMode {
    fn from(emphasis: Emphasis) -> Self {
        match emphasis {
            Emphasis::Markdown => Self::Markdown,
            Emphasis::Html => Self::Html,
            Emphasis::Plain => Self::PlainText,
        }
    }
}

/// A failed delivery.
#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error("request to notification API failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("notification API rejected the message (HTTP {status}): {description}")]
    Rejected { status: u16, description: String },

    #[error("cannot write notification: {0}")]
    Io(#[from] std::io::Error),
}

/// Pushes text to a destination.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(
        &self,
        destination: &ChannelId,
        text: &str,
        mode: FormatMode,
    ) -> Result<(), NotifyError>;
}

/// Writes messages to stdout instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotifier;

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn send(
        &self,
        destination: &ChannelId,
        text: &str,
        _mode: FormatMode,
    ) -> Result<(), NotifyError> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "── to {destination} ──")?;
        writeln!(out, "{text}")?;
        out.flush()?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_mode_follows_emphasis() {
        assert_eq!(FormatMode::from(Emphasis::Markdown), FormatMode::Markdown);
        assert_eq!(FormatMode::from(Emphasis::Html), FormatMode::Html);
        assert_eq!(FormatMode::from(Emphasis::Plain), FormatMode::PlainText);
    }

    #[tokio::test]
    async fn test_console_notifier_accepts_messages() {
        let n = ConsoleNotifier;
        n.send(&ChannelId::new("stdout"), "*hello*", FormatMode::Markdown)
            .await
            .unwrap();
    }
}
