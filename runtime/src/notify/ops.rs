//! Operational error sink, kept apart from the primary report channel.

use std::fmt::Display;
use std::sync::Arc;

use chrono::Utc;
use tracing::{error, warn};

use super::{ChannelId, FormatMode, Notifier};

/// Routes internal failures to the log and, optionally, a secondary destination.
///
/// A failed delivery here is logged and dropped; it is never reported again
/// through the sink itself.
#[derive(Clone)]
pub struct OpsSink {
    notifier: Option<Arc<dyn Notifier>>,
    destination: Option<ChannelId>,
}

impl OpsSink {
    /// Send failures to `destination` through `notifier`.
    pub fn new(notifier: Arc<dyn Notifier>, destination: ChannelId) -> Self {
        Self {
            notifier: Some(notifier),
            destination: Some(destination),
        }
    }

    /// Only log failures.
    pub fn log_only() -> Self {
        Self {
            notifier: None,
            destination: None,
        }
    }

    pub fn destination(&self) -> Option<&ChannelId> {
        self.destination.as_ref()
    }

    /// Record an operational failure.
    pub async fn report(&self, err: &(dyn Display + Sync)) {
        error!("{err}");

        let (Some(notifier), Some(destination)) = (&self.notifier, &self.destination) else {
            return;
        };
        let text = format!(
            "push error ({}): {err}",
            Utc::now().format("%Y-%m-%d %H:%M:%S UTC")
        );
        if let Err(e) = notifier.send(destination, &text, FormatMode::PlainText).await {
            warn!("could not deliver error report to {destination}: {e}");
        }
    }
}
