//! Notification channel selection.
//!
//! `--dry-run` swaps the Telegram channel for a channel that only logs
//! rendered messages, leaving the rest of the run unchanged.

use logsentry_core::config::NotifyConfig;
use logsentry_monitor::{LogNotifier, MessageFormat, Notifier, NotifyError, TelegramNotifier};

/// The notification channel used by this invocation.
#[derive(Debug)]
pub enum ChannelNotifier {
    /// Delivers through the Telegram Bot API.
    Telegram(TelegramNotifier),
    /// Logs instead of sending.
    DryRun(LogNotifier),
}

impl ChannelNotifier {
    /// Build the channel for the given settings.
    ///
    /// A dry run never needs a bot token.
    ///
    /// # Errors
    ///
    /// Returns [`NotifyError::Config`] when the Telegram channel cannot be built.
    pub fn from_config(config: &NotifyConfig, dry_run: bool) -> Result<Self, NotifyError> {
        if dry_run {
            return Ok(Self::DryRun(LogNotifier::new()));
        }
        TelegramNotifier::new(config).map(Self::Telegram)
    }
}

impl Notifier for ChannelNotifier {
    fn name(&self) -> &str {
        match self {
            Self::Telegram(inner) => inner.name(),
            Self::DryRun(inner) => inner.name(),
        }
    }

    async fn send(&self, text: &str, format: MessageFormat) -> Result<(), NotifyError> {
        match self {
            Self::Telegram(inner) => inner.send(text, format).await,
            Self::DryRun(inner) => inner.send(text, format).await,
        }
    }
}
