//! CLI-specific error types and exit code mapping

use logsentry_core::error::LogsentryError;
use logsentry_monitor::{DispatchError, MonitorError, NotifyError};

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure (including rules).
    #[error("configuration error: {0}")]
    Config(String),

    /// State directory, lock, or counter log unusable.
    #[error("state error: {0}")]
    State(String),

    /// The test alert could not be delivered.
    #[error("delivery failed: {0}")]
    Delivery(#[from] DispatchError),

    /// Logging or runtime setup failed.
    #[error("runtime error: {0}")]
    Runtime(String),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                   |
    /// |------|-------------------------------------------|
    /// | 0    | Success, or another instance holds the lock |
    /// | 1    | State, delivery, or runtime error         |
    /// | 2    | Configuration error                       |
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::State(_) | Self::Delivery(_) | Self::Runtime(_) => 1,
        }
    }
}

impl From<LogsentryError> for CliError {
    fn from(e: LogsentryError) -> Self {
        if e.is_config() {
            Self::Config(e.to_string())
        } else {
            Self::State(e.to_string())
        }
    }
}

impl From<MonitorError> for CliError {
    fn from(e: MonitorError) -> Self {
        if e.is_config() {
            Self::Config(e.to_string())
        } else {
            Self::State(e.to_string())
        }
    }
}

impl From<NotifyError> for CliError {
    fn from(e: NotifyError) -> Self {
        match e {
            NotifyError::Config(reason) => Self::Config(format!("notify: {reason}")),
            other => Self::Delivery(DispatchError::Notify(other)),
        }
    }
}
