use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a single entry in an upgrade run transcript.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        };
        write!(f, "{label}")
    }
}

/// One line of an upgrade run transcript.
///
/// Entries are immutable once created and accumulate in arrival order for the
/// lifetime of a run. They are produced by step execution itself or explicitly
/// through [`UpgradeContext::add_log`](crate::engine::UpgradeContext::add_log).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

impl LogEntry {
    /// Creates an entry with an arbitrary level.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            created_at: Utc::now(),
        }
    }

    /// Creates an info-level entry.
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    /// Creates a warning-level entry.
    pub fn warn(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, message)
    }

    /// Creates an error-level entry.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    /// Forwards this entry to the ambient `log` facade.
    pub(crate) fn forward_to_facade(&self) {
        match self.level {
            LogLevel::Info => log::info!("{}", self.message),
            LogLevel::Warn => log::warn!("{}", self.message),
            LogLevel::Error => log::error!("{}", self.message),
        }
    }
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level, self.message)
    }
}
