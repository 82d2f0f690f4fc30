use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

/// Severity of a persisted request log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }

    /// `error` for 5xx, `warn` for 4xx, `info` otherwise
    pub fn for_status(status: u16) -> Self {
        match status {
            500.. => LogLevel::Error,
            400..=499 => LogLevel::Warn,
            _ => LogLevel::Info,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(LogLevel::Info),
            "warn" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(()),
        }
    }
}

/// A persisted request log row
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RequestLog {
    pub id: i64,
    pub timestamp: String,
    pub level: String,
    pub message: String,
    pub path: Option<String>,
    pub method: Option<String>,
    pub status_code: Option<i64>,
    pub duration_ms: Option<f64>,
    pub ip: Option<String>,
    pub error_stack: Option<String>,
    pub created_at: i64,
}

/// A request log entry ready for insertion
#[derive(Debug, Clone)]
pub struct NewRequestLog {
    pub level: LogLevel,
    pub message: String,
    pub path: Option<String>,
    pub method: Option<String>,
    pub status_code: Option<i64>,
    pub duration_ms: Option<f64>,
    pub ip: Option<String>,
    pub error_stack: Option<String>,
    /// RFC 3339 with milliseconds
    pub timestamp: String,
    /// Unix seconds, used for time-window queries
    pub created_at: i64,
}

impl NewRequestLog {
    /// An entry stamped with the current time
    pub fn now(level: LogLevel, message: impl Into<String>) -> Self {
        let now = chrono::Utc::now();
        Self {
            level,
            message: message.into(),
            path: None,
            method: None,
            status_code: None,
            duration_ms: None,
            ip: None,
            error_stack: None,
            timestamp: now.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            created_at: now.timestamp(),
        }
    }
}
