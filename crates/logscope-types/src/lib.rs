//! Shared types for logscope
//!
//! This crate contains data structures used across multiple logscope crates.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;

// ============================================================================
// Log Types
// ============================================================================

/// Source name used when a record carries no container name
pub const UNKNOWN_SOURCE: &str = "N/A";

/// Display format for record timestamps (always UTC)
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// A single normalized log record
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogRecord {
    /// Unique ID assigned at ingestion
    pub id: u64,

    /// Source-supplied time, or ingestion time when absent
    pub timestamp: DateTime<Utc>,

    /// Text body
    pub message: String,

    /// Originating container/process name
    pub source: String,
}

/// Records are shared between the live buffer, the query cache and views
pub type ArcLogRecord = Arc<LogRecord>;

impl LogRecord {
    pub fn new(id: u64, timestamp: DateTime<Utc>, message: String, source: String) -> Self {
        Self {
            id,
            timestamp,
            message,
            source,
        }
    }

    /// Timestamp rendered the way it is displayed and searched
    pub fn formatted_timestamp(&self) -> String {
        self.timestamp.format(TIMESTAMP_FORMAT).to_string()
    }

    /// Whether the source fell back to the sentinel
    pub fn has_unknown_source(&self) -> bool {
        self.source == UNKNOWN_SOURCE
    }
}

impl fmt::Display for LogRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} | {}",
            self.formatted_timestamp(),
            self.source,
            self.message
        )
    }
}

/// An inbound log entry as delivered by the backend, before normalization
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum RawLog {
    /// Plain text line
    Text(String),

    /// Structured object (Docker-style `log` / `container_name` / `timestamp`)
    Structured(Map<String, Value>),

    /// Anything else (numbers, arrays, null)
    Other(Value),
}

impl From<Value> for RawLog {
    fn from(value: Value) -> Self {
        match value {
            Value::String(s) => Self::Text(s),
            Value::Object(map) => Self::Structured(map),
            other => Self::Other(other),
        }
    }
}

impl From<&str> for RawLog {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// How the backend orders its initial batch
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InitialOrder {
    /// Infer from the first and last timestamps
    #[default]
    Auto,
    NewestFirst,
    OldestFirst,
}

// ============================================================================
// Filter Types
// ============================================================================

/// User-supplied search criteria
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    /// Inclusive lower bound (None = unbounded)
    pub start_time: Option<DateTime<Utc>>,

    /// Inclusive upper bound (None = unbounded)
    pub end_time: Option<DateTime<Utc>>,

    /// Case-insensitive substring (None = match all)
    pub query: Option<String>,
}

impl FilterCriteria {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the free-text query; blank input clears it
    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        let query = query.into();
        self.query = if query.trim().is_empty() {
            None
        } else {
            Some(query)
        };
        self
    }

    pub fn with_start(mut self, start: DateTime<Utc>) -> Self {
        self.start_time = Some(start);
        self
    }

    pub fn with_end(mut self, end: DateTime<Utc>) -> Self {
        self.end_time = Some(end);
        self
    }

    /// Query text, treating blank strings as absent
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref().filter(|q| !q.trim().is_empty())
    }

    /// Check if criteria match everything
    pub fn is_empty(&self) -> bool {
        self.start_time.is_none() && self.end_time.is_none() && self.query().is_none()
    }

    /// Check if a time bound is set
    pub fn has_time_range(&self) -> bool {
        self.start_time.is_some() || self.end_time.is_some()
    }
}

// ============================================================================
// Connection Types
// ============================================================================

/// Push channel lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Error,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state plus the transport error that caused `Error`
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub error: Option<String>,
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(err) => write!(f, "{}: {}", self.state, err),
            None => write!(f, "{}", self.state),
        }
    }
}

/// Events emitted by a push channel
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelEvent {
    /// Handshake completed
    Connect,

    /// Connection closed
    Disconnect { reason: String },

    /// Connection attempt failed
    ConnectError { message: String },

    /// Transport error on an established connection
    Error { message: String },

    /// One log entry delivered
    Log(RawLog),
}

/// A channel event tagged with the connection session that produced it
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelMessage {
    pub session: u64,
    pub event: ChannelEvent,
}

impl ChannelMessage {
    pub fn new(session: u64, event: ChannelEvent) -> Self {
        Self { session, event }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_raw_log_from_value() {
        let text: RawLog = serde_json::from_str(r#""plain line""#).unwrap();
        assert_eq!(text, RawLog::Text("plain line".to_string()));

        let structured: RawLog = serde_json::from_str(r#"{"log":"hi"}"#).unwrap();
        assert!(matches!(structured, RawLog::Structured(_)));

        let other: RawLog = serde_json::from_str("42").unwrap();
        assert!(matches!(other, RawLog::Other(_)));
    }

    #[test]
    fn test_blank_query_is_absent() {
        let criteria = FilterCriteria::new().with_query("   ");
        assert!(criteria.query().is_none());
        assert!(criteria.is_empty());

        let criteria = FilterCriteria {
            query: Some(String::new()),
            ..Default::default()
        };
        assert!(criteria.is_empty());
    }

    #[test]
    fn test_formatted_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        let record = LogRecord::new(1, ts, "msg".to_string(), "web".to_string());
        assert_eq!(record.formatted_timestamp(), "2024-01-15T10:30:00.000Z");
        assert_eq!(record.to_string(), "2024-01-15T10:30:00.000Z web | msg");
    }

    #[test]
    fn test_connection_status_display() {
        let status = ConnectionStatus {
            state: ConnectionState::Error,
            error: Some("timeout".to_string()),
        };
        assert_eq!(status.to_string(), "error: timeout");
        assert!(!status.is_connected());
    }
}
