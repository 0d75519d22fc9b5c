use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicU64, Ordering};

use logscope_types::{LogRecord, RawLog, UNKNOWN_SOURCE};

/// Field names tried, in order, for the message body
const MESSAGE_FIELDS: [&str; 3] = ["log", "message", "msg"];

/// Field names tried, in order, for the originating container
const SOURCE_FIELDS: [&str; 4] = ["container_name", "containerName", "container", "source"];

/// Field names tried, in order, for the record time
const TIMESTAMP_FIELDS: [&str; 3] = ["timestamp", "time", "@timestamp"];

/// Converts inbound entries into canonical records.
///
/// Never fails: anything missing or malformed falls back to a default.
#[derive(Debug, Default)]
pub struct Normalizer {
    /// Next record ID
    next_id: AtomicU64,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize using the current time as ingestion time
    pub fn normalize(&self, raw: RawLog) -> LogRecord {
        self.normalize_at(raw, Utc::now())
    }

    /// Normalize with an explicit ingestion time
    pub fn normalize_at(&self, raw: RawLog, now: DateTime<Utc>) -> LogRecord {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);

        match raw {
            RawLog::Text(text) => LogRecord::new(id, now, text, UNKNOWN_SOURCE.to_string()),
            RawLog::Structured(fields) => {
                let message = Self::extract_message(&fields);
                let source = Self::extract_source(&fields);
                let timestamp = Self::extract_timestamp(&fields).unwrap_or(now);
                LogRecord::new(id, timestamp, message, source)
            }
            RawLog::Other(value) => {
                LogRecord::new(id, now, value.to_string(), UNKNOWN_SOURCE.to_string())
            }
        }
    }

    /// Number of records normalized so far
    pub fn issued(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    fn extract_message(fields: &Map<String, Value>) -> String {
        for key in MESSAGE_FIELDS {
            match fields.get(key) {
                Some(Value::String(s)) => return trim_line_ending(s).to_string(),
                Some(Value::Null) | None => {}
                Some(other) => return other.to_string(),
            }
        }
        // No message field: show the whole entry
        Value::Object(fields.clone()).to_string()
    }

    fn extract_source(fields: &Map<String, Value>) -> String {
        SOURCE_FIELDS
            .iter()
            .filter_map(|key| fields.get(*key).and_then(Value::as_str))
            .map(|name| name.trim_start_matches('/'))
            .find(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| UNKNOWN_SOURCE.to_string())
    }

    fn extract_timestamp(fields: &Map<String, Value>) -> Option<DateTime<Utc>> {
        TIMESTAMP_FIELDS
            .iter()
            .filter_map(|key| fields.get(*key))
            .find_map(parse_timestamp)
    }
}

/// Parse RFC 3339 / naive datetime strings or epoch milliseconds
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
                return Some(ts.with_timezone(&Utc));
            }
            // Naive forms carry no offset and are read as UTC
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

/// Docker's json-file driver keeps the trailing newline of each line
fn trim_line_ending(s: &str) -> &str {
    let s = s.strip_suffix('\n').unwrap_or(s);
    s.strip_suffix('\r').unwrap_or(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn structured(value: Value) -> RawLog {
        RawLog::from(value)
    }

    #[test]
    fn test_plain_text() {
        let normalizer = Normalizer::new();
        let record = normalizer.normalize_at(RawLog::from("hello"), now());
        assert_eq!(record.message, "hello");
        assert_eq!(record.source, "N/A");
        assert_eq!(record.timestamp, now());
    }

    #[test]
    fn test_docker_entry() {
        let normalizer = Normalizer::new();
        let raw = structured(json!({
            "log": "GET /health 200\n",
            "container_name": "/api",
            "timestamp": "2024-01-15T10:30:00.123Z",
        }));
        let record = normalizer.normalize_at(raw, now());
        assert_eq!(record.message, "GET /health 200");
        assert_eq!(record.source, "api");
        assert_eq!(
            record.timestamp,
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
                + chrono::Duration::milliseconds(123)
        );
    }

    #[test]
    fn test_missing_fields_fall_back() {
        let normalizer = Normalizer::new();
        let record = normalizer.normalize_at(structured(json!({"level": "info"})), now());
        assert_eq!(record.message, r#"{"level":"info"}"#);
        assert_eq!(record.source, "N/A");
        assert_eq!(record.timestamp, now());
    }

    #[test]
    fn test_malformed_timestamp_falls_back() {
        let normalizer = Normalizer::new();
        let raw = structured(json!({"log": "x", "timestamp": "yesterday-ish"}));
        let record = normalizer.normalize_at(raw, now());
        assert_eq!(record.timestamp, now());

        let raw = structured(json!({"log": "x", "timestamp": true}));
        assert_eq!(normalizer.normalize_at(raw, now()).timestamp, now());
    }

    #[test]
    fn test_alternate_field_names() {
        let normalizer = Normalizer::new();
        let raw = structured(json!({
            "msg": "started",
            "container": "worker",
            "time": 1_705_314_600_000_i64,
        }));
        let record = normalizer.normalize_at(raw, now());
        assert_eq!(record.message, "started");
        assert_eq!(record.source, "worker");
        assert_eq!(
            record.timestamp,
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_naive_timestamp_read_as_utc() {
        let normalizer = Normalizer::new();
        let raw = structured(json!({"log": "x", "timestamp": "2024-01-15 10:30:00"}));
        let record = normalizer.normalize_at(raw, now());
        assert_eq!(
            record.timestamp,
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap()
        );
    }

    #[test]
    fn test_non_string_log_field() {
        let normalizer = Normalizer::new();
        let raw = structured(json!({"log": {"event": "login"}}));
        let record = normalizer.normalize_at(raw, now());
        assert_eq!(record.message, r#"{"event":"login"}"#);
    }

    #[test]
    fn test_other_values() {
        let normalizer = Normalizer::new();
        let record = normalizer.normalize_at(RawLog::from(json!([1, 2])), now());
        assert_eq!(record.message, "[1,2]");
        assert_eq!(record.source, "N/A");
    }

    #[test]
    fn test_ids_are_unique() {
        let normalizer = Normalizer::new();
        let ids: Vec<u64> = (0..5)
            .map(|_| normalizer.normalize(RawLog::from("x")).id)
            .collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);
        assert_eq!(normalizer.issued(), 5);
    }
}
