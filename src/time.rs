//! Time argument parsing

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

/// Local formats accepted besides RFC 3339
const LOCAL_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"];

/// Parse a time argument: RFC 3339, or a local `YYYY-MM-DDTHH:MM[:SS]`
pub fn parse_time_arg(input: &str) -> Result<DateTime<Utc>, String> {
    parse_time_in(input.trim(), &Local)
}

fn parse_time_in<Tz: TimeZone>(input: &str, tz: &Tz) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in LOCAL_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            // Ambiguous (DST fold) picks the earlier instant
            return tz
                .from_local_datetime(&naive)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .ok_or_else(|| format!("'{}' does not exist in the local time zone", input));
        }
    }

    Err(format!(
        "invalid time '{}': expected RFC 3339 or YYYY-MM-DDTHH:MM[:SS]",
        input
    ))
}
