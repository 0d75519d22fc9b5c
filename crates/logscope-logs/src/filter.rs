use regex::{Regex, RegexBuilder};

use logscope_types::{FilterCriteria, LogRecord};

/// Compiled filter for log records
#[derive(Clone)]
pub struct RecordFilter {
    /// Case-insensitive matcher for the escaped query (if any)
    regex: Option<Regex>,

    /// Criteria the filter was built from
    criteria: FilterCriteria,
}

impl RecordFilter {
    /// Compile criteria into a filter
    pub fn new(criteria: &FilterCriteria) -> Self {
        let regex = criteria.query().and_then(|query| {
            RegexBuilder::new(&regex::escape(query))
                .case_insensitive(true)
                .build()
                .ok()
        });

        Self {
            regex,
            criteria: criteria.clone(),
        }
    }

    /// Filter that matches every record
    pub fn match_all() -> Self {
        Self::new(&FilterCriteria::default())
    }

    /// Check if a record passes the time range and text query
    pub fn matches(&self, record: &LogRecord) -> bool {
        let start_match = self
            .criteria
            .start_time
            .is_none_or(|start| record.timestamp >= start);
        let end_match = self
            .criteria
            .end_time
            .is_none_or(|end| record.timestamp <= end);

        start_match && end_match && self.text_matches(record)
    }

    fn text_matches(&self, record: &LogRecord) -> bool {
        let Some(query) = self.criteria.query() else {
            return true;
        };

        match &self.regex {
            Some(re) => {
                re.is_match(&record.message)
                    || re.is_match(&record.source)
                    || re.is_match(&record.formatted_timestamp())
            }
            // Pattern too large for the regex engine
            None => {
                let needle = query.to_lowercase();
                record.message.to_lowercase().contains(&needle)
                    || record.source.to_lowercase().contains(&needle)
                    || record.formatted_timestamp().to_lowercase().contains(&needle)
            }
        }
    }

    /// Find all match positions in a string (for highlighting)
    pub fn find_matches(&self, text: &str) -> Vec<(usize, usize)> {
        match &self.regex {
            Some(re) => re.find_iter(text).map(|m| (m.start(), m.end())).collect(),
            None => Vec::new(),
        }
    }

    /// Get the criteria this filter was built from
    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    /// Check if filter is empty (matches everything)
    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self::match_all()
    }
}

impl std::fmt::Debug for RecordFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordFilter")
            .field("query", &self.criteria.query)
            .field("start_time", &self.criteria.start_time)
            .field("end_time", &self.criteria.end_time)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, TimeZone, Utc};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, hour, minute, 0).unwrap()
    }

    fn record(ts: DateTime<Utc>, message: &str, source: &str) -> LogRecord {
        LogRecord::new(0, ts, message.to_string(), source.to_string())
    }

    #[test]
    fn test_empty_criteria_match_everything() {
        let filter = RecordFilter::match_all();
        assert!(filter.is_empty());
        assert!(filter.matches(&record(at(1, 0), "", "")));
    }

    #[test]
    fn test_query_is_case_insensitive() {
        let filter = RecordFilter::new(&FilterCriteria::new().with_query("err"));
        assert!(filter.matches(&record(at(10, 0), "Connection ERROR", "api")));
        assert!(filter.matches(&record(at(10, 0), "ok", "Error-Reporter")));
        assert!(!filter.matches(&record(at(10, 0), "all good", "api")));
    }

    #[test]
    fn test_query_matches_formatted_timestamp() {
        let filter = RecordFilter::new(&FilterCriteria::new().with_query("10:30"));
        assert!(filter.matches(&record(at(10, 30), "tick", "cron")));
        assert!(!filter.matches(&record(at(11, 0), "tick", "cron")));
    }

    #[test]
    fn test_query_is_literal_not_regex() {
        let filter = RecordFilter::new(&FilterCriteria::new().with_query("a.c"));
        assert!(filter.matches(&record(at(10, 0), "xa.cx", "s")));
        assert!(!filter.matches(&record(at(10, 0), "abc", "s")));
    }

    #[test]
    fn test_time_bounds_are_inclusive() {
        let criteria = FilterCriteria::new().with_start(at(10, 0)).with_end(at(11, 0));
        let filter = RecordFilter::new(&criteria);
        assert!(filter.matches(&record(at(10, 0), "m", "s")));
        assert!(filter.matches(&record(at(11, 0), "m", "s")));
        assert!(!filter.matches(&record(at(9, 59), "m", "s")));
        assert!(!filter.matches(&record(at(11, 1), "m", "s")));
    }

    #[test]
    fn test_combined_criteria() {
        let criteria = FilterCriteria::new()
            .with_start(at(10, 0))
            .with_end(at(11, 0))
            .with_query("err");
        let filter = RecordFilter::new(&criteria);

        let cases = [
            (at(10, 15), "disk error", true),
            (at(10, 15), "disk ok", false),
            (at(12, 0), "disk error", false),
            (at(9, 0), "disk error", false),
        ];
        for (ts, message, expected) in cases {
            assert_eq!(
                filter.matches(&record(ts, message, "node")),
                expected,
                "{} at {}",
                message,
                ts
            );
        }
    }

    #[test]
    fn test_find_matches() {
        let filter = RecordFilter::new(&FilterCriteria::new().with_query("error"));
        let matches = filter.find_matches("an Error occurred, another error here");
        assert_eq!(matches, vec![(3, 8), (27, 32)]);
    }
}
