//! Merge of the live buffer and the query cache into the displayed view.

use logscope_types::ArcLogRecord;

use crate::buffer::LiveBuffer;
use crate::filter::RecordFilter;
use crate::history::HistoryCache;

/// Compose the displayed records.
///
/// Without an active filter this is the live tail, unfiltered. With one it
/// is the query results followed by the live records, passed through the
/// filter. Input order is preserved; nothing is re-sorted.
pub fn merge_view(
    filtering: bool,
    live: &LiveBuffer,
    history: &HistoryCache,
    filter: &RecordFilter,
) -> Vec<ArcLogRecord> {
    if !filtering {
        return live.snapshot();
    }

    history
        .get()
        .iter()
        .chain(live.iter())
        .filter(|record| filter.matches(record))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use logscope_types::{FilterCriteria, LogRecord};
    use std::sync::Arc;

    fn record(id: u64, message: &str) -> ArcLogRecord {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        Arc::new(LogRecord::new(id, ts, message.to_string(), "app".to_string()))
    }

    fn messages(view: &[ArcLogRecord]) -> Vec<&str> {
        view.iter().map(|r| r.message.as_str()).collect()
    }

    #[test]
    fn test_live_only_without_filter() {
        let mut live = LiveBuffer::new(10);
        live.push(record(0, "one"));
        live.push(record(1, "two"));
        let mut history = HistoryCache::new();
        history.set(vec![record(2, "old")]);

        // Criteria are ignored while filtering is off
        let filter = RecordFilter::new(&FilterCriteria::new().with_query("zzz"));
        let view = merge_view(false, &live, &history, &filter);
        assert_eq!(messages(&view), vec!["two", "one"]);
    }

    #[test]
    fn test_history_first_when_filtering() {
        let mut live = LiveBuffer::new(10);
        live.push(record(0, "live a"));
        live.push(record(1, "live b"));
        let mut history = HistoryCache::new();
        history.set(vec![record(2, "hist a"), record(3, "hist b")]);

        let view = merge_view(true, &live, &history, &RecordFilter::match_all());
        assert_eq!(
            messages(&view),
            vec!["hist a", "hist b", "live b", "live a"]
        );
    }

    #[test]
    fn test_filter_applies_to_both_sources() {
        let mut live = LiveBuffer::new(10);
        live.push(record(0, "live error"));
        live.push(record(1, "live ok"));
        let mut history = HistoryCache::new();
        history.set(vec![record(2, "hist ok"), record(3, "hist ERROR")]);

        let filter = RecordFilter::new(&FilterCriteria::new().with_query("error"));
        let view = merge_view(true, &live, &history, &filter);
        assert_eq!(messages(&view), vec!["hist ERROR", "live error"]);
    }
}
