use std::collections::VecDeque;

use logscope_types::ArcLogRecord;

/// Bounded store of pushed records, most recent first
#[derive(Clone, Debug)]
pub struct LiveBuffer {
    /// Internal storage, front = newest arrival
    entries: VecDeque<ArcLogRecord>,

    /// Maximum capacity
    capacity: usize,
}

impl LiveBuffer {
    /// Create a new buffer with the given capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Push a new record, evicting the oldest arrival if at capacity.
    /// Returns the evicted record.
    pub fn push(&mut self, record: ArcLogRecord) -> Option<ArcLogRecord> {
        debug_assert!(!self.contains(record.id), "duplicate record id {}", record.id);
        self.entries.push_front(record);
        if self.entries.len() > self.capacity {
            self.entries.pop_back()
        } else {
            None
        }
    }

    /// Append records, newest first, behind everything already buffered.
    /// Stops once the buffer is full. Returns how many were kept.
    pub fn seed<I>(&mut self, records: I) -> usize
    where
        I: IntoIterator<Item = ArcLogRecord>,
    {
        let mut kept = 0;
        for record in records {
            if self.entries.len() >= self.capacity {
                break;
            }
            self.entries.push_back(record);
            kept += 1;
        }
        kept
    }

    /// Copy of the current contents, most recent first
    pub fn snapshot(&self) -> Vec<ArcLogRecord> {
        self.entries.iter().cloned().collect()
    }

    /// Iterate most recent first
    pub fn iter(&self) -> impl Iterator<Item = &ArcLogRecord> {
        self.entries.iter()
    }

    /// Check if a record with this ID is buffered
    pub fn contains(&self, id: u64) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Total entry count
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clear all entries
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use logscope_types::LogRecord;
    use std::sync::Arc;

    fn record(id: u64, message: &str) -> ArcLogRecord {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
        Arc::new(LogRecord::new(id, ts, message.to_string(), "web".to_string()))
    }

    fn messages(buffer: &LiveBuffer) -> Vec<String> {
        buffer.iter().map(|r| r.message.clone()).collect()
    }

    #[test]
    fn test_bounded_growth() {
        for pushes in [0usize, 1, 3, 10, 25] {
            let mut buffer = LiveBuffer::new(10);
            for i in 0..pushes {
                buffer.push(record(i as u64, &i.to_string()));
            }
            assert_eq!(buffer.len(), pushes.min(10));

            // Most recent min(N, C) in reverse arrival order
            let expected: Vec<String> = (0..pushes)
                .rev()
                .take(10)
                .map(|i| i.to_string())
                .collect();
            assert_eq!(messages(&buffer), expected);
        }
    }

    #[test]
    fn test_eviction_returns_oldest_arrival() {
        let mut buffer = LiveBuffer::new(2);
        assert!(buffer.push(record(0, "A")).is_none());
        assert!(buffer.push(record(1, "B")).is_none());
        let evicted = buffer.push(record(2, "C")).unwrap();
        assert_eq!(evicted.message, "A");
        assert_eq!(messages(&buffer), vec!["C", "B"]);
    }

    #[test]
    fn test_eviction_ignores_timestamps() {
        let mut buffer = LiveBuffer::new(2);
        let late = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        buffer.push(Arc::new(LogRecord::new(0, late, "future".into(), "web".into())));
        buffer.push(record(1, "B"));
        buffer.push(record(2, "C"));
        assert_eq!(messages(&buffer), vec!["C", "B"]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut buffer = LiveBuffer::new(5);
        buffer.push(record(0, "A"));
        let snapshot = buffer.snapshot();
        buffer.push(record(1, "B"));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_seed_goes_behind_live_records() {
        let mut buffer = LiveBuffer::new(4);
        buffer.push(record(10, "live"));
        let kept = buffer.seed(vec![
            record(0, "h3"),
            record(1, "h2"),
            record(2, "h1"),
            record(3, "h0"),
        ]);
        assert_eq!(kept, 3);
        assert_eq!(messages(&buffer), vec!["live", "h3", "h2", "h1"]);
    }

    #[test]
    fn test_contains_and_clear() {
        let mut buffer = LiveBuffer::new(3);
        buffer.push(record(7, "x"));
        assert!(buffer.contains(7));
        assert!(!buffer.contains(8));
        buffer.clear();
        assert!(buffer.is_empty());
        assert_eq!(buffer.capacity(), 3);
    }
}
