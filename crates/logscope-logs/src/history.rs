use logscope_types::ArcLogRecord;

/// Result set of the last successful backend query
#[derive(Clone, Debug, Default)]
pub struct HistoryCache {
    records: Vec<ArcLogRecord>,
}

impl HistoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached results wholesale
    pub fn set(&mut self, records: Vec<ArcLogRecord>) {
        self.records = records;
    }

    /// Cached results in backend order
    pub fn get(&self) -> &[ArcLogRecord] {
        &self.records
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
