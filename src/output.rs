//! Terminal output for the tail command

use std::collections::HashSet;
use std::io::{self, Write};

use logscope_logs::{ArcLogRecord, ConnectionStatus, EngineError, FilterCriteria, LogRecord};

/// Which records the view is currently made of
#[derive(Clone, Debug, PartialEq)]
enum ViewMode {
    Live,
    Filtered(FilterCriteria),
}

/// Prints each record of the view once, oldest first.
///
/// A record only leaves the view for good within one mode (eviction), so
/// the printed set is pruned to the current view. A mode switch (search
/// applied or cleared) prints a header and replays the whole view.
pub struct ViewPrinter {
    mode: ViewMode,
    printed: HashSet<u64>,
    status: Option<ConnectionStatus>,
    error: Option<EngineError>,
}

impl ViewPrinter {
    pub fn new() -> Self {
        Self {
            mode: ViewMode::Live,
            printed: HashSet::new(),
            status: None,
            error: None,
        }
    }

    /// Records of `view` not printed yet, oldest first
    pub fn update(
        &mut self,
        view: &[ArcLogRecord],
        filtering: bool,
        criteria: &FilterCriteria,
    ) -> (Option<String>, Vec<ArcLogRecord>) {
        let mode = if filtering {
            ViewMode::Filtered(criteria.clone())
        } else {
            ViewMode::Live
        };

        let header = if mode != self.mode {
            self.printed.clear();
            let header = describe_mode(&mode);
            self.mode = mode;
            Some(header)
        } else {
            None
        };

        let mut fresh: Vec<ArcLogRecord> = view
            .iter()
            .filter(|r| !self.printed.contains(&r.id))
            .cloned()
            .collect();
        fresh.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));

        self.printed = view.iter().map(|r| r.id).collect();
        (header, fresh)
    }

    /// Status line if the connection status changed
    pub fn status_change(&mut self, status: ConnectionStatus) -> Option<String> {
        if self.status.as_ref() == Some(&status) {
            return None;
        }
        let line = format!("[connection] {}", status);
        self.status = Some(status);
        Some(line)
    }

    /// Error line if a new error was recorded
    pub fn error_change(&mut self, error: Option<EngineError>) -> Option<String> {
        if self.error == error {
            return None;
        }
        self.error = error;
        self.error.as_ref().map(|e| format!("[error] {}", e))
    }

    /// Write one refresh to stdout/stderr
    pub fn emit(
        &mut self,
        view: &[ArcLogRecord],
        filtering: bool,
        criteria: &FilterCriteria,
    ) -> io::Result<()> {
        let (header, records) = self.update(view, filtering, criteria);
        let stdout = io::stdout();
        let mut out = stdout.lock();
        if let Some(header) = header {
            writeln!(out, "-- {} --", header)?;
        }
        for record in records {
            writeln!(out, "{}", format_record(&record))?;
        }
        out.flush()
    }
}

impl Default for ViewPrinter {
    fn default() -> Self {
        Self::new()
    }
}

/// `TIMESTAMP SOURCE | MESSAGE`
pub fn format_record(record: &LogRecord) -> String {
    record.to_string()
}

fn describe_mode(mode: &ViewMode) -> String {
    match mode {
        ViewMode::Live => "live tail".to_string(),
        ViewMode::Filtered(criteria) => {
            let mut parts = Vec::new();
            if let Some(query) = criteria.query() {
                parts.push(format!("query \"{}\"", query));
            }
            if let Some(start) = criteria.start_time {
                parts.push(format!("from {}", start.to_rfc3339()));
            }
            if let Some(end) = criteria.end_time {
                parts.push(format!("until {}", end.to_rfc3339()));
            }
            if parts.is_empty() {
                "search results".to_string()
            } else {
                format!("search results for {}", parts.join(", "))
            }
        }
    }
}
