use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use logscope_client::ClientError;
use logscope_types::{
    ArcLogRecord, ChannelEvent, ChannelMessage, ConnectionStatus, FilterCriteria, InitialOrder,
    RawLog,
};

use crate::buffer::LiveBuffer;
use crate::connection::ConnectionMachine;
use crate::error::EngineError;
use crate::filter::RecordFilter;
use crate::history::HistoryCache;
use crate::normalizer::Normalizer;
use crate::view::merge_view;

/// Default live buffer capacity
pub const DEFAULT_CAPACITY: usize = 100;

/// Default size of the initial batch
pub const DEFAULT_INITIAL_FETCH: usize = 50;

/// Engine settings
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// Live buffer capacity; also the search result limit
    pub capacity: usize,

    /// Entries fetched on startup (0 = skip)
    pub initial_fetch: usize,

    /// Ordering convention of the initial batch
    pub initial_order: InitialOrder,

    /// Drop query results superseded by a later search or a clear
    pub discard_stale_queries: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            initial_fetch: DEFAULT_INITIAL_FETCH,
            initial_order: InitialOrder::Auto,
            discard_stale_queries: true,
        }
    }
}

/// Handle for one issued search
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueryTicket {
    generation: u64,
    criteria: FilterCriteria,
}

impl QueryTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }
}

/// Everything that can change engine state from the outside
#[derive(Debug)]
pub enum EngineEvent {
    /// Push channel delivery or lifecycle event
    Channel(ChannelMessage),

    /// Startup batch fetched (or failed)
    InitialBatch(Result<Vec<RawLog>, ClientError>),

    /// A search finished
    QueryCompleted {
        ticket: QueryTicket,
        result: Result<Vec<RawLog>, ClientError>,
    },
}

/// State container for the live buffer, query cache, filter and connection.
///
/// All mutation goes through [`LogEngine::handle`] and the `begin_*` /
/// [`LogEngine::clear_filter`] entry points; reads return snapshots.
#[derive(Debug)]
pub struct LogEngine {
    config: EngineConfig,
    normalizer: Normalizer,
    live: LiveBuffer,
    history: HistoryCache,

    /// Criteria of the last applied search
    filter: RecordFilter,

    /// Whether the view merges in the query cache
    filtering: bool,

    connection: ConnectionMachine,
    last_error: Option<EngineError>,

    /// Latest search generation; bumped by searches and clears
    generation: u64,

    /// Search awaiting its result
    pending: Option<QueryTicket>,

    /// Incremented on every state change
    revision: u64,
}

impl LogEngine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            live: LiveBuffer::new(config.capacity),
            config,
            normalizer: Normalizer::new(),
            history: HistoryCache::new(),
            filter: RecordFilter::match_all(),
            filtering: false,
            connection: ConnectionMachine::new(),
            last_error: None,
            generation: 0,
            pending: None,
            revision: 0,
        }
    }

    /// Single ingestion entry point. Returns whether anything changed.
    pub fn handle(&mut self, event: EngineEvent) -> bool {
        let changed = match event {
            EngineEvent::Channel(message) => self.handle_channel(message),
            EngineEvent::InitialBatch(result) => self.handle_initial_batch(result),
            EngineEvent::QueryCompleted { ticket, result } => self.complete_query(ticket, result),
        };
        if changed {
            self.bump();
        }
        changed
    }

    /// Startup connect was issued for `session`
    pub fn begin_connect(&mut self, session: u64) {
        self.connection.begin_connect(session);
        self.bump();
    }

    /// Manual reconnect was issued; `session` is the new connection
    pub fn reconnect(&mut self, session: u64) {
        info!(session, "manual reconnect");
        self.connection.reconnect(session);
        self.bump();
    }

    /// Register a search; the result comes back as `QueryCompleted`
    pub fn begin_query(&mut self, criteria: FilterCriteria) -> QueryTicket {
        self.generation += 1;
        let ticket = QueryTicket {
            generation: self.generation,
            criteria,
        };
        self.pending = Some(ticket.clone());
        self.bump();
        debug!(generation = ticket.generation, criteria = ?ticket.criteria, "search issued");
        ticket
    }

    /// A search ended without a result (request dropped or tailer stopped).
    /// Returns whether it was still the one in flight.
    pub fn abandon_query(&mut self, ticket: &QueryTicket) -> bool {
        if !self.is_pending(ticket) {
            return false;
        }
        debug!(generation = ticket.generation, "search abandoned");
        self.pending = None;
        self.bump();
        true
    }

    fn is_pending(&self, ticket: &QueryTicket) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|p| p.generation == ticket.generation)
    }

    /// Drop the active filter and revert to the live tail
    pub fn clear_filter(&mut self) {
        // Supersedes any search still in flight
        self.generation += 1;
        self.pending = None;
        self.filter = RecordFilter::match_all();
        self.history.clear();
        self.filtering = false;
        if self.last_error.as_ref().is_some_and(EngineError::is_network) {
            self.last_error = None;
        }
        self.bump();
        debug!("filter cleared");
    }

    fn handle_channel(&mut self, message: ChannelMessage) -> bool {
        if !self.connection.accepts(message.session) {
            debug!(session = message.session, "ignoring event from stale session");
            return false;
        }

        match message.event {
            ChannelEvent::Log(raw) => {
                let record = Arc::new(self.normalizer.normalize(raw));
                debug!(id = record.id, source = %record.source, "log received");
                self.live.push(record);
                true
            }
            event => {
                let changed = self.connection.apply(&event);
                match event {
                    ChannelEvent::ConnectError { message } | ChannelEvent::Error { message } => {
                        self.last_error = Some(EngineError::Transport(message));
                        true
                    }
                    ChannelEvent::Connect => {
                        if matches!(self.last_error, Some(EngineError::Transport(_))) {
                            self.last_error = None;
                            return true;
                        }
                        changed
                    }
                    _ => changed,
                }
            }
        }
    }

    fn handle_initial_batch(&mut self, result: Result<Vec<RawLog>, ClientError>) -> bool {
        match result {
            Ok(batch) => {
                let records = self.normalize_batch(batch);
                let records = newest_first(records, self.config.initial_order);
                let kept = self.live.seed(records);
                info!(kept, "initial batch loaded");
                kept > 0
            }
            Err(err) => {
                warn!(error = %err, "initial fetch failed");
                self.last_error = Some(EngineError::from(err));
                true
            }
        }
    }

    fn complete_query(
        &mut self,
        ticket: QueryTicket,
        result: Result<Vec<RawLog>, ClientError>,
    ) -> bool {
        let stale = ticket.generation != self.generation;
        if stale && self.config.discard_stale_queries {
            debug!(generation = ticket.generation, "discarding superseded search result");
            return false;
        }
        if self.is_pending(&ticket) {
            self.pending = None;
        }

        match result {
            Ok(batch) => {
                let records = self.normalize_batch(batch);
                info!(count = records.len(), "search completed");
                self.history.set(records);
                self.filter = RecordFilter::new(&ticket.criteria);
                self.filtering = true;
                if self.last_error.as_ref().is_some_and(EngineError::is_network) {
                    self.last_error = None;
                }
            }
            Err(err) => {
                warn!(error = %err, "search failed");
                self.last_error = Some(EngineError::from(err));
            }
        }
        true
    }

    /// One ingestion time for the whole batch keeps untimed entries in order
    fn normalize_batch(&self, batch: Vec<RawLog>) -> Vec<ArcLogRecord> {
        let now = Utc::now();
        batch
            .into_iter()
            .map(|raw| Arc::new(self.normalizer.normalize_at(raw, now)))
            .collect()
    }

    fn bump(&mut self) {
        self.revision += 1;
    }

    /// The displayed records
    pub fn view(&self) -> Vec<ArcLogRecord> {
        merge_view(self.filtering, &self.live, &self.history, &self.filter)
    }

    pub fn live(&self) -> &LiveBuffer {
        &self.live
    }

    pub fn history(&self) -> &HistoryCache {
        &self.history
    }

    /// Criteria of the active filter (empty when not filtering)
    pub fn criteria(&self) -> &FilterCriteria {
        self.filter.criteria()
    }

    /// Criteria the next search should build on: the search in flight,
    /// else the active filter
    pub fn working_criteria(&self) -> &FilterCriteria {
        self.pending
            .as_ref()
            .map_or(self.filter.criteria(), QueryTicket::criteria)
    }

    pub fn filter(&self) -> &RecordFilter {
        &self.filter
    }

    pub fn is_filtering(&self) -> bool {
        self.filtering
    }

    /// Whether a search is in flight
    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn connection(&self) -> &ConnectionMachine {
        &self.connection
    }

    pub fn last_error(&self) -> Option<&EngineError> {
        self.last_error.as_ref()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }
}

/// Normalize a batch to most-recent-first
fn newest_first(mut records: Vec<ArcLogRecord>, order: InitialOrder) -> Vec<ArcLogRecord> {
    let reverse = match order {
        InitialOrder::NewestFirst => false,
        InitialOrder::OldestFirst => true,
        InitialOrder::Auto => match (records.first(), records.last()) {
            (Some(first), Some(last)) => first.timestamp < last.timestamp,
            _ => false,
        },
    };
    if reverse {
        records.reverse();
    }
    records
}
