//! Log aggregation engine for logscope
//!
//! This crate provides normalization, the bounded live buffer, the
//! historical query cache, filtering, the connection state machine and
//! the async tailer that drives them.

mod buffer;
mod connection;
mod engine;
mod error;
mod filter;
mod history;
mod normalizer;
mod tailer;
mod view;

pub use buffer::LiveBuffer;
pub use connection::{CLIENT_DISCONNECT_REASON, ConnectionMachine};
pub use engine::{
    DEFAULT_CAPACITY, DEFAULT_INITIAL_FETCH, EngineConfig, EngineEvent, LogEngine, QueryTicket,
};
pub use error::{EngineError, Result};
pub use filter::RecordFilter;
pub use history::HistoryCache;
pub use normalizer::Normalizer;
pub use tailer::LogTailer;
pub use view::merge_view;

// Re-export types used in our public API
pub use logscope_types::{
    ArcLogRecord, ConnectionState, ConnectionStatus, FilterCriteria, InitialOrder, LogRecord,
};
