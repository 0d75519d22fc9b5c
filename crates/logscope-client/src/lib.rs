//! Backend client for logscope
//!
//! This crate talks to the log backend: historical queries over HTTP and the
//! Socket.IO push channel that delivers live entries and connection events.

mod backend;
mod channel;
mod error;
mod reconnect;
mod socketio;

pub use backend::{DEFAULT_REQUEST_TIMEOUT, HttpBackend, LogBackend, parse_entries, query_params};
pub use channel::{ChannelConfig, DEFAULT_LOG_EVENT, PushChannel, SocketIoChannel, socket_url};
pub use error::{ClientError, Result};
pub use reconnect::{DEFAULT_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_DELAY, ReconnectPolicy};
pub use socketio::{OpenPayload, Packet};

// Re-export types used in our public API
pub use logscope_types::{ChannelEvent, ChannelMessage, FilterCriteria, RawLog};
