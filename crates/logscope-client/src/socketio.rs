//! Minimal Socket.IO v4 packet codec (Engine.IO v4 over WebSocket text frames).
//!
//! Only what a receive-mostly client needs: the Engine.IO handshake and
//! heartbeat, Socket.IO namespace connect/disconnect, and text events.
//! Binary events are reported as unsupported.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{ClientError, Result};

/// Engine.IO protocol revision requested in the handshake URL
pub const ENGINE_IO_VERSION: &str = "4";

/// Engine.IO handshake payload
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenPayload {
    pub sid: String,
    #[serde(default)]
    pub ping_interval: u64,
    #[serde(default)]
    pub ping_timeout: u64,
}

/// A decoded text frame
#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    Open(OpenPayload),
    Close,
    Ping,
    Pong,
    Noop,
    /// Namespace connect acknowledged
    Connect,
    /// Namespace disconnected by the server
    Disconnect,
    /// Event with a name and its arguments
    Event { name: String, args: Vec<Value> },
    /// Namespace connect refused
    ConnectError(String),
    /// Acks and binary packets
    Unsupported(char),
}

impl Packet {
    /// Decode a WebSocket text frame
    pub fn decode(frame: &str) -> Result<Self> {
        let mut chars = frame.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ClientError::Protocol("empty frame".to_string()))?;
        let rest = chars.as_str();

        match kind {
            '0' => {
                let payload: OpenPayload = serde_json::from_str(rest)?;
                Ok(Self::Open(payload))
            }
            '1' => Ok(Self::Close),
            '2' => Ok(Self::Ping),
            '3' => Ok(Self::Pong),
            '4' => Self::decode_message(rest),
            '6' => Ok(Self::Noop),
            other => Err(ClientError::Protocol(format!(
                "unknown engine.io packet type '{}'",
                other
            ))),
        }
    }

    fn decode_message(body: &str) -> Result<Self> {
        let mut chars = body.chars();
        let kind = chars
            .next()
            .ok_or_else(|| ClientError::Protocol("empty socket.io packet".to_string()))?;
        let data = skip_ack_id(skip_namespace(chars.as_str()));

        match kind {
            '0' => Ok(Self::Connect),
            '1' => Ok(Self::Disconnect),
            '2' => Self::decode_event(data),
            '4' => Ok(Self::ConnectError(connect_error_message(data))),
            '3' | '5' | '6' => Ok(Self::Unsupported(kind)),
            other => Err(ClientError::Protocol(format!(
                "unknown socket.io packet type '{}'",
                other
            ))),
        }
    }

    fn decode_event(data: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(data)?;
        let Value::Array(mut items) = value else {
            return Err(ClientError::Protocol("event payload is not an array".to_string()));
        };
        if items.is_empty() {
            return Err(ClientError::Protocol("event without a name".to_string()));
        }
        let name = match items.remove(0) {
            Value::String(name) => name,
            _ => return Err(ClientError::Protocol("event name is not a string".to_string())),
        };
        Ok(Self::Event { name, args: items })
    }

    /// Client frame connecting to the default namespace
    pub fn encode_connect() -> &'static str {
        "40"
    }

    /// Client frame leaving the default namespace
    pub fn encode_disconnect() -> &'static str {
        "41"
    }

    /// Heartbeat reply
    pub fn encode_pong() -> &'static str {
        "3"
    }
}

/// Strip a `/namespace,` prefix
fn skip_namespace(data: &str) -> &str {
    if data.starts_with('/') {
        match data.find(',') {
            Some(idx) => &data[idx + 1..],
            None => "",
        }
    } else {
        data
    }
}

/// Strip a numeric ack id
fn skip_ack_id(data: &str) -> &str {
    data.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn connect_error_message(data: &str) -> String {
    match serde_json::from_str::<Value>(data) {
        Ok(Value::Object(map)) => match map.get("message") {
            Some(Value::String(msg)) => msg.clone(),
            _ => Value::Object(map).to_string(),
        },
        Ok(Value::String(msg)) => msg,
        Ok(other) => other.to_string(),
        Err(_) if data.is_empty() => "connection refused".to_string(),
        Err(_) => data.to_string(),
    }
}
