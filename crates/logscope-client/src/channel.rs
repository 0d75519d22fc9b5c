use std::time::Duration;

use futures::{SinkExt, Stream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::backend::endpoint_url;
use crate::error::{ClientError, Result};
use crate::reconnect::ReconnectPolicy;
use crate::socketio::{ENGINE_IO_VERSION, Packet};
use logscope_types::{ChannelEvent, ChannelMessage, RawLog};

/// Event name the backend uses to deliver one log entry
pub const DEFAULT_LOG_EVENT: &str = "log_received";

/// How long to wait for the Engine.IO and namespace handshakes
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Push channel contract: connection control only, events flow through the
/// receiver handed out at construction.
pub trait PushChannel: Send {
    /// Start a new connection session, dropping any current one.
    /// Returns the session id that tags every event of that session.
    fn connect(&mut self) -> u64;

    /// Stop the current session, if any. No automatic retry follows.
    fn disconnect(&mut self);
}

/// Push channel settings
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    /// Backend base URL (http/https/ws/wss)
    pub endpoint: String,

    /// Event carrying log entries
    pub log_event: String,

    /// Automatic retry below the connection state machine
    pub reconnect: ReconnectPolicy,
}

impl ChannelConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            log_event: DEFAULT_LOG_EVENT.to_string(),
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Socket.IO client over a WebSocket transport
pub struct SocketIoChannel {
    url: Url,
    log_event: String,
    reconnect: ReconnectPolicy,
    events: mpsc::UnboundedSender<ChannelMessage>,

    /// Last session id handed out
    session: u64,

    /// Cancellation token for the running session
    cancel: CancellationToken,

    /// Running session task
    task: Option<JoinHandle<()>>,
}

impl SocketIoChannel {
    /// Create a channel and the receiver its events are delivered on
    pub fn new(config: ChannelConfig) -> Result<(Self, mpsc::UnboundedReceiver<ChannelMessage>)> {
        let url = socket_url(&config.endpoint)?;
        let (events, receiver) = mpsc::unbounded_channel();

        let channel = Self {
            url,
            log_event: config.log_event,
            reconnect: config.reconnect,
            events,
            session: 0,
            cancel: CancellationToken::new(),
            task: None,
        };
        Ok((channel, receiver))
    }

    /// The resolved WebSocket URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Check if a session task is still running
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn stop_task(&mut self) {
        self.cancel.cancel();
        self.task = None;
    }
}

impl PushChannel for SocketIoChannel {
    fn connect(&mut self) -> u64 {
        self.stop_task();
        self.session += 1;
        self.cancel = CancellationToken::new();

        let ctx = SessionContext {
            url: self.url.clone(),
            log_event: self.log_event.clone(),
            policy: self.reconnect.clone(),
            session: self.session,
            events: self.events.clone(),
            cancel: self.cancel.clone(),
        };
        info!(url = %self.url, session = self.session, "connecting push channel");
        self.task = Some(tokio::spawn(run_session(ctx)));
        self.session
    }

    fn disconnect(&mut self) {
        if self.task.is_some() {
            info!(session = self.session, "disconnecting push channel");
        }
        self.stop_task();
    }
}

impl Drop for SocketIoChannel {
    fn drop(&mut self) {
        self.stop_task();
    }
}

/// Build the Socket.IO WebSocket URL for a backend endpoint
pub fn socket_url(endpoint: &str) -> Result<Url> {
    let mut url = endpoint_url(endpoint, "socket.io/")?;
    let scheme = match url.scheme() {
        "https" | "wss" => "wss",
        _ => "ws",
    };
    // Only special schemes (http, ws, ...) can be switched to ws/wss
    if url.set_scheme(scheme).is_err() {
        return Err(ClientError::Protocol(format!(
            "unsupported endpoint scheme '{}'",
            url.scheme()
        )));
    }
    url.query_pairs_mut()
        .clear()
        .append_pair("EIO", ENGINE_IO_VERSION)
        .append_pair("transport", "websocket");
    Ok(url)
}

struct SessionContext {
    url: Url,
    log_event: String,
    policy: ReconnectPolicy,
    session: u64,
    events: mpsc::UnboundedSender<ChannelMessage>,
    cancel: CancellationToken,
}

impl SessionContext {
    fn emit(&self, event: ChannelEvent) {
        if self.cancel.is_cancelled() {
            return;
        }
        let _ = self.events.send(ChannelMessage::new(self.session, event));
    }
}

/// How one connection attempt ended
#[derive(Debug)]
enum SessionEnd {
    /// `disconnect()` was called
    Cancelled,
    /// The server left the namespace; not retried
    ServerDisconnect,
    /// An established connection dropped
    Closed(String),
    /// The handshake never completed
    Failed(String),
}

async fn run_session(ctx: SessionContext) {
    let mut attempt = 0u32;

    loop {
        match run_connection(&ctx).await {
            SessionEnd::Cancelled => return,
            SessionEnd::ServerDisconnect => {
                info!(session = ctx.session, "server closed the namespace");
                ctx.emit(ChannelEvent::Disconnect {
                    reason: "io server disconnect".to_string(),
                });
                return;
            }
            SessionEnd::Closed(reason) => {
                info!(session = ctx.session, %reason, "push channel closed");
                attempt = 0;
                ctx.emit(ChannelEvent::Disconnect { reason });
            }
            SessionEnd::Failed(message) => {
                warn!(session = ctx.session, %message, "push channel connection failed");
                ctx.emit(ChannelEvent::ConnectError { message });
            }
        }

        attempt += 1;
        if !ctx.policy.should_retry(attempt) {
            if ctx.policy.enabled {
                ctx.emit(ChannelEvent::Error {
                    message: format!("reconnection failed after {} attempts", attempt - 1),
                });
            }
            return;
        }

        let delay = ctx.policy.delay;
        info!(session = ctx.session, attempt, ?delay, "reconnecting push channel");
        tokio::select! {
            _ = ctx.cancel.cancelled() => return,
            _ = sleep(delay) => {}
        }
    }
}

async fn run_connection(ctx: &SessionContext) -> SessionEnd {
    let connecting = tokio::select! {
        _ = ctx.cancel.cancelled() => return SessionEnd::Cancelled,
        result = timeout(HANDSHAKE_TIMEOUT, tokio_tungstenite::connect_async(ctx.url.as_str())) => result,
    };
    let ws = match connecting {
        Ok(Ok((ws, _))) => ws,
        Ok(Err(e)) => return SessionEnd::Failed(e.to_string()),
        Err(_) => return SessionEnd::Failed("connection timed out".to_string()),
    };
    let (mut write, mut read) = ws.split();

    // Engine.IO open packet comes first
    let opening = tokio::select! {
        _ = ctx.cancel.cancelled() => return SessionEnd::Cancelled,
        result = timeout(HANDSHAKE_TIMEOUT, next_packet(&mut read)) => result,
    };
    let open = match opening {
        Ok(Ok(Some(Packet::Open(open)))) => open,
        Ok(Ok(Some(other))) => {
            return SessionEnd::Failed(format!("expected open packet, got {:?}", other));
        }
        Ok(Ok(None)) => {
            return SessionEnd::Failed("connection closed during handshake".to_string());
        }
        Ok(Err(e)) => return SessionEnd::Failed(e.to_string()),
        Err(_) => return SessionEnd::Failed("handshake timed out".to_string()),
    };
    debug!(sid = %open.sid, ping_interval = open.ping_interval, "engine.io handshake");

    if let Err(e) = write
        .send(Message::Text(Packet::encode_connect().to_string()))
        .await
    {
        return SessionEnd::Failed(e.to_string());
    }

    // Server pings every ping_interval; silence for longer than
    // interval + timeout means the connection is dead
    let heartbeat = if open.ping_interval > 0 {
        Duration::from_millis(open.ping_interval + open.ping_timeout)
    } else {
        HANDSHAKE_TIMEOUT
    };
    let mut connected = false;

    loop {
        let wait = if connected { heartbeat } else { HANDSHAKE_TIMEOUT };
        let next = tokio::select! {
            _ = ctx.cancel.cancelled() => {
                let _ = write.send(Message::Text(Packet::encode_disconnect().to_string())).await;
                let _ = write.close().await;
                return SessionEnd::Cancelled;
            }
            result = timeout(wait, next_packet(&mut read)) => result,
        };

        let packet = match next {
            Ok(Ok(Some(packet))) => packet,
            Ok(Ok(None)) if connected => return SessionEnd::Closed("transport close".to_string()),
            Ok(Ok(None)) => {
                return SessionEnd::Failed("connection closed during handshake".to_string());
            }
            Ok(Err(e)) if connected => {
                ctx.emit(ChannelEvent::Error {
                    message: e.to_string(),
                });
                return SessionEnd::Closed("transport error".to_string());
            }
            Ok(Err(e)) => return SessionEnd::Failed(e.to_string()),
            Err(_) if connected => return SessionEnd::Closed("ping timeout".to_string()),
            Err(_) => return SessionEnd::Failed("handshake timed out".to_string()),
        };

        match packet {
            Packet::Connect => {
                if !connected {
                    connected = true;
                    info!(session = ctx.session, "push channel connected");
                    ctx.emit(ChannelEvent::Connect);
                }
            }
            Packet::ConnectError(message) => {
                if connected {
                    ctx.emit(ChannelEvent::Error { message });
                    return SessionEnd::Closed("connect error".to_string());
                }
                return SessionEnd::Failed(message);
            }
            Packet::Ping => {
                if let Err(e) = write
                    .send(Message::Text(Packet::encode_pong().to_string()))
                    .await
                {
                    if connected {
                        ctx.emit(ChannelEvent::Error {
                            message: e.to_string(),
                        });
                        return SessionEnd::Closed("transport error".to_string());
                    }
                    return SessionEnd::Failed(e.to_string());
                }
            }
            Packet::Event { name, args } => {
                if name != ctx.log_event {
                    debug!(%name, "ignoring event");
                    continue;
                }
                match args.into_iter().next() {
                    Some(entry) => ctx.emit(ChannelEvent::Log(RawLog::from(entry))),
                    None => debug!("log event without payload"),
                }
            }
            Packet::Disconnect => return SessionEnd::ServerDisconnect,
            Packet::Close if connected => return SessionEnd::Closed("transport close".to_string()),
            Packet::Close => {
                return SessionEnd::Failed("connection closed during handshake".to_string());
            }
            Packet::Open(_) | Packet::Pong | Packet::Noop | Packet::Unsupported(_) => {}
        }
    }
}

/// Read the next decodable text frame; `None` when the socket closed
async fn next_packet<S>(read: &mut S) -> std::result::Result<Option<Packet>, tungstenite::Error>
where
    S: Stream<Item = std::result::Result<Message, tungstenite::Error>> + Unpin,
{
    while let Some(message) = read.next().await {
        match message? {
            Message::Text(text) => match Packet::decode(&text) {
                Ok(packet) => return Ok(Some(packet)),
                Err(e) => warn!(error = %e, "ignoring malformed frame"),
            },
            Message::Close(_) => return Ok(None),
            _ => {}
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_socket_url_from_http_endpoint() {
        let url = socket_url("http://localhost:3000").unwrap();
        assert_eq!(
            url.as_str(),
            "ws://localhost:3000/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn test_socket_url_from_https_endpoint() {
        let url = socket_url("https://logs.example.com/base").unwrap();
        assert_eq!(
            url.as_str(),
            "wss://logs.example.com/base/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn test_socket_url_rejects_non_http_scheme() {
        let err = socket_url("foo://logs.example.com").unwrap_err();
        assert!(matches!(err, ClientError::Protocol(_)), "{err}");
    }

    #[test]
    fn test_channel_config_defaults() {
        let config = ChannelConfig::new("http://localhost:3000");
        assert_eq!(config.log_event, "log_received");
        assert_eq!(config.reconnect, ReconnectPolicy::default());
    }

    #[tokio::test]
    async fn test_sessions_are_numbered() {
        let config = ChannelConfig {
            reconnect: ReconnectPolicy::disabled(),
            ..ChannelConfig::new("http://127.0.0.1:9")
        };
        let (mut channel, _rx) = SocketIoChannel::new(config).unwrap();
        assert!(!channel.is_running());

        assert_eq!(channel.connect(), 1);
        assert_eq!(channel.connect(), 2);
        channel.disconnect();
        assert!(!channel.is_running());
    }
}
