use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use logscope_client::{LogBackend, PushChannel};
use logscope_types::{ArcLogRecord, ChannelMessage, ConnectionStatus, FilterCriteria};

use crate::engine::{EngineConfig, EngineEvent, LogEngine, QueryTicket};
use crate::error::{EngineError, Result};

/// Engine plus change notification, shared with the background tasks
struct Shared {
    engine: RwLock<LogEngine>,

    /// Latest engine revision, published after every change
    revision: watch::Sender<u64>,
}

impl Shared {
    fn apply(&self, event: EngineEvent) -> bool {
        let mut engine = self.engine.write();
        let changed = engine.handle(event);
        if changed {
            self.revision.send_replace(engine.revision());
        }
        changed
    }

    fn update<T>(&self, f: impl FnOnce(&mut LogEngine) -> T) -> T {
        let mut engine = self.engine.write();
        let out = f(&mut engine);
        self.revision.send_replace(engine.revision());
        out
    }

    fn abandon(&self, ticket: &QueryTicket) {
        let mut engine = self.engine.write();
        if engine.abandon_query(ticket) {
            self.revision.send_replace(engine.revision());
        }
    }
}

/// Settles a search that never delivers its completion
struct InFlight<'a> {
    shared: &'a Shared,
    ticket: QueryTicket,
    armed: bool,
}

impl InFlight<'_> {
    /// The completion is about to be applied
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.abandon(&self.ticket);
        }
    }
}

/// Runs a [`LogEngine`] against a backend and a push channel
pub struct LogTailer {
    shared: Arc<Shared>,
    backend: Arc<dyn LogBackend>,
    channel: Arc<Mutex<Box<dyn PushChannel>>>,

    /// Cancellation token for the background tasks
    cancel: CancellationToken,

    /// Event loop and initial fetch handles
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl LogTailer {
    /// Connect the channel, then start the event loop and the initial fetch.
    /// Must be called from within a tokio runtime.
    pub fn start(
        config: EngineConfig,
        backend: Arc<dyn LogBackend>,
        channel: Box<dyn PushChannel>,
        events: mpsc::UnboundedReceiver<ChannelMessage>,
    ) -> Self {
        let initial_fetch = config.initial_fetch;
        let (revision, _) = watch::channel(0);
        let shared = Arc::new(Shared {
            engine: RwLock::new(LogEngine::new(config)),
            revision,
        });
        let channel = Arc::new(Mutex::new(channel));

        let tailer = Self {
            shared,
            backend,
            channel,
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        };

        {
            let mut channel = tailer.channel.lock();
            tailer.shared.update(|engine| {
                let session = channel.connect();
                engine.begin_connect(session);
            });
        }

        let mut tasks = tailer.tasks.lock();
        tasks.push(tailer.spawn_event_loop(events));
        if initial_fetch > 0 {
            tasks.push(tailer.spawn_initial_fetch(initial_fetch));
        }
        drop(tasks);

        tailer
    }

    fn spawn_event_loop(&self, mut events: mpsc::UnboundedReceiver<ChannelMessage>) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,

                    message = events.recv() => {
                        match message {
                            Some(message) => {
                                shared.apply(EngineEvent::Channel(message));
                            }
                            None => {
                                // Channel dropped
                                debug!("push channel event stream closed");
                                break;
                            }
                        }
                    }
                }
            }
        })
    }

    fn spawn_initial_fetch(&self, limit: usize) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let backend = Arc::clone(&self.backend);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}

                result = backend.fetch_recent(limit) => {
                    shared.apply(EngineEvent::InitialBatch(result));
                }
            }
        })
    }

    /// Run a historical search and activate filtering with its result.
    ///
    /// Live records keep arriving while the request is in flight. On
    /// failure the previous view is left untouched and the error is both
    /// returned and recorded. Dropping the future abandons the search.
    pub async fn search(&self, criteria: FilterCriteria) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(EngineError::Stopped);
        }

        let (ticket, limit) = self.shared.update(|engine| {
            let limit = engine.config().capacity;
            (engine.begin_query(criteria.clone()), limit)
        });

        let in_flight = InFlight {
            shared: &self.shared,
            ticket: ticket.clone(),
            armed: true,
        };

        let result = tokio::select! {
            _ = self.cancel.cancelled() => return Err(EngineError::Stopped),
            result = self.backend.query(&criteria, limit) => result,
        };

        in_flight.disarm();
        let error = result.as_ref().err().map(EngineError::from);
        self.shared.apply(EngineEvent::QueryCompleted { ticket, result });

        match error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Drop the active filter and show the live tail again
    pub fn clear_filter(&self) {
        self.shared.update(LogEngine::clear_filter);
    }

    /// Tear down the current connection and open a new one
    pub fn reconnect(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        // Channel first, then engine: the new session must be registered
        // before the event loop sees any of its events
        let mut channel = self.channel.lock();
        self.shared.update(|engine| {
            channel.disconnect();
            let session = channel.connect();
            engine.reconnect(session);
        });
    }

    /// The displayed records, most recent first unless filtering
    pub fn view(&self) -> Vec<ArcLogRecord> {
        self.shared.engine.read().view()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.engine.read().status()
    }

    pub fn last_error(&self) -> Option<EngineError> {
        self.shared.engine.read().last_error().cloned()
    }

    pub fn is_filtering(&self) -> bool {
        self.shared.engine.read().is_filtering()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.engine.read().is_loading()
    }

    pub fn criteria(&self) -> FilterCriteria {
        self.shared.engine.read().criteria().clone()
    }

    /// Criteria the next search should build on
    pub fn working_criteria(&self) -> FilterCriteria {
        self.shared.engine.read().working_criteria().clone()
    }

    pub fn revision(&self) -> u64 {
        self.shared.engine.read().revision()
    }

    /// Subscribe to revision changes
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.shared.revision.subscribe()
    }

    /// Check if the tailer has been shut down
    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Stop all background work and disconnect the channel
    pub fn shutdown(&self) {
        if self.cancel.is_cancelled() {
            return;
        }
        info!("shutting down tailer");
        self.cancel.cancel();
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.channel.lock().disconnect();
    }
}

impl Drop for LogTailer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
