//! The single owner task.
//!
//! Session events from the current connection instance, host commands and the
//! display tick are all serialized onto this one task; it is the only place
//! the display buffer is mutated.

use std::ops::ControlFlow;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::chat::Chat;
use crate::config::{ChannelCredentials, PipelineConfig};
use crate::connection::{
    BatchKind, ConnectionManager, ConnectionState, SessionContext, SessionEvent, SessionParams,
};
use crate::display::DisplayBuffer;
use crate::metrics::PipelineMetrics;
use crate::normalize::normalize;
use crate::protocol::ChatBatch;

/// Everything the owner task reacts to, besides its own tick.
#[derive(Debug)]
pub enum PipelineEvent {
    Session(SessionEvent),
    /// Full clean restart, optionally with fresh credentials.
    Restart(Option<ChannelCredentials>),
    /// Host page visibility; ticks are skipped while hidden.
    SetPageVisible(bool),
    Shutdown,
}

impl From<SessionEvent> for PipelineEvent {
    fn from(event: SessionEvent) -> Self {
        Self::Session(event)
    }
}

pub struct ChatPipeline {
    config: PipelineConfig,
    credentials: ChannelCredentials,
    ctx: SessionContext,
    buffer: DisplayBuffer,
    page_visible: bool,
    connection: Option<ConnectionManager>,
    events_tx: mpsc::UnboundedSender<PipelineEvent>,
    visible_tx: watch::Sender<Arc<Vec<Chat>>>,
}

impl ChatPipeline {
    /// Start the pipeline on the current tokio runtime.
    pub fn spawn(config: PipelineConfig, credentials: ChannelCredentials) -> PipelineHandle {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(PipelineMetrics::new());
        let owner = Self::new(config, credentials, metrics.clone(), events_tx.clone());

        let visible = owner.visible_tx.subscribe();
        let state = owner.ctx.subscribe_state();
        let task = tokio::spawn(owner.run(events_rx));

        PipelineHandle {
            events: events_tx,
            visible,
            state,
            metrics,
            task: Some(task),
        }
    }

    fn new(
        config: PipelineConfig,
        credentials: ChannelCredentials,
        metrics: Arc<PipelineMetrics>,
        events_tx: mpsc::UnboundedSender<PipelineEvent>,
    ) -> Self {
        let (visible_tx, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            buffer: DisplayBuffer::new(config.max_visible, config.catch_up_after),
            config,
            credentials,
            ctx: SessionContext::new(metrics),
            page_visible: true,
            connection: None,
            events_tx,
            visible_tx,
        }
    }

    async fn run(mut self, mut events: mpsc::UnboundedReceiver<PipelineEvent>) {
        info!(
            channel = %self.credentials.chat_channel_id,
            max_visible = self.config.max_visible,
            "chat pipeline started"
        );
        self.connect();

        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else { break };
                    if self.handle(event).is_break() {
                        break;
                    }
                }
                _ = ticker.tick() => self.on_tick(),
            }
        }

        if let Some(connection) = self.connection.take() {
            connection.shutdown().await;
        }
        info!("chat pipeline stopped");
    }

    fn handle(&mut self, event: PipelineEvent) -> ControlFlow<()> {
        match event {
            PipelineEvent::Session(event) => self.on_session(event),
            PipelineEvent::Restart(credentials) => self.restart(credentials),
            PipelineEvent::SetPageVisible(visible) => {
                debug!(visible, "page visibility changed");
                self.page_visible = visible;
            }
            PipelineEvent::Shutdown => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn on_session(&mut self, event: SessionEvent) {
        let generation = event.generation();
        let current = self
            .connection
            .as_ref()
            .filter(|c| c.is_current())
            .map(ConnectionManager::generation);
        if current != Some(generation) {
            debug!(generation, ?current, "dropping event from superseded connection");
            return;
        }

        match event {
            SessionEvent::Batch {
                kind: BatchKind::Backlog,
                batch,
                ..
            } => {
                let chats = self.normalize_batch(batch);
                info!(generation, count = chats.len(), "backlog replaces visible list");
                self.buffer.replace_with_backlog(chats);
                self.publish_visible();
            }
            SessionEvent::Batch {
                kind: BatchKind::Live,
                batch,
                ..
            } => {
                let chats = self.normalize_batch(batch);
                self.buffer.enqueue(chats);
            }
            SessionEvent::TransportDown { error, .. } => {
                debug!(generation, error = %error, "waiting for reconnect");
            }
            SessionEvent::ReconnectDue { .. } => self.connect(),
        }
    }

    fn normalize_batch(&self, batch: ChatBatch) -> Vec<Chat> {
        let channel_id = &self.credentials.chat_channel_id;
        let chats: Vec<Chat> = batch
            .records
            .iter()
            .filter_map(|record| match normalize(record, channel_id) {
                Ok(chat) => Some(chat),
                Err(e) => {
                    self.ctx.metrics.record_failed();
                    warn!(error = %e, code = e.error_code(), "skipping chat record");
                    None
                }
            })
            .collect();
        self.ctx.metrics.accept_records(chats.len());
        chats
    }

    fn on_tick(&mut self) {
        if !self.page_visible {
            return;
        }
        if self.buffer.tick(Instant::now()).changed() {
            self.publish_visible();
        }
    }

    fn restart(&mut self, credentials: Option<ChannelCredentials>) {
        if let Some(credentials) = credentials {
            self.credentials = credentials;
        }
        info!(channel = %self.credentials.chat_channel_id, "restarting chat pipeline");
        self.buffer.clear();
        self.publish_visible();
        self.connect();
    }

    /// Stop the current instance (if any) and start a fresh one.
    fn connect(&mut self) {
        if let Some(mut previous) = self.connection.take() {
            previous.stop();
        }
        let params = SessionParams::new(&self.config, self.credentials.clone());
        let connection = ConnectionManager::start(params, &self.ctx, self.events_tx.clone());
        info!(generation = connection.generation(), "starting chat connection");
        self.connection = Some(connection);
    }

    fn publish_visible(&self) {
        self.visible_tx.send_replace(Arc::new(self.buffer.snapshot()));
    }
}

/// Caller-side handle. Dropping it shuts the pipeline down without waiting.
pub struct PipelineHandle {
    events: mpsc::UnboundedSender<PipelineEvent>,
    visible: watch::Receiver<Arc<Vec<Chat>>>,
    state: watch::Receiver<ConnectionState>,
    metrics: Arc<PipelineMetrics>,
    task: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    /// The visible list, republished after every change.
    pub fn visible(&self) -> watch::Receiver<Arc<Vec<Chat>>> {
        self.visible.clone()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn set_page_visible(&self, visible: bool) {
        let _ = self.events.send(PipelineEvent::SetPageVisible(visible));
    }

    pub fn restart(&self, credentials: Option<ChannelCredentials>) {
        let _ = self.events.send(PipelineEvent::Restart(credentials));
    }

    pub fn metrics(&self) -> Arc<PipelineMetrics> {
        self.metrics.clone()
    }

    /// Stop the current connection and wait for the owner task to exit.
    pub async fn shutdown(mut self) {
        let _ = self.events.send(PipelineEvent::Shutdown);
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        if self.task.is_some() {
            let _ = self.events.send(PipelineEvent::Shutdown);
        }
    }
}
