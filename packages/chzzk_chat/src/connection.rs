//! ConnectionManager: one chat socket instance and its keepalive worker.
//!
//! Each instance owns a generation number taken from a shared
//! [`GenerationCounter`]. Everything an instance does after it was started
//! (publishing state, emitting batches, asking for a reconnect) is gated on
//! that generation still being current, so a superseded instance can never
//! act again even if one of its timers was already armed.
//!
//! Reconnecting is not done in place: the instance reports
//! [`SessionEvent::ReconnectDue`] and the owner replaces it with a brand-new
//! instance.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ChannelCredentials, PipelineConfig};
use crate::error::TransportError;
use crate::metrics::PipelineMetrics;
use crate::protocol::{self, ChatBatch, Command, OutboundFrame};

type ChatSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Upper bound on the polite close frame during teardown.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    /// Transport open, CONNECT sent.
    Connected,
    /// CONNECTED received, backlog requested.
    AwaitingRecentChat,
    Live,
    Closing,
}

/// Monotonic generation source shared by every instance of one pipeline.
#[derive(Debug, Clone, Default)]
pub struct GenerationCounter(Arc<AtomicU64>);

impl GenerationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Claim the next generation, superseding whatever was current.
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.current() == generation
    }

    /// Retire `generation` if it is still current. Returns whether it was.
    pub fn retire(&self, generation: u64) -> bool {
        self.0
            .compare_exchange(
                generation,
                generation + 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    /// `RECENT_CHAT`: replaces the visible list.
    Backlog,
    /// `CHAT`: appended through the display buffer.
    Live,
}

/// What an instance reports to its owner. Every variant carries the
/// producing instance's generation.
#[derive(Debug)]
pub enum SessionEvent {
    Batch {
        generation: u64,
        kind: BatchKind,
        batch: ChatBatch,
    },
    TransportDown {
        generation: u64,
        error: TransportError,
    },
    /// The reconnect delay elapsed and the instance was still current.
    ReconnectDue { generation: u64 },
}

impl SessionEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Batch { generation, .. }
            | Self::TransportDown { generation, .. }
            | Self::ReconnectDue { generation } => *generation,
        }
    }
}

/// Everything one instance needs to open and run a session.
#[derive(Debug, Clone)]
pub struct SessionParams {
    pub server_url: String,
    pub service_id: String,
    pub credentials: ChannelCredentials,
    /// `recentMessageCount` for the backlog request.
    pub recent_count: usize,
    pub keepalive_interval: Duration,
    pub reconnect_delay: Duration,
    pub liveness_timeout: Option<Duration>,
}

impl SessionParams {
    pub fn new(config: &PipelineConfig, credentials: ChannelCredentials) -> Self {
        Self {
            server_url: config.server_url.clone(),
            service_id: config.service_id.clone(),
            credentials,
            recent_count: config.max_visible,
            keepalive_interval: config.keepalive_interval,
            reconnect_delay: config.reconnect_delay,
            liveness_timeout: config.liveness_timeout,
        }
    }
}

/// State shared by all instances of one pipeline.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub generations: GenerationCounter,
    pub state: Arc<watch::Sender<ConnectionState>>,
    pub metrics: Arc<PipelineMetrics>,
}

impl SessionContext {
    pub fn new(metrics: Arc<PipelineMetrics>) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            generations: GenerationCounter::new(),
            state: Arc::new(state),
            metrics,
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }
}

/// Handle to one running instance. Dropping it stops the instance.
pub struct ConnectionManager {
    generation: u64,
    generations: GenerationCounter,
    state: Arc<watch::Sender<ConnectionState>>,
    cancel: CancellationToken,
    stopped: bool,
    task: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Start a new instance and make it current.
    ///
    /// Never fails here: connect errors surface later as
    /// [`SessionEvent::TransportDown`] followed by [`SessionEvent::ReconnectDue`].
    pub fn start<E>(
        params: SessionParams,
        ctx: &SessionContext,
        events: mpsc::UnboundedSender<E>,
    ) -> Self
    where
        E: From<SessionEvent> + Send + 'static,
    {
        let generation = ctx.generations.advance();
        let cancel = CancellationToken::new();
        ctx.metrics.connection_started();

        let session = Session {
            generation,
            params,
            generations: ctx.generations.clone(),
            state: ctx.state.clone(),
            metrics: ctx.metrics.clone(),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(session.run(events));

        Self {
            generation,
            generations: ctx.generations.clone(),
            state: ctx.state.clone(),
            cancel,
            stopped: false,
            task: Some(task),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        !self.stopped && self.generations.is_current(self.generation)
    }

    /// Tear the instance down. Idempotent; after it returns the instance
    /// emits nothing further.
    pub fn stop(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;
        if self.generations.retire(self.generation) {
            self.state.send_replace(ConnectionState::Closing);
        }
        self.cancel.cancel();
        debug!(generation = self.generation, "connection instance stopped");
    }

    /// Stop and wait for the session task to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.stop();
    }
}

// =============================================================================
// Session task
// =============================================================================

/// Frames the session loop writes on behalf of the keepalive worker.
#[derive(Debug)]
enum Outbound {
    Frame(OutboundFrame),
    /// Liveness window expired; drop the transport.
    CloseStale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeepaliveSignal {
    OutboundSent,
    InboundReceived,
}

struct Session {
    generation: u64,
    params: SessionParams,
    generations: GenerationCounter,
    state: Arc<watch::Sender<ConnectionState>>,
    metrics: Arc<PipelineMetrics>,
    cancel: CancellationToken,
}

impl Session {
    async fn run<E>(self, events: mpsc::UnboundedSender<E>)
    where
        E: From<SessionEvent> + Send + 'static,
    {
        let generation = self.generation;
        self.publish(ConnectionState::Connecting);
        debug!(generation, url = %self.params.server_url, "opening chat socket");

        let connected = tokio::select! {
            _ = self.cancel.cancelled() => return,
            result = connect_async(self.params.server_url.as_str()) => result,
        };

        let error = match connected {
            Ok((socket, _response)) => {
                info!(generation, "chat socket open");
                match self.drive(socket, &events).await {
                    Ok(()) => return,
                    Err(e) => e,
                }
            }
            Err(e) => TransportError::from(e),
        };

        if self.cancel.is_cancelled() || !self.generations.is_current(generation) {
            return;
        }

        warn!(generation, error = %error, "chat transport down, reconnecting");
        self.publish(ConnectionState::Disconnected);
        self.metrics.reconnect_scheduled();
        let _ = events.send(E::from(SessionEvent::TransportDown { generation, error }));

        tokio::select! {
            _ = self.cancel.cancelled() => return,
            _ = tokio::time::sleep(self.params.reconnect_delay) => {}
        }

        if !self.generations.is_current(generation) {
            debug!(generation, "superseded before reconnect");
            return;
        }
        let _ = events.send(E::from(SessionEvent::ReconnectDue { generation }));
    }

    /// Run an open socket until it fails (`Err`) or the instance is stopped (`Ok`).
    async fn drive<E>(
        &self,
        socket: ChatSocket,
        events: &mpsc::UnboundedSender<E>,
    ) -> Result<(), TransportError>
    where
        E: From<SessionEvent>,
    {
        let generation = self.generation;
        let (mut sink, mut stream) = socket.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();

        let keepalive_cancel = self.cancel.child_token();
        tokio::spawn(keepalive_worker(
            generation,
            self.params.keepalive_interval,
            self.params.liveness_timeout,
            out_tx,
            signal_rx,
            keepalive_cancel.clone(),
            self.metrics.clone(),
        ));
        // Ends the worker on every exit path of this function.
        let _keepalive = keepalive_cancel.drop_guard();

        self.publish(ConnectionState::Connected);
        let connect = OutboundFrame::connect(
            &self.params.credentials.chat_channel_id,
            &self.params.service_id,
            &self.params.credentials.access_token,
        );
        write_frame(&mut sink, &connect, &signal_tx).await?;

        loop {
            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    let _ = tokio::time::timeout(CLOSE_GRACE, sink.send(Message::Close(None))).await;
                    return Ok(());
                }

                Some(outbound) = out_rx.recv() => match outbound {
                    Outbound::Frame(frame) => write_frame(&mut sink, &frame, &signal_tx).await?,
                    Outbound::CloseStale => {
                        self.metrics.liveness_timeout();
                        let _ = tokio::time::timeout(CLOSE_GRACE, sink.close()).await;
                        return Err(TransportError::LivenessTimeout(
                            self.params.liveness_timeout.unwrap_or_default(),
                        ));
                    }
                },

                inbound = stream.next() => {
                    let message = match inbound {
                        Some(Ok(message)) => message,
                        Some(Err(e)) => return Err(e.into()),
                        None => return Err(TransportError::StreamEnded),
                    };
                    let _ = signal_tx.send(KeepaliveSignal::InboundReceived);

                    match message {
                        Message::Text(text) => {
                            self.metrics.frame_received();
                            self.handle_text(text.as_str(), &mut sink, &signal_tx, events).await?;
                        }
                        Message::Close(frame) => {
                            debug!(generation, ?frame, "server sent close");
                            return Err(TransportError::ClosedByServer);
                        }
                        // Control frames are answered by tungstenite itself.
                        _ => {}
                    }
                }
            }
        }
    }

    async fn handle_text<S, E>(
        &self,
        text: &str,
        sink: &mut S,
        signals: &mpsc::UnboundedSender<KeepaliveSignal>,
        events: &mpsc::UnboundedSender<E>,
    ) -> Result<(), TransportError>
    where
        S: Sink<Message, Error = tungstenite::Error> + Unpin,
        E: From<SessionEvent>,
    {
        let generation = self.generation;
        let command = match protocol::dispatch(text) {
            Ok(command) => command,
            Err(e) => {
                self.metrics.frame_undecodable();
                warn!(generation, error = %e, "skipping undecodable frame");
                return Ok(());
            }
        };

        match command {
            Command::Ping => {
                debug!(generation, "server ping");
                write_frame(sink, &OutboundFrame::pong(), signals).await?;
            }
            Command::Pong => debug!(generation, "server pong"),
            Command::Connected { sid } => {
                info!(generation, %sid, "chat session established, requesting backlog");
                let request = OutboundFrame::request_recent_chat(
                    &self.params.credentials.chat_channel_id,
                    &self.params.service_id,
                    &sid,
                    self.params.recent_count,
                );
                write_frame(sink, &request, signals).await?;
                self.publish(ConnectionState::AwaitingRecentChat);
            }
            Command::RecentChat(batch) => {
                debug!(generation, records = batch.records.len(), "backlog received");
                self.emit_batch(BatchKind::Backlog, batch, events);
            }
            Command::Chat(batch) => {
                debug!(generation, records = batch.records.len(), "chat received");
                self.emit_batch(BatchKind::Live, batch, events);
            }
            Command::Echo(cmd) => debug!(generation, ?cmd, "ignoring echoed command"),
            Command::Unknown(cmd) => debug!(generation, cmd, "ignoring unknown command"),
        }
        Ok(())
    }

    fn emit_batch<E>(&self, kind: BatchKind, batch: ChatBatch, events: &mpsc::UnboundedSender<E>)
    where
        E: From<SessionEvent>,
    {
        self.metrics.record_drops(&batch.dropped);
        self.publish(ConnectionState::Live);
        let event = SessionEvent::Batch {
            generation: self.generation,
            kind,
            batch,
        };
        if events.send(E::from(event)).is_err() {
            debug!(generation = self.generation, "owner gone, dropping batch");
        }
    }

    fn publish(&self, next: ConnectionState) {
        publish_state(&self.state, &self.generations, self.generation, next);
    }
}

/// Publish `next` for `generation`. The generation check runs under the watch
/// lock, so a superseded instance cannot overwrite its successor's state.
fn publish_state(
    state: &watch::Sender<ConnectionState>,
    generations: &GenerationCounter,
    generation: u64,
    next: ConnectionState,
) -> bool {
    state.send_if_modified(|current| {
        if !generations.is_current(generation) || *current == next {
            return false;
        }
        *current = next;
        true
    })
}

async fn write_frame<S>(
    sink: &mut S,
    frame: &OutboundFrame,
    signals: &mpsc::UnboundedSender<KeepaliveSignal>,
) -> Result<(), TransportError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let text = frame.encode()?;
    sink.send(Message::Text(text.into())).await?;
    let _ = signals.send(KeepaliveSignal::OutboundSent);
    Ok(())
}

// =============================================================================
// Keepalive worker
// =============================================================================

/// Independent timer task: PING after `interval` of outbound silence, and
/// optionally give up on the transport if nothing arrives within
/// `liveness_timeout` of a PING.
async fn keepalive_worker(
    generation: u64,
    interval: Duration,
    liveness_timeout: Option<Duration>,
    out: mpsc::UnboundedSender<Outbound>,
    mut signals: mpsc::UnboundedReceiver<KeepaliveSignal>,
    cancel: CancellationToken,
    metrics: Arc<PipelineMetrics>,
) {
    let ping_timer = tokio::time::sleep(interval);
    tokio::pin!(ping_timer);
    let mut liveness_deadline: Option<Instant> = None;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            signal = signals.recv() => match signal {
                Some(KeepaliveSignal::OutboundSent) => {
                    ping_timer.as_mut().reset(Instant::now() + interval);
                }
                Some(KeepaliveSignal::InboundReceived) => liveness_deadline = None,
                None => break,
            },

            () = &mut ping_timer => {
                debug!(generation, "outbound idle, sending keepalive ping");
                metrics.ping_sent();
                if out.send(Outbound::Frame(OutboundFrame::ping())).is_err() {
                    break;
                }
                ping_timer.as_mut().reset(Instant::now() + interval);
                if let Some(timeout) = liveness_timeout {
                    liveness_deadline.get_or_insert(Instant::now() + timeout);
                }
            }

            () = sleep_until_deadline(liveness_deadline) => {
                warn!(generation, "no inbound traffic after keepalive ping");
                let _ = out.send(Outbound::CloseStale);
                break;
            }
        }
    }
    debug!(generation, "keepalive worker stopped");
}

fn sleep_until_deadline(deadline: Option<Instant>) -> impl Future<Output = ()> {
    async move {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio::sync::mpsc::error::TryRecvError;

    /// A localhost URL nothing is listening on.
    async fn refused_url() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        format!("ws://127.0.0.1:{port}/chat")
    }

    async fn params() -> SessionParams {
        let config = PipelineConfig {
            server_url: refused_url().await,
            ..PipelineConfig::default()
        };
        SessionParams::new(
            &config,
            ChannelCredentials {
                chat_channel_id: "chan".into(),
                access_token: "token".into(),
            },
        )
    }

    fn context() -> SessionContext {
        SessionContext::new(Arc::new(PipelineMetrics::new()))
    }

    #[test]
    fn generation_counter() {
        let counter = GenerationCounter::new();
        let first = counter.advance();
        assert!(counter.is_current(first));

        let second = counter.advance();
        assert!(!counter.is_current(first));
        assert!(!counter.retire(first));
        assert!(counter.retire(second));
        assert!(!counter.is_current(second));
        assert!(!counter.retire(second));
        assert!(counter.advance() > second);
    }

    #[test]
    fn superseded_generation_cannot_overwrite_state() {
        let ctx = context();
        let old = ctx.generations.advance();
        assert!(publish_state(&ctx.state, &ctx.generations, old, ConnectionState::Live));

        let new = ctx.generations.advance();
        assert!(publish_state(&ctx.state, &ctx.generations, new, ConnectionState::Connecting));
        assert!(!publish_state(&ctx.state, &ctx.generations, old, ConnectionState::Disconnected));
        assert_eq!(*ctx.subscribe_state().borrow(), ConnectionState::Connecting);

        // Unchanged value is not a modification.
        assert!(!publish_state(&ctx.state, &ctx.generations, new, ConnectionState::Connecting));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connect_schedules_reconnect_after_delay() {
        let ctx = context();
        let (tx, mut rx) = mpsc::unbounded_channel::<SessionEvent>();
        let started = Instant::now();
        let manager = ConnectionManager::start(params().await, &ctx, tx);
        let generation = manager.generation();

        match rx.recv().await {
            Some(SessionEvent::TransportDown { generation: g, .. }) => assert_eq!(g, generation),
            other => panic!("expected transport down, got {other:?}"),
        }
        assert_eq!(*ctx.subscribe_state().borrow(), ConnectionState::Disconnected);

        match rx.recv().await {
            Some(SessionEvent::ReconnectDue { generation: g }) => assert_eq!(g, generation),
            other => panic!("expected reconnect due, got {other:?}"),
        }
        assert!(started.elapsed() >= Duration::from_millis(1000));

        let snapshot = ctx.metrics.snapshot();
        assert_eq!(snapshot.connection.started, 1);
        assert_eq!(snapshot.connection.reconnects_scheduled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_instance_never_reconnects() {
        let ctx = context();
        let (tx, mut rx) = mpsc::unbounded_channel::<SessionEvent>();
        let mut manager = ConnectionManager::start(params().await, &ctx, tx);

        assert!(matches!(
            rx.recv().await,
            Some(SessionEvent::TransportDown { .. })
        ));
        // The reconnect timer is now armed.
        manager.stop();
        manager.stop();
        assert_eq!(*ctx.subscribe_state().borrow(), ConnectionState::Closing);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.recv().await.is_none(), "stopped instance emitted an event");
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_instance_never_reconnects() {
        let ctx = context();
        let (tx, mut rx) = mpsc::unbounded_channel::<SessionEvent>();
        let manager = ConnectionManager::start(params().await, &ctx, tx);

        assert!(matches!(
            rx.recv().await,
            Some(SessionEvent::TransportDown { .. })
        ));
        // Another instance takes over without this one being stopped.
        ctx.generations.advance();
        assert!(!manager.is_current());

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stopped_instance_does_not_touch_state() {
        let ctx = context();
        let (tx, mut rx) = mpsc::unbounded_channel::<SessionEvent>();
        let old = ConnectionManager::start(params().await, &ctx, tx.clone());
        drop(old);
        assert_eq!(*ctx.subscribe_state().borrow(), ConnectionState::Closing);

        let mut current = ConnectionManager::start(params().await, &ctx, tx);
        let generation = current.generation();
        match rx.recv().await {
            Some(SessionEvent::TransportDown { generation: g, .. }) => assert_eq!(g, generation),
            other => panic!("unexpected {other:?}"),
        }
        current.stop();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Disconnected)));
    }

    #[tokio::test(start_paused = true)]
    async fn keepalive_pings_after_outbound_silence() {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let metrics = Arc::new(PipelineMetrics::new());
        let interval = Duration::from_secs(20);
        tokio::spawn(keepalive_worker(
            1,
            interval,
            None,
            out_tx,
            signal_rx,
            cancel.clone(),
            metrics.clone(),
        ));

        // Outbound traffic at 15s pushes the first ping out to 35s.
        tokio::time::sleep(Duration::from_secs(15)).await;
        signal_tx.send(KeepaliveSignal::OutboundSent).unwrap();
        tokio::time::sleep(Duration::from_secs(19)).await;
        assert!(out_rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        match out_rx.try_recv() {
            Ok(Outbound::Frame(frame)) => assert_eq!(frame, OutboundFrame::ping()),
            other => panic!("expected ping, got {other:?}"),
        }
        assert_eq!(metrics.snapshot().connection.pings_sent, 1);

        cancel.cancel();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(out_rx.recv().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_after_ping_is_closed() {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (_signal_tx, signal_rx) = mpsc::unbounded_channel();
        tokio::spawn(keepalive_worker(
            1,
            Duration::from_secs(20),
            Some(Duration::from_secs(10)),
            out_tx,
            signal_rx,
            CancellationToken::new(),
            Arc::new(PipelineMetrics::new()),
        ));

        assert!(matches!(out_rx.recv().await, Some(Outbound::Frame(_))));
        let pinged_at = Instant::now();
        assert!(matches!(out_rx.recv().await, Some(Outbound::CloseStale)));
        assert_eq!(pinged_at.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn inbound_traffic_clears_liveness_deadline() {
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        tokio::spawn(keepalive_worker(
            1,
            Duration::from_secs(20),
            Some(Duration::from_secs(10)),
            out_tx,
            signal_rx,
            CancellationToken::new(),
            Arc::new(PipelineMetrics::new()),
        ));

        assert!(matches!(out_rx.recv().await, Some(Outbound::Frame(_))));
        tokio::time::sleep(Duration::from_secs(5)).await;
        signal_tx.send(KeepaliveSignal::InboundReceived).unwrap();

        // Next event is the following ping, not a stale close.
        assert!(matches!(out_rx.recv().await, Some(Outbound::Frame(_))));
    }
}
