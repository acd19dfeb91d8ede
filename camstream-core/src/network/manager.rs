//! Connection manager: owns the single outbound TCP connection.
//!
//! Public operations (`connect`, `disconnect`, `request_capture`,
//! `set_streaming`) return immediately and may be called from any thread.
//! Network work runs on the Tokio runtime the manager was built with:
//!
//! - one task per connect attempt,
//! - one writer task per open connection, fed by the [`Outbox`],
//! - one teardown per connection, which emits exactly one terminal event.
//!
//! Every attempt gets a generation number. A failure reported by an
//! earlier generation is ignored, so a late error from a dead connection
//! can never tear down its successor.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use crate::config::{EncodingConfig, LinkConfig};
use crate::error::StreamError;
use crate::event::{self, LinkEvent, LinkEventReceiver, LinkEventSender};
use crate::flags::ModeFlags;
use crate::message::Message;
use crate::network::outbox::Outbox;
use crate::network::sender::WireSender;
use crate::pipeline::coordinator::ModeCoordinator;
use crate::pipeline::encoder::FrameEncoder;
use crate::pipeline::slot::FrameSlot;
use crate::state::ConnectionPhase;

/// Outcome of [`ConnectionManager::request_capture`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureRequest {
    /// The latch was armed; the next frame becomes a still.
    Accepted,
    /// A capture is already waiting for a frame.
    AlreadyPending,
    /// No connection is open.
    NotConnected,
}

#[derive(Debug)]
enum TeardownCause {
    Requested,
    Lost(String),
}

/// State guarded by the manager lock. Never held across an `.await`.
#[derive(Debug, Default)]
struct ManagerState {
    phase: ConnectionPhase,
    attempt: u64,
    connector: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<ManagerState>,
    flags: Arc<ModeFlags>,
    slot: Arc<FrameSlot>,
    outbox: Outbox,
    events: LinkEventSender,
    config: LinkConfig,
    runtime: Handle,
}

/// Cloneable handle to the connection manager.
#[derive(Debug, Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

impl ConnectionManager {
    /// Build a manager on the current Tokio runtime.
    pub fn new(config: LinkConfig) -> Result<Self, StreamError> {
        let runtime = Handle::try_current().map_err(|e| StreamError::Runtime(e.to_string()))?;
        Ok(Self::with_runtime(config, runtime))
    }

    /// Build a manager that spawns its tasks on `runtime`.
    pub fn with_runtime(config: LinkConfig, runtime: Handle) -> Self {
        let (events, _) = event::channel();
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(ManagerState::default()),
                flags: Arc::new(ModeFlags::new()),
                slot: Arc::new(FrameSlot::new()),
                outbox: Outbox::new(),
                events,
                config,
                runtime,
            }),
        }
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn phase(&self) -> ConnectionPhase {
        self.shared.lock().phase.clone()
    }

    pub fn flags(&self) -> Arc<ModeFlags> {
        Arc::clone(&self.shared.flags)
    }

    pub fn slot(&self) -> Arc<FrameSlot> {
        Arc::clone(&self.shared.slot)
    }

    pub fn outbox(&self) -> Outbox {
        self.shared.outbox.clone()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.shared.config
    }

    pub fn subscribe(&self) -> LinkEventReceiver {
        self.shared.events.subscribe()
    }

    pub fn event_sender(&self) -> LinkEventSender {
        self.shared.events.clone()
    }

    /// A coordinator wired to this manager's slot, flags, outbox and events.
    pub fn coordinator<E: FrameEncoder>(
        &self,
        encoder: E,
        encoding: EncodingConfig,
    ) -> ModeCoordinator<E> {
        ModeCoordinator::new(
            self.slot(),
            self.flags(),
            self.outbox(),
            self.event_sender(),
            encoder,
            encoding,
        )
    }

    // ── Operations ───────────────────────────────────────────────

    /// Start connecting to `host:port`.
    ///
    /// Returns once the attempt is scheduled. The result arrives as
    /// [`LinkEvent::Connected`] or [`LinkEvent::ConnectFailed`]. Rejected
    /// unless the manager is idle.
    pub fn connect(&self, host: &str, port: u16) -> Result<(), StreamError> {
        let attempt = {
            let mut st = self.shared.lock();
            st.phase.begin_connect()?;
            st.attempt += 1;
            st.attempt
        };

        let endpoint = format!("{host}:{port}");
        info!("connecting to {endpoint}");
        self.shared.emit(LinkEvent::Connecting { endpoint });

        let shared = Arc::clone(&self.shared);
        let host = host.to_string();
        let task = self
            .shared
            .runtime
            .spawn(async move { shared.establish(attempt, host, port).await });

        let mut st = self.shared.lock();
        if st.attempt == attempt && st.phase.is_connecting() {
            st.connector = Some(task);
        }
        Ok(())
    }

    /// Close the connection, or cancel an attempt in progress.
    ///
    /// The phase leaves `Connected` before this returns; draining the
    /// writer and closing the stream finish in the background and end with
    /// [`LinkEvent::Disconnected`]. A no-op when already idle.
    pub fn disconnect(&self) {
        if let Some(pending) = self.shared.begin_teardown(None, TeardownCause::Requested) {
            let shared = Arc::clone(&self.shared);
            self.shared
                .runtime
                .spawn(async move { shared.finish_teardown(pending).await });
        }
    }

    /// Like [`disconnect`](Self::disconnect), but waits for the teardown
    /// to complete.
    pub async fn close(&self) {
        if let Some(pending) = self.shared.begin_teardown(None, TeardownCause::Requested) {
            self.shared.finish_teardown(pending).await;
        }
    }

    /// Ask for the next frame to be sent as a still.
    pub fn request_capture(&self) -> CaptureRequest {
        let st = self.shared.lock();
        if !st.phase.is_connected() {
            return CaptureRequest::NotConnected;
        }
        if self.shared.flags.arm_capture() {
            info!("capture requested");
            CaptureRequest::Accepted
        } else {
            CaptureRequest::AlreadyPending
        }
    }

    /// Toggle video streaming. Returns `false` (and changes nothing) when
    /// not connected.
    pub fn set_streaming(&self, enabled: bool) -> bool {
        let st = self.shared.lock();
        if !st.phase.is_connected() {
            return false;
        }
        self.shared.flags.set_streaming(enabled);
        info!(enabled, "streaming toggled");
        true
    }
}

/// Work left after the synchronous half of a teardown.
#[derive(Debug)]
struct PendingTeardown {
    writer: Option<JoinHandle<()>>,
    cause: TeardownCause,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, event: LinkEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn reset_flags(&self) {
        self.flags.set_streaming(false);
        self.flags.set_connected(false);
        self.flags.clear_capture();
    }

    async fn establish(self: Arc<Self>, attempt: u64, host: String, port: u16) {
        let deadline = self.config.connect_timeout();
        let result = match timeout(deadline, TcpStream::connect((host.as_str(), port))).await {
            Ok(Ok(stream)) => Self::prepare(stream),
            Ok(Err(e)) => Err(StreamError::Io(e)),
            Err(_) => Err(StreamError::Timeout(deadline)),
        };

        match result {
            Ok((stream, peer)) => self.promote(attempt, stream, peer),
            Err(e) => self.connect_failed(attempt, e),
        }
    }

    fn prepare(stream: TcpStream) -> Result<(TcpStream, SocketAddr), StreamError> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        Ok((stream, peer))
    }

    fn connect_failed(&self, attempt: u64, error: StreamError) {
        {
            let mut st = self.lock();
            if st.attempt != attempt || st.phase.fail_connect().is_err() {
                debug!(attempt, "stale connect failure ignored");
                return;
            }
            st.connector = None;
            self.reset_flags();
        }
        warn!("connect failed: {error}");
        self.emit(LinkEvent::ConnectFailed {
            reason: error.to_string(),
        });
    }

    fn promote(self: &Arc<Self>, attempt: u64, stream: TcpStream, peer: SocketAddr) {
        let mut st = self.lock();
        if st.attempt != attempt || st.phase.complete_connect(peer).is_err() {
            debug!(attempt, "connect attempt superseded; dropping stream");
            return;
        }
        st.connector = None;

        let (tx, rx) = mpsc::channel(self.config.outbox_capacity.max(1));
        self.outbox.install(tx);
        st.writer = Some(self.runtime.spawn(Arc::clone(self).write_loop(
            attempt,
            WireSender::new(stream),
            rx,
        )));

        // Announce before enabling the flags so `Connected` precedes any
        // `MessageSent` or failure for this connection.
        info!("connected to {peer}");
        self.emit(LinkEvent::Connected { peer });
        self.flags.clear_capture();
        self.flags.set_connected(true);
        self.flags.set_streaming(true);
    }

    /// Single writer for one connection. Messages go out in queue order.
    async fn write_loop(
        self: Arc<Self>,
        attempt: u64,
        mut sender: WireSender<TcpStream>,
        mut rx: mpsc::Receiver<Message>,
    ) {
        let write_timeout = self.config.write_timeout();

        while let Some(message) = rx.recv().await {
            let kind = message.kind;
            let bytes = message.wire_len();
            let result = match timeout(write_timeout, sender.send_message(message)).await {
                Ok(result) => result,
                Err(_) => Err(StreamError::Timeout(write_timeout)),
            };

            match result {
                Ok(()) => {
                    trace!(%kind, bytes, "message sent");
                    self.emit(LinkEvent::MessageSent { kind, bytes });
                }
                Err(e) => {
                    warn!("failed to send {kind}: {e}");
                    let reason = e.to_string();
                    self.emit(LinkEvent::MessageFailed {
                        kind,
                        reason: reason.clone(),
                    });
                    // The teardown awaits this task, so it must run elsewhere.
                    let shared = Arc::clone(&self);
                    self.runtime.spawn(async move {
                        if let Some(pending) =
                            shared.begin_teardown(Some(attempt), TeardownCause::Lost(reason))
                        {
                            shared.finish_teardown(pending).await;
                        }
                    });
                    return;
                }
            }
        }

        // Outbox closed: everything queued has been written.
        match timeout(self.config.close_timeout(), sender.close()).await {
            Ok(Ok(())) => debug!("stream closed"),
            Ok(Err(e)) => debug!("error closing stream: {e}"),
            Err(_) => debug!("stream close timed out"),
        }
    }

    /// Synchronous half of a teardown: runs under the lock, so no frame
    /// can be claimed for this connection once it returns.
    fn begin_teardown(
        &self,
        attempt: Option<u64>,
        cause: TeardownCause,
    ) -> Option<PendingTeardown> {
        let mut st = self.lock();
        if attempt.is_some_and(|a| a != st.attempt) {
            debug!(?attempt, current = st.attempt, "stale teardown ignored");
            return None;
        }

        if st.phase.is_connecting() {
            // Cancel the attempt; a late success drops its stream.
            let _ = st.phase.fail_connect();
            if let Some(task) = st.connector.take() {
                task.abort();
            }
            self.reset_flags();
            drop(st);
            info!("connect attempt cancelled");
            self.emit(LinkEvent::Disconnected);
            return None;
        }

        if st.phase.begin_disconnect().is_err() {
            debug!(phase = %st.phase, "nothing to tear down");
            return None;
        }
        self.reset_flags();
        self.outbox.close();
        Some(PendingTeardown {
            writer: st.writer.take(),
            cause,
        })
    }

    /// Asynchronous half: let the writer drain and close, then go idle.
    async fn finish_teardown(&self, pending: PendingTeardown) {
        if let Some(mut writer) = pending.writer {
            match timeout(self.config.close_timeout(), &mut writer).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) if e.is_cancelled() => {}
                Ok(Err(e)) => warn!("writer task failed: {e}"),
                Err(_) => {
                    warn!("writer did not finish in time; aborting");
                    writer.abort();
                }
            }
        }

        if self.slot.clear() {
            debug!("released frame held at teardown");
        }
        let _ = self.lock().phase.finish_disconnect();

        match pending.cause {
            TeardownCause::Requested => {
                info!("disconnected");
                self.emit(LinkEvent::Disconnected);
            }
            TeardownCause::Lost(reason) => {
                warn!("connection lost: {reason}");
                self.emit(LinkEvent::ConnectionLost { reason });
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
