//! Sender service: wires the frame source, coordinator and connection
//! manager together and serves stdin commands until stopped.

use std::io::BufRead;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use camstream_core::pipeline::PipelineStats;
use camstream_core::{
    CaptureRequest, ConnectionManager, FrameSource, JpegFrameEncoder, LinkEvent,
    LinkEventReceiver, TestPatternSource,
};

use crate::command::{Command, HELP};
use crate::config::{NetworkConfig, SenderConfig};

// ── Session ──────────────────────────────────────────────────────

/// Whether the command loop keeps running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// The control surface: turns commands into manager calls.
pub struct Session {
    manager: ConnectionManager,
    stats: Arc<PipelineStats>,
    network: NetworkConfig,
}

impl Session {
    pub fn new(manager: ConnectionManager, stats: Arc<PipelineStats>, network: NetworkConfig) -> Self {
        Self {
            manager,
            stats,
            network,
        }
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    /// Execute one command, printing a short reply.
    pub fn handle(&self, command: Command) -> Flow {
        match command {
            Command::Connect { host, port } => {
                let host = host.unwrap_or_else(|| self.network.host.clone());
                let port = port.unwrap_or(self.network.port);
                if let Err(e) = self.manager.connect(&host, port) {
                    println!("cannot connect: {e}");
                }
            }
            Command::Disconnect => {
                if self.manager.phase().is_idle() {
                    println!("not connected");
                } else {
                    self.manager.disconnect();
                }
            }
            Command::Capture => match self.manager.request_capture() {
                CaptureRequest::Accepted => println!("capture requested"),
                CaptureRequest::AlreadyPending => println!("capture already pending"),
                CaptureRequest::NotConnected => println!("not connected"),
            },
            Command::Stream(enabled) => {
                if self.manager.set_streaming(enabled) {
                    println!("streaming {}", if enabled { "on" } else { "off" });
                } else {
                    println!("not connected");
                }
            }
            Command::Status => println!("{}", self.status()),
            Command::Help => println!("{HELP}"),
            Command::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    /// Human-readable state summary.
    pub fn status(&self) -> String {
        let flags = self.manager.flags().snapshot();
        let s = self.stats.snapshot();
        format!(
            "phase: {}\nstreaming: {}, capture pending: {}\n\
             frames: {} received, {} streamed, {} captured, {} discarded\n\
             errors: {} encode failures, {} dropped, {} overwritten",
            self.manager.phase(),
            flags.streaming,
            flags.capture_pending,
            s.received,
            s.streamed,
            s.captured,
            s.discarded,
            s.encode_failures,
            s.dispatch_drops,
            self.manager.slot().overwritten(),
        )
    }
}

// ── SenderService ────────────────────────────────────────────────

/// The top-level sender process.
pub struct SenderService {
    config: SenderConfig,
    running: Arc<AtomicBool>,
}

impl SenderService {
    pub fn new(config: SenderConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Obtain a handle that can be used to stop the service from
    /// another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run until `quit` or [`stop`](Self::stop).
    ///
    /// 1. Builds the connection manager and a JPEG coordinator.
    /// 2. Starts the frame source with the coordinator as its callback.
    /// 3. Serves stdin commands and logs link events and statistics.
    /// 4. Stops the source, then closes the connection.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        self.running.store(true, Ordering::SeqCst);

        let manager = ConnectionManager::new(self.config.to_link_config())?;
        let event_log = tokio::spawn(log_events(manager.subscribe()));

        let coordinator = manager.coordinator(JpegFrameEncoder::new(), self.config.encoding);
        let session = Session::new(
            manager.clone(),
            coordinator.stats(),
            self.config.network.clone(),
        );

        let mut source = TestPatternSource::new(self.config.camera.clone());
        source.start(coordinator.into_callback())?;

        if self.config.network.connect_on_start {
            session.handle(Command::Connect {
                host: None,
                port: None,
            });
        }
        println!("{HELP}");

        let mut lines = spawn_stdin_reader();
        let mut stdin_open = true;
        let stats_every = self.config.network.stats_interval_secs;
        let mut ticker = tokio::time::interval(Duration::from_secs(stats_every.max(1)));
        ticker.tick().await;
        let mut last = session.stats().snapshot();

        while self.running.load(Ordering::SeqCst) {
            tokio::select! {
                line = lines.recv(), if stdin_open => match line {
                    Some(line) if line.trim().is_empty() => {}
                    Some(line) => match line.parse::<Command>() {
                        Ok(command) => {
                            if session.handle(command) == Flow::Quit {
                                break;
                            }
                        }
                        Err(e) => println!("{e}"),
                    },
                    None => {
                        info!("stdin closed; waiting for Ctrl-C");
                        stdin_open = false;
                    }
                },
                _ = ticker.tick(), if stats_every > 0 => {
                    let now = session.stats().snapshot();
                    let d = now.since(&last);
                    last = now;
                    info!(
                        received = d.received,
                        streamed = d.streamed,
                        captured = d.captured,
                        discarded = d.discarded,
                        dropped = d.dispatch_drops,
                        "pipeline stats"
                    );
                }
                _ = Self::wait_for_stop(&self.running) => break,
            }
        }

        info!("shutting down");
        // No frame may reach the coordinator once the link is closing.
        if tokio::task::spawn_blocking(move || source.stop()).await.is_err() {
            warn!("frame source did not stop cleanly");
        }
        manager.close().await;
        event_log.abort();

        self.running.store(false, Ordering::SeqCst);
        info!("camstream-sender stopped");
        Ok(())
    }

    /// Async helper: resolves when `running` becomes false.
    async fn wait_for_stop(running: &Arc<AtomicBool>) {
        loop {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}

/// Read stdin on a plain thread so a pending read never holds up runtime
/// shutdown.
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(16);
    let spawned = std::thread::Builder::new()
        .name("camstream-stdin".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.blocking_send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!("cannot read commands from stdin: {e}");
    }
    rx
}

/// Mirror link events into the log until the channel closes.
async fn log_events(mut events: LinkEventReceiver) {
    use tokio::sync::broadcast::error::RecvError;
    loop {
        match events.recv().await {
            Ok(event @ LinkEvent::MessageSent { .. }) => debug!("{event}"),
            Ok(
                event @ (LinkEvent::ConnectFailed { .. }
                | LinkEvent::ConnectionLost { .. }
                | LinkEvent::MessageFailed { .. }
                | LinkEvent::CaptureFailed { .. }),
            ) => warn!("{event}"),
            Ok(event) => info!("{event}"),
            Err(RecvError::Lagged(n)) => debug!("event log skipped {n} events"),
            Err(RecvError::Closed) => break,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
