//! Accept loop and per-session message handling.
//!
//! One sender at a time: a session runs until the sender closes the
//! stream, sends something the codec rejects, or the server is stopped.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::FramedRead;
use tracing::{debug, info, warn};

use camstream_core::{Message, MessageCodec, MessageKind, StreamError};

use crate::config::ReceiverConfig;
use crate::sink::FrameSink;

// ── SessionStats ─────────────────────────────────────────────────

/// Counters for one sender session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SessionStats {
    pub video_frames: u64,
    pub stills: u64,
    /// Payload bytes received.
    pub bytes: u64,
}

impl SessionStats {
    fn record(&mut self, message: &Message) {
        match message.kind {
            MessageKind::VideoFrame => self.video_frames += 1,
            MessageKind::CapturedImage => self.stills += 1,
        }
        self.bytes += message.payload.len() as u64;
    }

    pub fn messages(&self) -> u64 {
        self.video_frames + self.stills
    }
}

// ── ReceiverServer ───────────────────────────────────────────────

pub struct ReceiverServer {
    config: ReceiverConfig,
    running: Arc<AtomicBool>,
}

impl ReceiverServer {
    pub fn new(config: ReceiverConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// A cloneable handle that stops the server from another task.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bind the configured address and serve until stopped.
    pub async fn run(&self) -> Result<(), StreamError> {
        let listener = TcpListener::bind(self.config.listen_addr()).await?;
        self.serve(listener).await
    }

    /// Serve senders on an already-bound listener until stopped.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), StreamError> {
        self.running.store(true, Ordering::SeqCst);
        let mut sink =
            FrameSink::open(&self.config.output.dir, self.config.output.save_latest).await?;
        info!(
            "listening on {}, writing to {}",
            listener.local_addr()?,
            sink.dir().display()
        );

        while self.running.load(Ordering::SeqCst) {
            let accept = tokio::select! {
                result = listener.accept() => result,
                _ = Self::wait_for_stop(&self.running) => break,
            };

            let (stream, peer) = match accept {
                Ok(pair) => pair,
                Err(e) => {
                    warn!("accept error: {e}");
                    continue;
                }
            };

            info!("sender connected from {peer}");
            let started = Instant::now();
            match self.session(stream, peer, &mut sink).await {
                Ok(stats) => info!(
                    "session with {peer} ended: {} video frames, {} stills, {} bytes in {:.1}s",
                    stats.video_frames,
                    stats.stills,
                    stats.bytes,
                    started.elapsed().as_secs_f64()
                ),
                Err(e) => warn!("session with {peer} aborted: {e}"),
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("receiver stopped");
        Ok(())
    }

    /// Read messages from one sender until its stream ends.
    pub async fn session(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
        sink: &mut FrameSink,
    ) -> Result<SessionStats, StreamError> {
        let codec = MessageCodec::with_max_payload(self.config.network.max_payload);
        let mut framed = FramedRead::new(stream, codec);
        let mut stats = SessionStats::default();

        let report_every = self.config.output.stats_interval_secs;
        let mut ticker = tokio::time::interval(Duration::from_secs(report_every.max(1)));
        ticker.tick().await;
        let mut last_report = (Instant::now(), stats);

        loop {
            tokio::select! {
                next = framed.next() => match next {
                    Some(Ok(message)) => {
                        stats.record(&message);
                        debug!("{} from {peer}: {} bytes", message.kind, message.payload.len());
                        match sink.accept(&message).await {
                            Ok(Some(path)) if message.kind == MessageKind::CapturedImage => {
                                info!("saved still {}", path.display());
                            }
                            Ok(_) => {}
                            Err(e) => warn!("failed to store {}: {e}", message.kind),
                        }
                    }
                    Some(Err(e)) => return Err(e),
                    None => break,
                },
                _ = ticker.tick(), if report_every > 0 => {
                    let (since, before) = last_report;
                    let secs = since.elapsed().as_secs_f64().max(f64::EPSILON);
                    let frames = stats.video_frames - before.video_frames;
                    let bytes = stats.bytes - before.bytes;
                    info!(
                        "{peer}: {:.1} fps, {:.1} KiB/s, {} stills total",
                        frames as f64 / secs,
                        bytes as f64 / 1024.0 / secs,
                        stats.stills
                    );
                    last_report = (Instant::now(), stats);
                }
                _ = Self::wait_for_stop(&self.running) => break,
            }
        }

        Ok(stats)
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

// ── Tests ────────────────────────────────────────────────────────
