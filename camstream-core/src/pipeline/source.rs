//! Frame sources: the push side of the pipeline.
//!
//! A source owns its producer thread and hands every frame to a callback.
//! The callback runs on that thread and must not block.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::StreamError;
use crate::pipeline::types::{Frame, PixelFormat, Plane};

/// Receives each produced frame on the producer thread.
pub type FrameCallback = Box<dyn FnMut(Frame) + Send>;

/// Anything that pushes frames into the pipeline.
pub trait FrameSource: Send {
    /// Begin producing. Frames flow into `on_frame` until [`stop`](Self::stop).
    fn start(&mut self, on_frame: FrameCallback) -> Result<(), StreamError>;

    /// Stop producing and wait for the producer thread to finish.
    /// No frame is delivered after this returns.
    fn stop(&mut self);
}

// ── TestPatternSource ────────────────────────────────────────────

/// Geometry and pacing of the synthetic camera.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TestPatternConfig {
    pub width: u32,
    pub height: u32,
    /// Target frames per second.
    pub fps: u32,
    /// Frames that may be alive (not yet released) at once. The producer
    /// skips a tick instead of allocating past this.
    pub max_in_flight: usize,
}

impl Default for TestPatternConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
            max_in_flight: 2,
        }
    }
}

/// A camera stand-in producing a moving YUV420 gradient.
///
/// Behaves like a real device with a small buffer pool: frames count
/// against `max_in_flight` until released, and ticks with no free buffer
/// are skipped.
pub struct TestPatternSource {
    config: TestPatternConfig,
    running: Arc<AtomicBool>,
    in_flight: Arc<AtomicUsize>,
    skipped: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl TestPatternSource {
    pub fn new(config: TestPatternConfig) -> Self {
        Self {
            config,
            running: Arc::new(AtomicBool::new(false)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            skipped: Arc::new(AtomicU64::new(0)),
            worker: None,
        }
    }

    pub fn config(&self) -> &TestPatternConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Frames handed out and not yet released.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Ticks skipped because every buffer was still in use.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    fn validate(&self) -> Result<(), StreamError> {
        if self.config.width == 0 || self.config.height == 0 {
            return Err("test pattern needs a non-zero frame size".into());
        }
        if self.config.fps == 0 {
            return Err("test pattern needs a non-zero frame rate".into());
        }
        if self.config.max_in_flight == 0 {
            return Err("test pattern needs at least one frame buffer".into());
        }
        Ok(())
    }

    /// Sleep for the remainder of the frame interval.
    fn pace(tick_start: Instant, interval: Duration) {
        let elapsed = tick_start.elapsed();
        if elapsed < interval {
            std::thread::sleep(interval - elapsed);
        }
    }
}

impl FrameSource for TestPatternSource {
    fn start(&mut self, mut on_frame: FrameCallback) -> Result<(), StreamError> {
        if self.worker.is_some() {
            return Err("source already started".into());
        }
        self.validate()?;

        let TestPatternConfig {
            width,
            height,
            fps,
            max_in_flight,
        } = self.config.clone();
        let interval = Duration::from_secs_f64(1.0 / f64::from(fps));
        let running = Arc::clone(&self.running);
        let in_flight = Arc::clone(&self.in_flight);
        let skipped = Arc::clone(&self.skipped);

        running.store(true, Ordering::SeqCst);
        let spawned = std::thread::Builder::new()
            .name("camstream-producer".into())
            .spawn(move || {
                let mut sequence: u64 = 0;
                while running.load(Ordering::SeqCst) {
                    let tick_start = Instant::now();

                    if in_flight.load(Ordering::SeqCst) >= max_in_flight {
                        skipped.fetch_add(1, Ordering::Relaxed);
                        Self::pace(tick_start, interval);
                        continue;
                    }

                    sequence += 1;
                    in_flight.fetch_add(1, Ordering::SeqCst);
                    let counter = Arc::clone(&in_flight);
                    let frame = test_pattern(width, height, sequence).on_release(move || {
                        counter.fetch_sub(1, Ordering::SeqCst);
                    });
                    on_frame(frame);

                    Self::pace(tick_start, interval);
                }
                debug!(frames = sequence, "producer thread exiting");
            });

        match spawned {
            Ok(handle) => {
                info!(width, height, fps, "test pattern source started");
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                Err(e.into())
            }
        }
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("producer thread panicked");
            }
            info!(skipped = self.skipped(), "test pattern source stopped");
        }
    }
}

impl Drop for TestPatternSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// One frame of the moving gradient in planar YUV420.
///
/// Luma shifts with `sequence` so consecutive frames differ; chroma is a
/// fixed horizontal/vertical ramp.
pub fn test_pattern(width: u32, height: u32, sequence: u64) -> Frame {
    let (w, h) = (width as usize, height as usize);
    let (cw, ch) = (w.div_ceil(2), h.div_ceil(2));
    let shift = (sequence.wrapping_mul(4) & 0xff) as usize;

    let mut luma = Vec::with_capacity(w * h);
    for y in 0..h {
        for x in 0..w {
            luma.push(((x + y + shift) & 0xff) as u8);
        }
    }

    let mut cb = Vec::with_capacity(cw * ch);
    let mut cr = Vec::with_capacity(cw * ch);
    for y in 0..ch {
        for x in 0..cw {
            cb.push((64 + (x * 128) / cw.max(1)) as u8);
            cr.push((64 + (y * 128) / ch.max(1)) as u8);
        }
    }

    Frame::new(
        width,
        height,
        PixelFormat::Yuv420,
        vec![
            Plane::new(luma, w, 1),
            Plane::new(cb, cw, 1),
            Plane::new(cr, cw, 1),
        ],
    )
    .with_sequence(sequence)
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::mpsc;

    fn fast(max_in_flight: usize) -> TestPatternConfig {
        TestPatternConfig {
            width: 8,
            height: 6,
            fps: 500,
            max_in_flight,
        }
    }

    #[test]
    fn pattern_geometry() {
        let frame = test_pattern(5, 3, 7);
        assert_eq!(frame.format(), PixelFormat::Yuv420);
        assert_eq!(frame.sequence(), 7);
        assert_eq!(frame.planes()[0].data.len(), 15);
        assert_eq!(frame.planes()[1].data.len(), 3 * 2);
        assert_ne!(
            test_pattern(5, 3, 1).planes()[0].data,
            test_pattern(5, 3, 2).planes()[0].data
        );
    }

    #[test]
    fn delivers_increasing_sequences() {
        let (tx, rx) = mpsc::channel();
        let mut source = TestPatternSource::new(fast(4));
        source
            .start(Box::new(move |frame| {
                let _ = tx.send(frame.sequence());
            }))
            .unwrap();

        let seen: Vec<u64> = rx.iter().take(5).collect();
        source.stop();

        assert_eq!(seen, vec![1, 2, 3, 4, 5]);
        assert!(!source.is_running());
        assert_eq!(source.in_flight(), 0);
    }

    #[test]
    fn unreleased_frames_throttle_the_producer() {
        let held = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&held);
        let mut source = TestPatternSource::new(fast(2));
        source
            .start(Box::new(move |frame| sink.lock().unwrap().push(frame)))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while source.skipped() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(held.lock().unwrap().len(), 2);
        assert_eq!(source.in_flight(), 2);

        held.lock().unwrap().clear();
        assert_eq!(source.in_flight(), 0);
        source.stop();
    }

    #[test]
    fn no_frames_after_stop() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let mut source = TestPatternSource::new(fast(4));
        source
            .start(Box::new(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        source.stop();

        let after_stop = count.load(Ordering::SeqCst);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn double_start_rejected() {
        let mut source = TestPatternSource::new(fast(1));
        source.start(Box::new(|_| {})).unwrap();
        assert!(source.start(Box::new(|_| {})).is_err());
    }

    #[test]
    fn invalid_config_rejected() {
        let mut source = TestPatternSource::new(TestPatternConfig {
            fps: 0,
            ..fast(1)
        });
        assert!(source.start(Box::new(|_| {})).is_err());
        assert!(!source.is_running());
    }
}
