//! Mode coordinator: decides what each arriving frame is for.
//!
//! Runs synchronously on the producer's callback thread and never waits
//! on the network. Per frame, in priority order:
//!
//! 1. not connected        → release
//! 2. capture latch armed  → encode at capture quality, queue `CapturedImage`
//! 3. streaming enabled    → encode at stream quality, queue `VideoFrame`
//! 4. otherwise            → release
//!
//! A pending capture is never starved by streaming because the latch is
//! checked first. Every frame leaves through the slot, the encoder, or an
//! explicit clear, so it is released exactly once.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::EncodingConfig;
use crate::event::{LinkEvent, LinkEventSender};
use crate::flags::ModeFlags;
use crate::message::{Message, MessageKind};
use crate::network::outbox::Outbox;
use crate::pipeline::encoder::FrameEncoder;
use crate::pipeline::slot::FrameSlot;
use crate::pipeline::source::FrameCallback;
use crate::pipeline::stats::PipelineStats;
use crate::pipeline::types::Frame;

/// What happened to one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Not connected; the frame was released.
    Idle,
    /// Connected but neither capturing nor streaming; released.
    Discarded,
    /// Encoded and queued for the writer.
    Queued(MessageKind),
    /// The slot was drained by a concurrent teardown before the frame
    /// could be claimed. Counted as discarded.
    NoFrame,
    /// The encoder rejected the frame.
    EncodeFailed(MessageKind),
    /// Encoded, but the outbox was full, closed, or now belongs to a
    /// later connection.
    Dropped(MessageKind),
}

pub struct ModeCoordinator<E> {
    slot: Arc<FrameSlot>,
    flags: Arc<ModeFlags>,
    outbox: Outbox,
    events: LinkEventSender,
    encoder: E,
    encoding: EncodingConfig,
    stats: Arc<PipelineStats>,
}

impl<E: FrameEncoder> ModeCoordinator<E> {
    pub fn new(
        slot: Arc<FrameSlot>,
        flags: Arc<ModeFlags>,
        outbox: Outbox,
        events: LinkEventSender,
        encoder: E,
        encoding: EncodingConfig,
    ) -> Self {
        Self {
            slot,
            flags,
            outbox,
            events,
            encoder,
            encoding,
            stats: Arc::new(PipelineStats::new()),
        }
    }

    /// Shared counters, readable while the coordinator runs elsewhere.
    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Route one frame from the source.
    pub fn on_frame(&mut self, frame: Frame) -> Dispatch {
        self.stats.record_received();
        let outcome = self.route(frame);
        self.record(outcome);
        outcome
    }

    fn route(&mut self, frame: Frame) -> Dispatch {
        let sequence = frame.sequence();
        self.slot.put(frame);

        // Read the generation before the flag: if a teardown and a new
        // connect land in between, the dispatch below is refused.
        let generation = self.outbox.generation();
        let Some(generation) = generation.filter(|_| self.flags.is_connected()) else {
            self.slot.clear();
            return Dispatch::Idle;
        };

        let (kind, quality) = if self.flags.take_capture_request() {
            (MessageKind::CapturedImage, self.encoding.capture_quality)
        } else if self.flags.is_streaming() {
            (MessageKind::VideoFrame, self.encoding.stream_quality)
        } else {
            self.slot.clear();
            return Dispatch::Discarded;
        };

        // A teardown may have drained the slot since the put above.
        let Some(frame) = self.slot.take_latest() else {
            if kind == MessageKind::CapturedImage {
                self.capture_failed("no frame available".into());
            }
            return Dispatch::NoFrame;
        };

        let payload = match self.encoder.encode(frame, quality) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(sequence, %kind, error = %e, "encode failed; frame dropped");
                if kind == MessageKind::CapturedImage {
                    self.capture_failed(e.to_string());
                }
                return Dispatch::EncodeFailed(kind);
            }
        };

        let bytes = payload.len();
        match self
            .outbox
            .try_dispatch_for(generation, Message { kind, payload })
        {
            Ok(()) => {
                if kind == MessageKind::CapturedImage {
                    info!(sequence, bytes, "still captured");
                }
                Dispatch::Queued(kind)
            }
            Err(e) => {
                debug!(sequence, %kind, reason = %e, "message dropped");
                if kind == MessageKind::CapturedImage {
                    self.capture_failed(e.to_string());
                }
                Dispatch::Dropped(kind)
            }
        }
    }

    fn record(&self, outcome: Dispatch) {
        match outcome {
            Dispatch::Idle | Dispatch::Discarded | Dispatch::NoFrame => {
                self.stats.record_discarded()
            }
            Dispatch::Queued(MessageKind::VideoFrame) => self.stats.record_streamed(),
            Dispatch::Queued(MessageKind::CapturedImage) => self.stats.record_captured(),
            Dispatch::EncodeFailed(_) => self.stats.record_encode_failure(),
            Dispatch::Dropped(_) => self.stats.record_dispatch_drop(),
        }
    }

    fn capture_failed(&self, reason: String) {
        warn!(%reason, "capture failed");
        let _ = self.events.send(LinkEvent::CaptureFailed { reason });
    }
}

impl<E: FrameEncoder + 'static> ModeCoordinator<E> {
    /// Turn the coordinator into a push callback for a frame source.
    pub fn into_callback(mut self) -> FrameCallback {
        Box::new(move |frame| {
            self.on_frame(frame);
        })
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EncodeError;
    use crate::event;
    use crate::pipeline::encoder::Quality;
    use crate::pipeline::types::{PixelFormat, Plane};
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc;

    type Hook = Box<dyn FnMut() + Send>;

    /// Encodes a frame as its sequence number; fails on request.
    #[derive(Clone, Default)]
    struct ScriptedEncoder {
        fail: Arc<Mutex<bool>>,
        qualities: Arc<Mutex<Vec<Quality>>>,
        during_encode: Arc<Mutex<Option<Hook>>>,
    }

    impl FrameEncoder for ScriptedEncoder {
        fn encode(&mut self, frame: Frame, quality: Quality) -> Result<Bytes, EncodeError> {
            self.qualities.lock().unwrap().push(quality);
            if let Some(hook) = self.during_encode.lock().unwrap().as_mut() {
                hook();
            }
            if *self.fail.lock().unwrap() {
                return Err(EncodeError::UnsupportedFormat(frame.format()));
            }
            Ok(Bytes::from(frame.sequence().to_be_bytes().to_vec()))
        }
    }

    struct Harness {
        coordinator: ModeCoordinator<ScriptedEncoder>,
        encoder: ScriptedEncoder,
        flags: Arc<ModeFlags>,
        slot: Arc<FrameSlot>,
        outbox: Outbox,
        rx: mpsc::Receiver<Message>,
        events: event::LinkEventReceiver,
        released: Arc<AtomicUsize>,
        next_seq: u64,
    }

    impl Harness {
        fn new(capacity: usize) -> Self {
            let slot = Arc::new(FrameSlot::new());
            let flags = Arc::new(ModeFlags::new());
            let (outbox, rx) = Outbox::channel(capacity);
            let (tx, events) = event::channel();
            let encoder = ScriptedEncoder::default();
            let coordinator = ModeCoordinator::new(
                Arc::clone(&slot),
                Arc::clone(&flags),
                outbox.clone(),
                tx,
                encoder.clone(),
                EncodingConfig::default(),
            );
            Self {
                coordinator,
                encoder,
                flags,
                slot,
                outbox,
                rx,
                events,
                released: Arc::new(AtomicUsize::new(0)),
                next_seq: 0,
            }
        }

        fn connected(capacity: usize) -> Self {
            let h = Self::new(capacity);
            h.flags.set_connected(true);
            h.flags.set_streaming(true);
            h
        }

        fn push(&mut self) -> Dispatch {
            self.next_seq += 1;
            let c = Arc::clone(&self.released);
            let frame = Frame::new(2, 2, PixelFormat::Rgb8, vec![Plane::new(vec![0; 12], 6, 3)])
                .with_sequence(self.next_seq)
                .on_release(move || {
                    c.fetch_add(1, Ordering::SeqCst);
                });
            self.coordinator.on_frame(frame)
        }

        fn drain(&mut self) -> Vec<(MessageKind, u64)> {
            let mut out = Vec::new();
            while let Ok(msg) = self.rx.try_recv() {
                let seq = u64::from_be_bytes(msg.payload[..8].try_into().unwrap());
                out.push((msg.kind, seq));
            }
            out
        }

        fn released(&self) -> usize {
            self.released.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn idle_frames_are_released() {
        let mut h = Harness::new(4);
        assert_eq!(h.push(), Dispatch::Idle);
        assert_eq!(h.push(), Dispatch::Idle);

        assert_eq!(h.released(), 2);
        assert!(h.slot.is_empty());
        assert!(h.drain().is_empty());
        assert_eq!(h.coordinator.stats().snapshot().discarded, 2);
    }

    #[test]
    fn streaming_sends_frames_in_arrival_order() {
        let mut h = Harness::connected(8);
        for _ in 0..3 {
            assert_eq!(h.push(), Dispatch::Queued(MessageKind::VideoFrame));
        }

        assert_eq!(
            h.drain(),
            vec![
                (MessageKind::VideoFrame, 1),
                (MessageKind::VideoFrame, 2),
                (MessageKind::VideoFrame, 3),
            ]
        );
        assert_eq!(h.released(), 3);
        assert!(
            h.encoder
                .qualities
                .lock()
                .unwrap()
                .iter()
                .all(|q| *q == Quality::STREAM)
        );
    }

    #[test]
    fn capture_takes_priority_over_streaming() {
        let mut h = Harness::connected(8);
        assert!(h.flags.arm_capture());

        assert_eq!(h.push(), Dispatch::Queued(MessageKind::CapturedImage));
        assert!(!h.flags.is_capture_pending());
        assert_eq!(h.drain(), vec![(MessageKind::CapturedImage, 1)]);
        assert_eq!(h.encoder.qualities.lock().unwrap()[0], Quality::CAPTURE);

        // Streaming resumes on the next frame.
        assert_eq!(h.push(), Dispatch::Queued(MessageKind::VideoFrame));
        assert_eq!(h.drain(), vec![(MessageKind::VideoFrame, 2)]);
        assert_eq!(h.released(), 2);
    }

    #[test]
    fn capture_with_streaming_disabled() {
        let mut h = Harness::connected(8);
        h.flags.set_streaming(false);
        h.flags.arm_capture();

        assert_eq!(h.push(), Dispatch::Queued(MessageKind::CapturedImage));
        assert_eq!(h.push(), Dispatch::Discarded);

        assert_eq!(h.drain(), vec![(MessageKind::CapturedImage, 1)]);
        assert!(!h.flags.is_capture_pending());
        assert_eq!(h.released(), 2);
        let stats = h.coordinator.stats().snapshot();
        assert_eq!(stats.captured, 1);
        assert_eq!(stats.streamed, 0);
    }

    #[test]
    fn encode_failure_resets_capture_and_reports() {
        let mut h = Harness::connected(8);
        *h.encoder.fail.lock().unwrap() = true;
        h.flags.arm_capture();

        assert_eq!(h.push(), Dispatch::EncodeFailed(MessageKind::CapturedImage));
        assert!(!h.flags.is_capture_pending(), "latch must not stay armed");
        assert_eq!(h.released(), 1);
        assert!(h.drain().is_empty());
        assert!(matches!(
            h.events.try_recv(),
            Ok(LinkEvent::CaptureFailed { .. })
        ));

        // The pipeline keeps going once the encoder recovers.
        *h.encoder.fail.lock().unwrap() = false;
        assert_eq!(h.push(), Dispatch::Queued(MessageKind::VideoFrame));
        assert_eq!(h.coordinator.stats().snapshot().encode_failures, 1);
    }

    #[test]
    fn video_encode_failure_is_silent() {
        let mut h = Harness::connected(8);
        *h.encoder.fail.lock().unwrap() = true;

        assert_eq!(h.push(), Dispatch::EncodeFailed(MessageKind::VideoFrame));
        assert_eq!(h.released(), 1);
        assert!(h.events.try_recv().is_err());
    }

    #[test]
    fn full_outbox_drops_without_blocking() {
        let mut h = Harness::connected(1);
        assert_eq!(h.push(), Dispatch::Queued(MessageKind::VideoFrame));
        assert_eq!(h.push(), Dispatch::Dropped(MessageKind::VideoFrame));

        h.flags.arm_capture();
        assert_eq!(h.push(), Dispatch::Dropped(MessageKind::CapturedImage));
        assert!(matches!(
            h.events.try_recv(),
            Ok(LinkEvent::CaptureFailed { .. })
        ));

        assert_eq!(h.drain(), vec![(MessageKind::VideoFrame, 1)]);
        assert_eq!(h.released(), 3);
        assert_eq!(h.coordinator.stats().snapshot().dispatch_drops, 2);
    }

    #[test]
    fn closed_outbox_is_treated_as_disconnected() {
        let mut h = Harness::connected(4);
        h.rx.close();
        assert_eq!(h.push(), Dispatch::Dropped(MessageKind::VideoFrame));
        assert_eq!(h.released(), 1);
    }

    #[test]
    fn every_frame_released_exactly_once_across_paths() {
        let mut h = Harness::connected(2);
        let mut produced = 0;
        for round in 0..40 {
            match round % 5 {
                0 => {
                    h.flags.arm_capture();
                }
                1 => h.flags.set_streaming(false),
                2 => h.flags.set_streaming(true),
                3 => *h.encoder.fail.lock().unwrap() = round % 2 == 0,
                _ => {
                    h.drain();
                }
            }
            h.push();
            produced += 1;
        }
        h.flags.set_connected(false);
        h.push();
        produced += 1;

        h.drain();
        assert_eq!(h.released(), produced);
        assert!(h.slot.is_empty());

        let s = h.coordinator.stats().snapshot();
        assert_eq!(s.received, produced as u64);
        assert_eq!(
            s.received,
            s.streamed + s.captured + s.discarded + s.encode_failures + s.dispatch_drops
        );
    }

    #[test]
    fn unclaimed_frame_counts_as_discarded() {
        let h = Harness::connected(4);
        h.coordinator.record(Dispatch::NoFrame);
        assert_eq!(h.coordinator.stats().snapshot().discarded, 1);
    }

    #[test]
    fn capture_is_not_sent_on_a_connection_opened_during_encode() {
        let mut h = Harness::connected(4);
        h.flags.arm_capture();

        let outbox = h.outbox.clone();
        let replacement = Arc::new(Mutex::new(None));
        let stash = Arc::clone(&replacement);
        *h.encoder.during_encode.lock().unwrap() = Some(Box::new(move || {
            // The connection is torn down and a new one opened mid-encode.
            outbox.close();
            let (tx, rx) = mpsc::channel(4);
            outbox.install(tx);
            *stash.lock().unwrap() = Some(rx);
        }));

        assert_eq!(h.push(), Dispatch::Dropped(MessageKind::CapturedImage));
        assert!(matches!(
            h.events.try_recv(),
            Ok(LinkEvent::CaptureFailed { .. })
        ));
        let mut rx = replacement.lock().unwrap().take().unwrap();
        assert!(rx.try_recv().is_err());
        assert_eq!(h.released(), 1);
        assert_eq!(h.coordinator.stats().snapshot().dispatch_drops, 1);
    }

    #[test]
    fn callback_feeds_the_coordinator() {
        let h = Harness::connected(4);
        let Harness {
            coordinator,
            mut rx,
            released,
            ..
        } = h;
        let stats = coordinator.stats();
        let mut callback = coordinator.into_callback();

        let c = Arc::clone(&released);
        let frame = Frame::new(1, 1, PixelFormat::Rgb8, vec![Plane::new(vec![0; 3], 3, 3)])
            .with_sequence(9)
            .on_release(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        callback(frame);

        assert_eq!(rx.try_recv().unwrap().kind, MessageKind::VideoFrame);
        assert_eq!(released.load(Ordering::SeqCst), 1);
        assert_eq!(stats.snapshot().streamed, 1);
    }
}
