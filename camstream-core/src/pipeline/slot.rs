//! Single-capacity, overwrite-on-write frame mailbox.
//!
//! The slot is the whole backpressure policy of the pipeline: there is no
//! queue. A consumer that falls behind only ever sees the newest frame;
//! everything it missed was released when it got overwritten.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::pipeline::types::Frame;

/// Holds at most one unclaimed [`Frame`].
///
/// `put`, `take_latest` and `clear` are mutually exclusive. The critical
/// section is a pointer swap; displaced frames are released after the
/// lock is dropped so a slow release hook never stalls the other side.
#[derive(Debug, Default)]
pub struct FrameSlot {
    latest: Mutex<Option<Frame>>,
    overwritten: AtomicU64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `frame`, releasing whatever frame was stored before.
    pub fn put(&self, frame: Frame) {
        let previous = self.lock().replace(frame);
        if previous.is_some() {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        drop(previous);
    }

    /// Remove and return the stored frame, if any.
    pub fn take_latest(&self) -> Option<Frame> {
        self.lock().take()
    }

    /// Release the stored frame, if any. Returns whether one was held.
    pub fn clear(&self) -> bool {
        let held = self.lock().take();
        held.is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    /// Frames released because a newer one replaced them.
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, Option<Frame>> {
        // A poisoned slot still holds a valid `Option<Frame>`.
        self.latest.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ── Tests ────────────────────────────────────────────────────────
