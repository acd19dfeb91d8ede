//! Mode flags read by the producer on every frame.
//!
//! Only the connection manager writes `connected` and `streaming`.
//! `capture` is a one-shot latch: the manager arms it, the coordinator
//! disarms it with an atomic test-and-reset so exactly one frame services
//! each request.

use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default)]
pub struct ModeFlags {
    connected: AtomicBool,
    streaming: AtomicBool,
    capture: AtomicBool,
}

impl ModeFlags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    pub fn is_capture_pending(&self) -> bool {
        self.capture.load(Ordering::Acquire)
    }

    /// Disarm the capture latch. Returns `true` if it was armed.
    pub fn take_capture_request(&self) -> bool {
        self.capture
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    // ── Manager-only writers ─────────────────────────────────────

    pub(crate) fn set_connected(&self, value: bool) {
        self.connected.store(value, Ordering::Release);
    }

    pub(crate) fn set_streaming(&self, value: bool) {
        self.streaming.store(value, Ordering::Release);
    }

    /// Arm the capture latch. Returns `false` if it was already armed.
    pub(crate) fn arm_capture(&self) -> bool {
        self.capture
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn clear_capture(&self) {
        self.capture.store(false, Ordering::Release);
    }

    /// Snapshot for status display.
    pub fn snapshot(&self) -> FlagSnapshot {
        FlagSnapshot {
            connected: self.is_connected(),
            streaming: self.is_streaming(),
            capture_pending: self.is_capture_pending(),
        }
    }
}

/// Point-in-time copy of [`ModeFlags`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlagSnapshot {
    pub connected: bool,
    pub streaming: bool,
    pub capture_pending: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn starts_cleared() {
        assert_eq!(ModeFlags::new().snapshot(), FlagSnapshot::default());
    }

    #[test]
    fn capture_latch_is_one_shot() {
        let flags = ModeFlags::new();
        assert!(!flags.take_capture_request());

        assert!(flags.arm_capture());
        assert!(!flags.arm_capture(), "second arm is a no-op");
        assert!(flags.is_capture_pending());

        assert!(flags.take_capture_request());
        assert!(!flags.take_capture_request());
        assert!(!flags.is_capture_pending());
    }

    #[test]
    fn concurrent_takers_service_one_request() {
        let flags = Arc::new(ModeFlags::new());
        flags.arm_capture();
        let winners = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let flags = Arc::clone(&flags);
                let winners = Arc::clone(&winners);
                std::thread::spawn(move || {
                    if flags.take_capture_request() {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }
}
