//! # Frame pipeline
//!
//! Everything between the camera callback and the outbound queue.
//!
//! ```text
//! FrameSource ──► ModeCoordinator ──► FrameSlot ──► FrameEncoder ──► Outbox
//!  (producer)      (per-frame          (latest      (JPEG)           (to writer)
//!                   routing)            frame)
//! ```
//!
//! ## Sub-modules
//!
//! | Module        | Purpose                                            |
//! |---------------|----------------------------------------------------|
//! | `types`       | `Frame`, `Plane` and `PixelFormat`                 |
//! | `slot`        | Single-frame holder that keeps only the newest     |
//! | `encoder`     | Raw frame to JPEG conversion                       |
//! | `coordinator` | Chooses stream, capture or discard for each frame  |
//! | `source`      | Producer trait and the synthetic test pattern      |
//! | `stats`       | Frame counters for status output                   |

pub mod coordinator;
pub mod encoder;
pub mod slot;
pub mod source;
pub mod stats;
pub mod types;

// ── Re-exports ───────────────────────────────────────────────────

pub use coordinator::{Dispatch, ModeCoordinator};
pub use encoder::{FrameEncoder, JpegFrameEncoder, Quality};
pub use slot::FrameSlot;
pub use source::{FrameCallback, FrameSource, TestPatternConfig, TestPatternSource, test_pattern};
pub use stats::{PipelineStats, StatsSnapshot};
pub use types::{Frame, PixelFormat, Plane};
