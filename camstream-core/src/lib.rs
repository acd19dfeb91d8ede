//! # camstream-core
//!
//! Live camera streaming over a single TCP connection.
//!
//! This crate contains:
//! - **Pipeline**: `Frame`, `FrameSlot`, `ModeCoordinator`, `JpegFrameEncoder`, frame sources
//! - **Wire format**: `Message`, `MessageKind` and `MessageCodec` (`[tag u8][len u32 BE][payload]`)
//! - **Network**: `WireSender`, `Outbox` and the `ConnectionManager`
//! - **State**: `ConnectionPhase` state machine and the shared `ModeFlags`
//! - **Events**: `LinkEvent` broadcast for status display
//! - **Error**: `StreamError` / `EncodeError`, `thiserror`-based

pub mod codec;
pub mod config;
pub mod error;
pub mod event;
pub mod flags;
pub mod message;
pub mod network;
pub mod pipeline;
pub mod state;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{DEFAULT_MAX_PAYLOAD, HEADER_LEN, MessageCodec};
pub use config::{EncodingConfig, LinkConfig};
pub use error::{EncodeError, StreamError};
pub use event::{LinkEvent, LinkEventReceiver, LinkEventSender};
pub use flags::{FlagSnapshot, ModeFlags};
pub use message::{Message, MessageKind};
pub use network::{CaptureRequest, ConnectionManager, DispatchError, Outbox, WireSender};
pub use pipeline::{
    Dispatch, Frame, FrameCallback, FrameEncoder, FrameSlot, FrameSource, JpegFrameEncoder,
    ModeCoordinator, PipelineStats, PixelFormat, Plane, Quality, StatsSnapshot, TestPatternConfig,
    TestPatternSource,
};
pub use state::ConnectionPhase;
