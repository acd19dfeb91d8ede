//! Error types for the camstream pipeline.
//!
//! Two layers, mirroring the failure taxonomy of the pipeline:
//!
//! - [`EncodeError`] is a *per-frame* failure. The frame is dropped and the
//!   pipeline keeps running.
//! - [`StreamError`] covers everything else. I/O and timeout variants are
//!   connection-fatal when they surface from the wire.

use std::time::Duration;
use thiserror::Error;

use crate::pipeline::types::PixelFormat;

/// The canonical error type for the camstream core.
#[derive(Debug, Error)]
pub enum StreamError {
    // ── Connection Errors ────────────────────────────────────────
    /// The TCP/IO layer reported an error.
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),

    /// A connect, write or close exceeded its deadline.
    #[error("timeout after {0:?}")]
    Timeout(Duration),

    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// A state machine transition was requested from the wrong phase.
    #[error("invalid transition: {0}")]
    InvalidTransition(&'static str),

    // ── Framing Errors ───────────────────────────────────────────
    /// The payload does not fit the wire length field or the reader limit.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A tag byte did not map to any known message kind.
    #[error("unknown message kind tag: {0:#04x}")]
    UnknownMessageKind(u8),

    // ── Pipeline Errors ──────────────────────────────────────────
    /// A frame could not be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] EncodeError),

    /// No Tokio runtime was available to run network work on.
    #[error("runtime unavailable: {0}")]
    Runtime(String),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

impl StreamError {
    /// Whether this error, surfacing from the wire, means the connection
    /// is gone for good.
    pub fn is_connection_fatal(&self) -> bool {
        matches!(
            self,
            StreamError::Io(_) | StreamError::Timeout(_) | StreamError::ChannelClosed
        )
    }
}

// ── EncodeError ──────────────────────────────────────────────────

/// Recoverable, per-frame encoder failure.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// The encoder does not understand this pixel layout.
    #[error("unsupported pixel format: {0}")]
    UnsupportedFormat(PixelFormat),

    /// Width or height is zero, or the plane count does not match the format.
    #[error("invalid frame geometry: {0}")]
    InvalidGeometry(&'static str),

    /// A plane holds fewer bytes than its strides and dimensions require.
    #[error("plane {plane} too short: need {needed} bytes, have {actual}")]
    PlaneTooShort {
        plane: usize,
        needed: usize,
        actual: usize,
    },

    /// The underlying codec rejected the data.
    #[error("codec failure: {0}")]
    Codec(String),
}

impl From<image::ImageError> for EncodeError {
    fn from(e: image::ImageError) -> Self {
        EncodeError::Codec(e.to_string())
    }
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for StreamError {
    fn from(s: String) -> Self {
        StreamError::Other(s)
    }
}

impl From<&str> for StreamError {
    fn from(s: &str) -> Self {
        StreamError::Other(s.to_string())
    }
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for StreamError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        StreamError::ChannelClosed
    }
}

impl From<tokio::time::error::Elapsed> for StreamError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        // `Elapsed` does not carry the deadline; callers that know it
        // build `StreamError::Timeout` themselves.
        StreamError::Timeout(Duration::ZERO)
    }
}
