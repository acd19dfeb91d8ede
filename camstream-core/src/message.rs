//! Wire message types.
//!
//! Tags convert with `TryFrom`, so an unknown tag is an error rather than a panic.

use std::fmt;

use bytes::Bytes;

use crate::error::StreamError;

// ── MessageKind ──────────────────────────────────────────────────

/// Discriminates the payload carried by one wire message.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    /// A continuously streamed, best-effort video frame.
    VideoFrame = 0x1,
    /// A single-shot still, encoded at capture quality.
    CapturedImage = 0x2,
}

impl MessageKind {
    /// The tag byte written at the start of every message.
    pub const fn tag(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = StreamError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x1 => Ok(MessageKind::VideoFrame),
            0x2 => Ok(MessageKind::CapturedImage),
            other => Err(StreamError::UnknownMessageKind(other)),
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::VideoFrame => write!(f, "VideoFrame"),
            MessageKind::CapturedImage => write!(f, "CapturedImage"),
        }
    }
}

// ── Message ──────────────────────────────────────────────────────

/// One framed message: a kind plus an opaque payload.
///
/// Outbound messages live only for the duration of a single send.
#[derive(Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub payload: Bytes,
}

impl Message {
    pub fn new(kind: MessageKind, payload: impl Into<Bytes>) -> Self {
        Self {
            kind,
            payload: payload.into(),
        }
    }

    pub fn video(payload: impl Into<Bytes>) -> Self {
        Self::new(MessageKind::VideoFrame, payload)
    }

    pub fn captured(payload: impl Into<Bytes>) -> Self {
        Self::new(MessageKind::CapturedImage, payload)
    }

    /// Bytes this message occupies on the wire.
    pub fn wire_len(&self) -> usize {
        crate::codec::HEADER_LEN + self.payload.len()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("kind", &self.kind)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}
