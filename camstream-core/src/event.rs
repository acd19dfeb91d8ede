//! Observable link events for status display.
//!
//! Every fatal transition produces exactly one of [`LinkEvent::ConnectFailed`],
//! [`LinkEvent::ConnectionLost`] or [`LinkEvent::Disconnected`].

use std::fmt;
use std::net::SocketAddr;

use tokio::sync::broadcast;

use crate::message::MessageKind;

/// Capacity of the event broadcast channel. Slow subscribers lag, they
/// never block the pipeline.
pub const EVENT_CAPACITY: usize = 256;

pub type LinkEventSender = broadcast::Sender<LinkEvent>;
pub type LinkEventReceiver = broadcast::Receiver<LinkEvent>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// A connect attempt started.
    Connecting { endpoint: String },
    /// The stream is open and streaming has been enabled.
    Connected { peer: SocketAddr },
    /// The connect attempt failed; the manager is back to idle.
    ConnectFailed { reason: String },
    /// A requested disconnect completed.
    Disconnected,
    /// A send failed and the connection was torn down.
    ConnectionLost { reason: String },
    /// One message was written and flushed.
    MessageSent { kind: MessageKind, bytes: usize },
    /// One message could not be written. `ConnectionLost` follows.
    MessageFailed { kind: MessageKind, reason: String },
    /// A capture request could not be serviced; the latch was reset.
    CaptureFailed { reason: String },
}

impl LinkEvent {
    /// Whether this event ends a connection or an attempt at one.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LinkEvent::ConnectFailed { .. } | LinkEvent::Disconnected | LinkEvent::ConnectionLost { .. }
        )
    }
}

impl fmt::Display for LinkEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkEvent::Connecting { endpoint } => write!(f, "Connecting to {endpoint}..."),
            LinkEvent::Connected { peer } => write!(f, "Connected to {peer}. Video streaming started."),
            LinkEvent::ConnectFailed { reason } => write!(f, "Connection Failed: {reason}"),
            LinkEvent::Disconnected => write!(f, "Disconnected"),
            LinkEvent::ConnectionLost { reason } => write!(f, "Connection Lost: {reason}"),
            LinkEvent::MessageSent { kind, bytes } => write!(f, "Sent {kind} ({bytes} bytes)"),
            LinkEvent::MessageFailed { kind, reason } => write!(f, "Failed to send {kind}: {reason}"),
            LinkEvent::CaptureFailed { reason } => write!(f, "Capture failed: {reason}"),
        }
    }
}

pub fn channel() -> (LinkEventSender, LinkEventReceiver) {
    broadcast::channel(EVENT_CAPACITY)
}
