//! Hand-off point between the producer thread and the connection's writer.
//!
//! The producer must never wait on the network, so dispatch is a
//! `try_send` into a bounded channel. A full channel means the peer is
//! slower than the camera and the message is dropped.

use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::message::Message;

/// Why a message was not queued. The message is handed back.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// No connection is open, or it is being torn down.
    #[error("not connected")]
    Disconnected(Message),
    /// The writer is behind; the queue is at capacity.
    #[error("outbox full")]
    Full(Message),
}

impl DispatchError {
    pub fn into_message(self) -> Message {
        match self {
            DispatchError::Disconnected(m) | DispatchError::Full(m) => m,
        }
    }
}

/// Cloneable handle to the current connection's outbound queue.
///
/// Holds a sender only while a connection is open. The manager installs
/// it on connect and drops it on teardown, which lets the writer drain
/// what is queued and close the stream.
///
/// Each install starts a new generation. A message routed while one
/// connection was open is dispatched with that connection's generation
/// and is refused once a later connection has taken its place.
#[derive(Debug, Clone, Default)]
pub struct Outbox {
    inner: Arc<Mutex<Inner>>,
}

#[derive(Debug, Default)]
struct Inner {
    generation: u64,
    tx: Option<mpsc::Sender<Message>>,
}

impl Outbox {
    /// An outbox with no connection behind it.
    pub fn new() -> Self {
        Self::default()
    }

    /// An open outbox plus the receiving end, for driving a writer by hand.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let outbox = Self::new();
        let (tx, rx) = mpsc::channel(capacity.max(1));
        outbox.install(tx);
        (outbox, rx)
    }

    /// Queue `message` on whatever connection is open now.
    pub fn try_dispatch(&self, message: Message) -> Result<(), DispatchError> {
        let guard = self.lock();
        Self::send(guard.tx.as_ref(), message)
    }

    /// Queue `message` only if the connection of `generation` is still
    /// the open one.
    pub fn try_dispatch_for(&self, generation: u64, message: Message) -> Result<(), DispatchError> {
        let guard = self.lock();
        if guard.generation != generation {
            return Err(DispatchError::Disconnected(message));
        }
        Self::send(guard.tx.as_ref(), message)
    }

    /// Generation of the installed connection, if there is one.
    pub fn generation(&self) -> Option<u64> {
        let guard = self.lock();
        guard.tx.as_ref().map(|_| guard.generation)
    }

    pub fn is_open(&self) -> bool {
        self.lock().tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    pub(crate) fn install(&self, tx: mpsc::Sender<Message>) {
        let mut guard = self.lock();
        guard.generation = guard.generation.wrapping_add(1);
        guard.tx = Some(tx);
    }

    /// Drop the sender. Returns whether one was installed.
    pub(crate) fn close(&self) -> bool {
        self.lock().tx.take().is_some()
    }

    fn send(tx: Option<&mpsc::Sender<Message>>, message: Message) -> Result<(), DispatchError> {
        let Some(tx) = tx else {
            return Err(DispatchError::Disconnected(message));
        };
        tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(m) => DispatchError::Full(m),
            TrySendError::Closed(m) => DispatchError::Disconnected(m),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
