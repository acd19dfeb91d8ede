//! Wire sender: one framed message per call, flushed before returning.
//!
//! The sender performs no retry. Any write or flush failure comes back
//! as a connection-fatal [`StreamError`] and the caller is expected to
//! tear the connection down and discard the sender.

use bytes::Bytes;
use futures::SinkExt;
use tokio::io::AsyncWrite;
use tokio_util::codec::FramedWrite;

use crate::codec::MessageCodec;
use crate::error::StreamError;
use crate::message::{Message, MessageKind};

/// Framed writer over the write half of a connection.
#[derive(Debug)]
pub struct WireSender<W> {
    framed: FramedWrite<W, MessageCodec>,
}

impl<W> WireSender<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(writer: W) -> Self {
        Self {
            framed: FramedWrite::new(writer, MessageCodec::new()),
        }
    }

    /// Write `[tag][len][payload]` and flush.
    pub async fn send(&mut self, kind: MessageKind, payload: Bytes) -> Result<(), StreamError> {
        self.send_message(Message { kind, payload }).await
    }

    pub async fn send_message(&mut self, message: Message) -> Result<(), StreamError> {
        // `SinkExt::send` flushes once the item is buffered.
        self.framed.send(message).await
    }

    /// Flush anything still buffered and shut the write side down.
    pub async fn close(&mut self) -> Result<(), StreamError> {
        SinkExt::<Message>::close(&mut self.framed).await
    }

    pub fn get_ref(&self) -> &W {
        self.framed.get_ref()
    }

    pub fn into_inner(self) -> W {
        self.framed.into_inner()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use tokio_util::codec::FramedRead;

    #[tokio::test]
    async fn writes_exact_bytes() {
        let mock = tokio_test::io::Builder::new()
            .write(&[0x01, 0x00, 0x00, 0x00, 0x02, 0xDE, 0xAD])
            .build();
        let mut sender = WireSender::new(mock);
        sender
            .send(MessageKind::VideoFrame, Bytes::from_static(&[0xDE, 0xAD]))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_payload_is_header_only() {
        let mock = tokio_test::io::Builder::new()
            .write(&[0x02, 0x00, 0x00, 0x00, 0x00])
            .build();
        let mut sender = WireSender::new(mock);
        sender
            .send(MessageKind::CapturedImage, Bytes::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn write_failure_surfaces_as_io_error() {
        let mock = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "peer went away",
            ))
            .build();
        let mut sender = WireSender::new(mock);
        let err = sender
            .send(MessageKind::VideoFrame, Bytes::from_static(b"jpeg"))
            .await
            .unwrap_err();
        assert!(matches!(err, StreamError::Io(_)));
        assert!(err.is_connection_fatal());
    }

    #[tokio::test]
    async fn messages_arrive_in_send_order() {
        let (client, server) = tokio::io::duplex(64 * 1024);
        let mut sender = WireSender::new(client);
        let mut reader = FramedRead::new(server, MessageCodec::new());

        for i in 0..5u8 {
            let kind = if i == 3 {
                MessageKind::CapturedImage
            } else {
                MessageKind::VideoFrame
            };
            sender.send(kind, Bytes::from(vec![i; i as usize])).await.unwrap();
        }
        sender.close().await.unwrap();

        let mut seen = Vec::new();
        while let Some(msg) = reader.next().await {
            let msg = msg.unwrap();
            seen.push((msg.kind, msg.payload.to_vec()));
        }
        assert_eq!(seen.len(), 5);
        assert_eq!(seen[3].0, MessageKind::CapturedImage);
        for (i, (_, payload)) in seen.iter().enumerate() {
            assert_eq!(payload, &vec![i as u8; i]);
        }
    }

    #[tokio::test]
    async fn large_payload_round_trip() {
        let (client, server) = tokio::io::duplex(8 * 1024);
        let payload: Vec<u8> = (0..65_536u32).map(|i| (i % 253) as u8).collect();
        let expected = payload.clone();

        let writer = tokio::spawn(async move {
            let mut sender = WireSender::new(client);
            sender
                .send(MessageKind::CapturedImage, Bytes::from(payload))
                .await
                .unwrap();
        });

        let mut reader = FramedRead::new(server, MessageCodec::new());
        let msg = reader.next().await.unwrap().unwrap();
        writer.await.unwrap();

        assert_eq!(msg.kind, MessageKind::CapturedImage);
        assert_eq!(msg.payload.len(), 65_536);
        assert_eq!(&msg.payload[..], &expected[..]);
    }
}
