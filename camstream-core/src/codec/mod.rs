//! Length-prefixed framing for camstream messages.
//!
//! ## Wire format
//!
//! ```text
//! tag:      u8            (1 = video frame, 2 = captured still)
//! length:   u32 BE        (payload byte count)
//! payload:  [u8; length]
//! ```
//!
//! Messages are written back to back. There is no handshake, no
//! acknowledgement and no heartbeat.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::error::StreamError;
use crate::message::{Message, MessageKind};

/// Tag byte plus length field.
pub const HEADER_LEN: usize = 5;

/// Largest payload the length field can describe.
pub const MAX_WIRE_PAYLOAD: usize = u32::MAX as usize;

/// Default reader-side cap on a single payload (32 MiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 32 * 1024 * 1024;

/// Encoder/decoder pair for [`Message`] framing.
///
/// The encoder accepts anything the length field can express. The
/// decoder refuses payloads above `max_payload` so a corrupt length
/// cannot make the reader allocate gigabytes.
#[derive(Debug, Clone)]
pub struct MessageCodec {
    max_payload: usize,
}

impl MessageCodec {
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD)
    }

    pub fn with_max_payload(max_payload: usize) -> Self {
        Self {
            max_payload: max_payload.min(MAX_WIRE_PAYLOAD),
        }
    }

    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Default for MessageCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MessageCodec {
    type Item = Message;
    type Error = StreamError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let kind = MessageKind::try_from(src[0])?;
        let len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;
        if len > self.max_payload {
            return Err(StreamError::PayloadTooLarge {
                size: len,
                max: self.max_payload,
            });
        }

        if src.len() < HEADER_LEN + len {
            src.reserve(HEADER_LEN + len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(len).freeze();
        Ok(Some(Message { kind, payload }))
    }
}

impl Encoder<Message> for MessageCodec {
    type Error = StreamError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = item.payload.len();
        let len = u32::try_from(len).map_err(|_| StreamError::PayloadTooLarge {
            size: len,
            max: MAX_WIRE_PAYLOAD,
        })?;

        dst.reserve(HEADER_LEN + item.payload.len());
        dst.put_u8(item.kind.tag());
        dst.put_u32(len);
        dst.extend_from_slice(&item.payload);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(msg: Message) -> BytesMut {
        let mut buf = BytesMut::new();
        MessageCodec::new().encode(msg, &mut buf).unwrap();
        buf
    }

    #[test]
    fn header_layout_is_byte_exact() {
        let buf = encode(Message::captured(vec![0xAAu8, 0xBB, 0xCC]));
        assert_eq!(&buf[..], &[0x02, 0x00, 0x00, 0x00, 0x03, 0xAA, 0xBB, 0xCC]);
    }

    #[test]
    fn length_is_big_endian() {
        let buf = encode(Message::video(vec![0u8; 0x0102]));
        assert_eq!(&buf[..HEADER_LEN], &[0x01, 0x00, 0x00, 0x01, 0x02]);
    }

    #[test]
    fn round_trip_boundary_sizes() {
        for n in [0usize, 1, 65_536] {
            let payload: Vec<u8> = (0..n).map(|i| (i % 251) as u8).collect();
            let mut buf = encode(Message::video(payload.clone()));
            assert_eq!(buf.len(), HEADER_LEN + n);

            let msg = MessageCodec::new().decode(&mut buf).unwrap().unwrap();
            assert_eq!(msg.kind, MessageKind::VideoFrame);
            assert_eq!(msg.payload.len(), n);
            assert_eq!(&msg.payload[..], &payload[..]);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn partial_input_waits_for_more() {
        let full = encode(Message::captured(vec![7u8; 100]));
        let mut codec = MessageCodec::new();

        let mut buf = BytesMut::from(&full[..3]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&full[3..50]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&full[50..]);
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.kind, MessageKind::CapturedImage);
        assert_eq!(msg.payload.len(), 100);
    }

    #[test]
    fn back_to_back_messages_decode_in_order() {
        let mut buf = encode(Message::video(vec![1u8]));
        buf.extend_from_slice(&encode(Message::captured(vec![2u8, 2])));
        buf.extend_from_slice(&encode(Message::video(Vec::<u8>::new())));

        let mut codec = MessageCodec::new();
        let kinds: Vec<_> = std::iter::from_fn(|| codec.decode(&mut buf).unwrap())
            .map(|m| (m.kind, m.payload.len()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (MessageKind::VideoFrame, 1),
                (MessageKind::CapturedImage, 2),
                (MessageKind::VideoFrame, 0),
            ]
        );
    }

    #[test]
    fn unknown_tag_is_rejected() {
        let mut buf = BytesMut::from(&[0x09u8, 0, 0, 0, 0][..]);
        assert!(matches!(
            MessageCodec::new().decode(&mut buf),
            Err(StreamError::UnknownMessageKind(0x09))
        ));
    }

    #[test]
    fn oversized_length_is_rejected_before_buffering() {
        let mut buf = BytesMut::from(&[0x01u8, 0x00, 0x10, 0x00, 0x00][..]);
        let mut codec = MessageCodec::with_max_payload(1024);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(StreamError::PayloadTooLarge { size: 0x100000, max: 1024 })
        ));
    }
}
