//! Frame header encoding/decoding
//!
//! Every frame starts with an 8-byte header:
//! - stream_id: 4 bytes (u32, big-endian)
//! - message_type: 1 byte (u8)
//! - payload_length: 3 bytes (u24, big-endian, max 16MB)

use bytes::{Buf, BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::message::MessageType;
use crate::stream::StreamId;

/// Size of the frame header in bytes
pub const HEADER_SIZE: usize = 8;

/// Maximum payload size (16MB - 1, limited by 24-bit length field)
pub const MAX_PAYLOAD_SIZE: usize = 0x00FF_FFFF;

/// Frame header carrying the stream id and payload length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub stream_id: StreamId,
    pub message_type: MessageType,
    pub payload_length: u32,
}

impl FrameHeader {
    pub fn new(stream_id: StreamId, message_type: MessageType, payload_length: u32) -> Self {
        Self {
            stream_id,
            message_type,
            payload_length,
        }
    }

    /// Append the 8 header bytes to `dst`
    pub fn encode(&self, dst: &mut BytesMut) {
        let len = self.payload_length.to_be_bytes();
        dst.reserve(HEADER_SIZE);
        dst.put_u32(self.stream_id.as_u32());
        dst.put_u8(self.message_type.as_u8());
        dst.put_slice(&len[1..]);
    }

    /// Take a header off the front of `src`
    ///
    /// `Ok(None)` until 8 bytes are buffered. An unknown type byte is an
    /// error and leaves `src` untouched.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        let Some(raw) = src.get(..HEADER_SIZE) else {
            return Ok(None);
        };

        let message_type =
            MessageType::from_u8(raw[4]).ok_or(ProtocolError::UnknownMessageType(raw[4]))?;
        let stream_id = StreamId::new(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]));
        let payload_length = u32::from_be_bytes([0, raw[5], raw[6], raw[7]]);

        src.advance(HEADER_SIZE);
        Ok(Some(Self {
            stream_id,
            message_type,
            payload_length,
        }))
    }
}
