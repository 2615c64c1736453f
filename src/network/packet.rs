// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::warn;

use crate::AppError::Incomplete;
use crate::{AppError, AppResult};

/// Size of the fixed packet header: one type byte and a 24-bit body length.
pub const HEAD_LENGTH: usize = 4;
/// Largest body length representable in the header.
pub const MAX_BODY_LENGTH: usize = (1 << 24) - 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Handshake = 1,
    HandshakeAck = 2,
    Heartbeat = 3,
    Data = 4,
}

impl TryFrom<u8> for PacketType {
    type Error = AppError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(PacketType::Handshake),
            2 => Ok(PacketType::HandshakeAck),
            3 => Ok(PacketType::Heartbeat),
            4 => Ok(PacketType::Data),
            other => Err(AppError::MalformedProtocol(format!(
                "unknown packet type {}",
                other
            ))),
        }
    }
}

/// One framed unit of the wire protocol.
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: PacketType,
    pub body: Bytes,
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("packet_type", &self.packet_type)
            .field("body_len", &self.body.len())
            .finish()
    }
}

impl Packet {
    pub fn new(packet_type: PacketType, body: impl Into<Bytes>) -> Self {
        Packet {
            packet_type,
            body: body.into(),
        }
    }

    /// Checks whether `buffer` starts with a whole packet and returns its body length.
    ///
    /// Never consumes bytes. Returns `Incomplete` while the header or the body is
    /// still partial, and reserves room for the missing body bytes so the next
    /// socket read can land in place.
    pub fn check(buffer: &mut BytesMut, max_package_size: usize) -> AppResult<usize> {
        if buffer.remaining() < HEAD_LENGTH {
            return Err(Incomplete);
        }
        let body_size = body_length(&buffer[1..HEAD_LENGTH]);
        if body_size > max_package_size {
            return Err(AppError::PacketTooLarge(format!(
                "packet of length {} exceeds limit {}",
                body_size, max_package_size
            )));
        }
        if buffer.remaining() < body_size + HEAD_LENGTH {
            buffer.reserve(body_size + HEAD_LENGTH - buffer.remaining());
            return Err(Incomplete);
        }
        Ok(body_size)
    }

    /// Extracts the next packet from the front of `buffer`.
    ///
    /// Returns `Ok(None)` when more bytes are needed, leaving the buffer intact.
    /// Frames carrying an unknown type tag are consumed and skipped so the
    /// stream stays aligned.
    pub fn parse(buffer: &mut BytesMut, max_package_size: usize) -> AppResult<Option<Packet>> {
        loop {
            let body_size = match Packet::check(buffer, max_package_size) {
                Ok(body_size) => body_size,
                Err(AppError::Incomplete) => return Ok(None),
                Err(e) => return Err(e),
            };
            let type_tag = buffer.get_u8();
            buffer.advance(HEAD_LENGTH - 1);
            let body = buffer.split_to(body_size).freeze();
            match PacketType::try_from(type_tag) {
                Ok(packet_type) => return Ok(Some(Packet { packet_type, body })),
                Err(e) => {
                    warn!("drop packet: {}", e);
                    continue;
                }
            }
        }
    }

    /// Encodes a packet into its wire form.
    pub fn encode(packet_type: PacketType, body: &[u8]) -> AppResult<Bytes> {
        if body.len() > MAX_BODY_LENGTH {
            return Err(AppError::PacketTooLarge(format!(
                "packet body of length {} cannot be encoded",
                body.len()
            )));
        }
        let mut buf = BytesMut::with_capacity(HEAD_LENGTH + body.len());
        buf.put_u8(packet_type as u8);
        let len = (body.len() as u32).to_be_bytes();
        buf.put_slice(&len[1..]);
        buf.put_slice(body);
        Ok(buf.freeze())
    }

    pub fn to_bytes(&self) -> AppResult<Bytes> {
        Packet::encode(self.packet_type, &self.body)
    }
}

fn body_length(bytes: &[u8]) -> usize {
    ((bytes[0] as usize) << 16) | ((bytes[1] as usize) << 8) | bytes[2] as usize
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const LIMIT: usize = 64 * 1024;

    fn sample_stream() -> Vec<u8> {
        let mut stream = Vec::new();
        stream.extend_from_slice(&Packet::encode(PacketType::Handshake, b"{\"sys\":{}}").unwrap());
        stream.extend_from_slice(&Packet::encode(PacketType::HandshakeAck, b"").unwrap());
        stream.extend_from_slice(&Packet::encode(PacketType::Heartbeat, b"").unwrap());
        stream.extend_from_slice(&Packet::encode(PacketType::Data, b"hello world").unwrap());
        stream.extend_from_slice(&Packet::encode(PacketType::Data, &[7u8; 300]).unwrap());
        stream
    }

    fn frame_in_chunks(stream: &[u8], chunk: usize) -> Vec<Packet> {
        let mut buffer = BytesMut::new();
        let mut packets = Vec::new();
        for piece in stream.chunks(chunk) {
            buffer.extend_from_slice(piece);
            while let Some(packet) = Packet::parse(&mut buffer, LIMIT).unwrap() {
                packets.push(packet);
            }
        }
        assert!(buffer.is_empty());
        packets
    }

    #[test]
    fn test_parse_incomplete_header_keeps_bytes() {
        let mut buffer = BytesMut::from(&[4u8, 0, 0][..]);
        assert!(Packet::parse(&mut buffer, LIMIT).unwrap().is_none());
        assert_eq!(&buffer[..], &[4u8, 0, 0]);
    }

    #[test]
    fn test_parse_incomplete_body_keeps_bytes() {
        let encoded = Packet::encode(PacketType::Data, b"abcdef").unwrap();
        let mut buffer = BytesMut::from(&encoded[..7]);
        assert!(Packet::parse(&mut buffer, LIMIT).unwrap().is_none());
        assert_eq!(buffer.len(), 7);
        buffer.extend_from_slice(&encoded[7..]);
        let packet = Packet::parse(&mut buffer, LIMIT).unwrap().unwrap();
        assert_eq!(packet, Packet::new(PacketType::Data, &b"abcdef"[..]));
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_parse_empty_body_packet() {
        let mut buffer = BytesMut::from(&Packet::encode(PacketType::Heartbeat, b"").unwrap()[..]);
        let packet = Packet::parse(&mut buffer, LIMIT).unwrap().unwrap();
        assert_eq!(packet.packet_type, PacketType::Heartbeat);
        assert!(packet.body.is_empty());
    }

    #[test]
    fn test_parse_leaves_tail() {
        let mut buffer = BytesMut::new();
        buffer.extend_from_slice(&Packet::encode(PacketType::Data, b"one").unwrap());
        buffer.extend_from_slice(&[4u8, 0, 0, 9, b't']);
        let packet = Packet::parse(&mut buffer, LIMIT).unwrap().unwrap();
        assert_eq!(&packet.body[..], b"one");
        assert!(Packet::parse(&mut buffer, LIMIT).unwrap().is_none());
        assert_eq!(&buffer[..], &[4u8, 0, 0, 9, b't']);
    }

    #[test]
    fn test_unknown_type_is_skipped() {
        let mut buffer = BytesMut::from(&[9u8, 0, 0, 2, 1, 2][..]);
        buffer.extend_from_slice(&Packet::encode(PacketType::Heartbeat, b"").unwrap());
        let packet = Packet::parse(&mut buffer, LIMIT).unwrap().unwrap();
        assert_eq!(packet.packet_type, PacketType::Heartbeat);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_oversized_packet_rejected() {
        let mut buffer = BytesMut::from(&[4u8, 0x01, 0x00, 0x00][..]);
        let result = Packet::parse(&mut buffer, 1024);
        assert!(matches!(result, Err(AppError::PacketTooLarge(_))));
    }

    #[rstest]
    #[case(1)]
    #[case(2)]
    #[case(3)]
    #[case(5)]
    #[case(17)]
    #[case(512)]
    fn test_framing_independent_of_chunking(#[case] chunk: usize) {
        let stream = sample_stream();
        let whole = frame_in_chunks(&stream, stream.len());
        assert_eq!(whole.len(), 5);
        assert_eq!(frame_in_chunks(&stream, chunk), whole);
    }

    #[test]
    fn test_encode_header_layout() {
        let encoded = Packet::encode(PacketType::Data, &[0u8; 0x010203]).unwrap();
        assert_eq!(&encoded[..4], &[4u8, 0x01, 0x02, 0x03]);
    }
}
