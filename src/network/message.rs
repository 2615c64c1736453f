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

use bytes::{BufMut, Bytes, BytesMut};
use integer_encoding::VarInt;

use super::RouteDictionary;
use crate::{AppError, AppResult};

const TYPE_MASK: u8 = 0x07;
const ROUTE_COMPRESSED: u8 = 0x01;
const MAX_ROUTE_LENGTH: usize = u8::MAX as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Request = 0,
    Notify = 1,
    Response = 2,
    Push = 3,
}

impl MessageType {
    fn has_id(self) -> bool {
        matches!(self, MessageType::Request | MessageType::Response)
    }

    fn has_route(self) -> bool {
        matches!(
            self,
            MessageType::Request | MessageType::Notify | MessageType::Push
        )
    }
}

impl TryFrom<u8> for MessageType {
    type Error = AppError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageType::Request),
            1 => Ok(MessageType::Notify),
            2 => Ok(MessageType::Response),
            3 => Ok(MessageType::Push),
            other => Err(AppError::MalformedProtocol(format!(
                "unknown message type {}",
                other
            ))),
        }
    }
}

/// Application payload carried by a data packet.
///
/// Layout: one flag byte (`type << 1 | compressed`), a varint id for requests
/// and responses, a route for requests, notifies and pushes (either a
/// big-endian `u16` dictionary code or a length-prefixed string), then the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message_type: MessageType,
    pub id: u64,
    pub route: String,
    pub body: Bytes,
}

impl Message {
    pub fn request(id: u64, route: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Message {
            message_type: MessageType::Request,
            id,
            route: route.into(),
            body: body.into(),
        }
    }

    pub fn notify(route: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Message {
            message_type: MessageType::Notify,
            id: 0,
            route: route.into(),
            body: body.into(),
        }
    }

    pub fn response(id: u64, body: impl Into<Bytes>) -> Self {
        Message {
            message_type: MessageType::Response,
            id,
            route: String::new(),
            body: body.into(),
        }
    }

    pub fn push(route: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Message {
            message_type: MessageType::Push,
            id: 0,
            route: route.into(),
            body: body.into(),
        }
    }

    pub fn decode(data: &Bytes, dict: &RouteDictionary) -> AppResult<Message> {
        let flag = *data
            .first()
            .ok_or_else(|| AppError::MalformedProtocol("empty message".to_string()))?;
        let message_type = MessageType::try_from((flag >> 1) & TYPE_MASK)?;
        let compressed = flag & ROUTE_COMPRESSED == ROUTE_COMPRESSED;
        let mut offset = 1;

        let mut id = 0;
        if message_type.has_id() {
            let (value, read) = u64::decode_var(&data[offset..]).ok_or_else(|| {
                AppError::MalformedProtocol("truncated message id".to_string())
            })?;
            id = value;
            offset += read;
        }

        let mut route = String::new();
        if message_type.has_route() {
            if compressed {
                let code = data.get(offset..offset + 2).ok_or_else(|| {
                    AppError::MalformedProtocol("truncated route code".to_string())
                })?;
                let code = u16::from_be_bytes([code[0], code[1]]);
                route = dict
                    .route(code)
                    .ok_or_else(|| {
                        AppError::MalformedProtocol(format!("unknown route code {}", code))
                    })?
                    .to_string();
                offset += 2;
            } else {
                let len = *data.get(offset).ok_or_else(|| {
                    AppError::MalformedProtocol("missing route length".to_string())
                })? as usize;
                offset += 1;
                let raw = data.get(offset..offset + len).ok_or_else(|| {
                    AppError::MalformedProtocol("truncated route".to_string())
                })?;
                route = std::str::from_utf8(raw)
                    .map_err(|e| AppError::MalformedProtocol(format!("route is not utf-8: {}", e)))?
                    .to_string();
                offset += len;
            }
        }

        Ok(Message {
            message_type,
            id,
            route,
            body: data.slice(offset..),
        })
    }

    /// Encodes the message, compressing the route when `dict` knows it.
    pub fn encode(&self, dict: Option<&RouteDictionary>) -> AppResult<Bytes> {
        let code = if self.message_type.has_route() {
            dict.and_then(|dict| dict.code(&self.route))
        } else {
            None
        };
        let mut buf = BytesMut::with_capacity(1 + 10 + 1 + self.route.len() + self.body.len());
        let mut flag = (self.message_type as u8) << 1;
        if code.is_some() {
            flag |= ROUTE_COMPRESSED;
        }
        buf.put_u8(flag);
        if self.message_type.has_id() {
            buf.put_slice(&self.id.encode_var_vec());
        }
        if self.message_type.has_route() {
            match code {
                Some(code) => buf.put_u16(code),
                None => {
                    if self.route.len() > MAX_ROUTE_LENGTH {
                        return Err(AppError::InvalidValue(format!(
                            "route too long: {}",
                            self.route
                        )));
                    }
                    buf.put_u8(self.route.len() as u8);
                    buf.put_slice(self.route.as_bytes());
                }
            }
        }
        buf.put_slice(&self.body);
        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_request() {
        let mut raw = vec![0u8];
        raw.extend_from_slice(&300u64.encode_var_vec());
        raw.push(14);
        raw.extend_from_slice(b"chat.Room.Join");
        raw.extend_from_slice(b"{\"name\":\"x\"}");
        let message = Message::decode(&Bytes::from(raw), &RouteDictionary::default()).unwrap();
        assert_eq!(message.message_type, MessageType::Request);
        assert_eq!(message.id, 300);
        assert_eq!(message.route, "chat.Room.Join");
        assert_eq!(&message.body[..], b"{\"name\":\"x\"}");
    }

    #[test]
    fn test_decode_notify_has_no_id() {
        let raw = Bytes::from_static(b"\x02\x0echat.Room.Chatpayload");
        let message = Message::decode(&raw, &RouteDictionary::default()).unwrap();
        assert_eq!(message.message_type, MessageType::Notify);
        assert_eq!(message.id, 0);
        assert_eq!(message.route, "chat.Room.Chat");
        assert_eq!(&message.body[..], b"payload");
    }

    #[test]
    fn test_compressed_route() {
        let mut dict = RouteDictionary::default();
        dict.insert("chat.Room.Join").unwrap();
        let message = Message::request(7, "chat.Room.Join", &b"body"[..]);
        let encoded = message.encode(Some(&dict)).unwrap();
        assert_eq!(encoded[0] & ROUTE_COMPRESSED, ROUTE_COMPRESSED);
        assert_eq!(Message::decode(&encoded, &dict).unwrap(), message);

        // a peer that does not know the code cannot decode it
        assert!(Message::decode(&encoded, &RouteDictionary::default()).is_err());
    }

    #[test]
    fn test_response_has_no_route() {
        let encoded = Message::response(9, &b"ok"[..]).encode(None).unwrap();
        assert_eq!(&encoded[..], b"\x04\x09ok");
    }

    #[test]
    fn test_decode_truncated() {
        let dict = RouteDictionary::default();
        for raw in [
            &b""[..],
            &b"\x00"[..],
            &b"\x00\x80"[..],
            &b"\x00\x01"[..],
            &b"\x00\x01\x05abc"[..],
            &b"\x03\x00\x01"[..],
            &b"\x0e"[..],
        ] {
            assert!(
                Message::decode(&Bytes::copy_from_slice(raw), &dict).is_err(),
                "{:?} should not decode",
                raw
            );
        }
    }
}
