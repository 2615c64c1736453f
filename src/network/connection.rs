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

use std::io::{self, ErrorKind};

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::Packet;
use crate::AppResult;

/// Read side of a client connection.
///
/// Bytes read from the socket accumulate in `buffer` until they form whole
/// packets; a packet split across reads stays buffered until its tail arrives.
#[derive(Debug)]
pub struct Connection<R> {
    reader: R,
    buffer: BytesMut,
    max_package_size: usize,
}

impl<R: AsyncRead + Unpin> Connection<R> {
    pub fn new(reader: R, buffer_size: usize, max_package_size: usize) -> Connection<R> {
        Connection {
            reader,
            buffer: BytesMut::with_capacity(buffer_size),
            max_package_size,
        }
    }

    /// Reads the next `Packet` from the connection.
    ///
    /// If the client closes the connection gracefully, `None` is returned.
    /// If the client closes the connection in the middle of a packet, or the
    /// packet exceeds the size limit, an error is returned and the connection
    /// should be closed.
    pub async fn read_packet(&mut self) -> AppResult<Option<Packet>> {
        loop {
            if let Some(packet) = Packet::parse(&mut self.buffer, self.max_package_size)? {
                return Ok(Some(packet));
            }
            if 0 == self.reader.read_buf(&mut self.buffer).await? {
                return if self.buffer.is_empty() {
                    Ok(None)
                } else {
                    Err(
                        io::Error::new(ErrorKind::ConnectionReset, "connection reset by peer")
                            .into(),
                    )
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::network::PacketType;
    use crate::AppError;

    #[tokio::test]
    async fn test_read_packets_across_writes() -> AppResult<()> {
        let (client, server) = tokio::io::duplex(64);
        let mut connection = Connection::new(server, 16, 1024);
        let writer = tokio::spawn(async move {
            let mut client = client;
            let mut bytes = Packet::encode(PacketType::Data, b"split body").unwrap().to_vec();
            bytes.extend_from_slice(&Packet::encode(PacketType::Heartbeat, b"").unwrap());
            for piece in bytes.chunks(3) {
                client.write_all(piece).await.unwrap();
                client.flush().await.unwrap();
            }
        });
        let first = connection.read_packet().await?.unwrap();
        assert_eq!(&first.body[..], b"split body");
        let second = connection.read_packet().await?.unwrap();
        assert_eq!(second.packet_type, PacketType::Heartbeat);
        writer.await.unwrap();
        assert!(connection.read_packet().await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_eof_inside_packet_is_error() {
        let (mut client, server) = tokio::io::duplex(64);
        let mut connection = Connection::new(server, 16, 1024);
        client.write_all(&[4u8, 0, 0, 8, 1, 2]).await.unwrap();
        drop(client);
        let result = connection.read_packet().await;
        assert!(matches!(result, Err(AppError::IoError(_))));
    }
}
