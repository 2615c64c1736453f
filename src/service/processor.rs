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

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, error, trace};

use super::ServerContext;
use crate::network::{Message, Packet, PacketType, RouteDictionary};
use crate::session::ConnectionSession;
use crate::AppResult;

const HANDSHAKE_OK: u16 = 200;

#[derive(Debug, Serialize)]
struct HandshakeSys<'a> {
    heartbeat: u64,
    dict: &'a RouteDictionary,
}

#[derive(Debug, Serialize)]
struct HandshakeResponse<'a> {
    code: u16,
    sys: HandshakeSys<'a>,
}

/// Drives the per-connection protocol: handshake, heartbeat and data packets.
pub struct PacketProcessor;

impl PacketProcessor {
    pub fn process_packet(ctx: &ServerContext, fs: &Arc<ConnectionSession>, packet: Packet) {
        trace!("session {} processing {:?}", fs.id(), packet);
        match packet.packet_type {
            PacketType::Handshake => {
                if !fs.handshake() {
                    debug!("session {} is closed, ignore handshake", fs.id());
                    return;
                }
                if let Err(e) = Self::send_handshake_response(ctx, fs) {
                    error!("session {} handshake response failed: {}", fs.id(), e);
                }
            }
            PacketType::HandshakeAck => {
                if !fs.handshake_ack() {
                    debug!("session {} is closed, ignore handshake ack", fs.id());
                }
            }
            PacketType::Heartbeat => {
                Self::refresh_liveness(fs);
            }
            PacketType::Data => {
                Self::refresh_liveness(fs);
                let decoded = {
                    let route_dict = ctx.handlers().route_dict();
                    Message::decode(&packet.body, &*route_dict)
                };
                match decoded {
                    Ok(message) => ctx.router().process_message(fs.session(), message),
                    Err(e) => debug!("session {} drop undecodable message: {}", fs.id(), e),
                }
            }
        }
    }

    // completion order relative to later packets is unspecified
    fn refresh_liveness(fs: &Arc<ConnectionSession>) {
        let fs = fs.clone();
        tokio::spawn(async move { fs.heartbeat() });
    }

    fn send_handshake_response(ctx: &ServerContext, fs: &ConnectionSession) -> AppResult<()> {
        let data = {
            let route_dict = ctx.handlers().route_dict();
            serde_json::to_vec(&HandshakeResponse {
                code: HANDSHAKE_OK,
                sys: HandshakeSys {
                    heartbeat: ctx.config().heartbeat.interval,
                    dict: &*route_dict,
                },
            })?
        };
        fs.send(Packet::encode(PacketType::Handshake, &data)?)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::{Bytes, BytesMut};
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    use super::*;
    use crate::handler::{HandlerComponent, HandlerService, MethodSet};
    use crate::rpc::ChannelTransport;
    use crate::session::{Session, SessionStatus};
    use crate::ServerConfig;

    struct Room {
        calls: Arc<Mutex<Vec<(u64, Bytes)>>>,
    }

    impl Room {
        fn join(&self, session: &Arc<Session>, body: Bytes) {
            self.calls.lock().push((session.req_id(), body));
        }
    }

    impl HandlerComponent for Room {
        fn methods(methods: &mut MethodSet<Self>) {
            methods.handler("Join", Room::join);
        }
    }

    fn context(calls: Arc<Mutex<Vec<(u64, Bytes)>>>) -> ServerContext {
        let mut config = ServerConfig::default();
        config.general.server_type = "chat".to_string();
        config.heartbeat.interval = 25;
        let handlers = Arc::new(HandlerService::new("chat"));
        handlers.register(Room { calls }).unwrap();
        let (transport, _rpc_rx) = ChannelTransport::bounded(1);
        ServerContext::new(config, handlers, Arc::new(transport)).unwrap()
    }

    fn next_packet(rx: &mut mpsc::Receiver<Bytes>) -> Packet {
        let mut raw = BytesMut::from(&rx.try_recv().unwrap()[..]);
        Packet::parse(&mut raw, 1024).unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_handshake_then_ack() {
        let ctx = context(Arc::default());
        let (tx, mut rx) = mpsc::channel(4);
        let fs = ctx
            .sessions()
            .create_handler_session("127.0.0.1:6000".parse().unwrap(), tx);

        PacketProcessor::process_packet(&ctx, &fs, Packet::new(PacketType::Handshake, Bytes::new()));
        assert_eq!(fs.status(), SessionStatus::Handshaking);
        let reply = next_packet(&mut rx);
        assert_eq!(reply.packet_type, PacketType::Handshake);
        let json: serde_json::Value = serde_json::from_slice(&reply.body).unwrap();
        assert_eq!(json["code"], 200);
        assert_eq!(json["sys"]["heartbeat"], 25);
        assert_eq!(json["sys"]["dict"]["chat.Room.Join"], 1);

        PacketProcessor::process_packet(&ctx, &fs, Packet::new(PacketType::HandshakeAck, Bytes::new()));
        assert_eq!(fs.status(), SessionStatus::Working);
    }

    #[tokio::test]
    async fn test_heartbeat_does_not_change_state() {
        let ctx = context(Arc::default());
        let (tx, mut rx) = mpsc::channel(4);
        let fs = ctx
            .sessions()
            .create_handler_session("127.0.0.1:6001".parse().unwrap(), tx);
        PacketProcessor::process_packet(&ctx, &fs, Packet::new(PacketType::Heartbeat, Bytes::new()));
        assert_eq!(fs.status(), SessionStatus::Handshaking);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_session_ignores_handshake() {
        let ctx = context(Arc::default());
        let (tx, mut rx) = mpsc::channel(4);
        let fs = ctx
            .sessions()
            .create_handler_session("127.0.0.1:6002".parse().unwrap(), tx);
        fs.close();
        PacketProcessor::process_packet(&ctx, &fs, Packet::new(PacketType::Handshake, Bytes::new()));
        PacketProcessor::process_packet(&ctx, &fs, Packet::new(PacketType::HandshakeAck, Bytes::new()));
        assert_eq!(fs.status(), SessionStatus::Closed);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_data_packet_dispatches() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let ctx = context(calls.clone());
        let (tx, _rx) = mpsc::channel(4);
        let fs = ctx
            .sessions()
            .create_handler_session("127.0.0.1:6003".parse().unwrap(), tx);

        let message = Message::request(7, "chat.Room.Join", Bytes::from_static(b"b"));
        let compressed = {
            let route_dict = ctx.handlers().route_dict();
            message.encode(Some(&*route_dict)).unwrap()
        };
        PacketProcessor::process_packet(&ctx, &fs, Packet::new(PacketType::Data, compressed));
        // undecodable bodies are dropped silently
        PacketProcessor::process_packet(&ctx, &fs, Packet::new(PacketType::Data, Bytes::from_static(b"\x0e")));

        assert_eq!(*calls.lock(), vec![(7, Bytes::from_static(b"b"))]);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(fs.idle_time() < Duration::from_secs(1));
    }
}
