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

use tracing::{debug, warn};

use super::HandlerService;
use crate::network::{Message, MessageType, RouteInfo};
use crate::rpc::{RemoteTransport, RpcKind};
use crate::session::{Session, NO_PENDING_REQUEST};

/// Sends decoded client messages to a local handler or to the node that serves them.
pub struct MessageRouter {
    server_type: String,
    handlers: Arc<HandlerService>,
    remote: Arc<dyn RemoteTransport>,
}

impl MessageRouter {
    pub fn new(handlers: Arc<HandlerService>, remote: Arc<dyn RemoteTransport>) -> Self {
        MessageRouter {
            server_type: handlers.server_type().to_string(),
            handlers,
            remote,
        }
    }

    pub fn handlers(&self) -> &Arc<HandlerService> {
        &self.handlers
    }

    /// Routes one message. Faults are logged and the message dropped.
    pub fn process_message(&self, session: &Arc<Session>, message: Message) {
        let route = match RouteInfo::decode(&message.route) {
            Ok(route) => route,
            Err(e) => {
                warn!("drop message from session {}: {}", session.id(), e);
                return;
            }
        };

        match message.message_type {
            // id 0 is reserved for "no pending request", such a request could never be answered
            MessageType::Request if message.id == NO_PENDING_REQUEST => {
                warn!(
                    "drop request with reserved id {} from session {} for {}",
                    message.id,
                    session.id(),
                    route
                );
                return;
            }
            MessageType::Request => session.set_req_id(message.id),
            MessageType::Notify => session.clear_req_id(),
            other => {
                warn!(
                    "invalid message type {:?} from session {} for {}",
                    other,
                    session.id(),
                    route
                );
                return;
            }
        }

        if route.server_type == self.server_type {
            debug!("local dispatch {} for session {}", route, session.id());
            if let Err(e) = self.handlers.local_process(session, &route, message.body) {
                warn!("drop message from session {}: {}", session.id(), e);
            }
        } else {
            debug!("remote dispatch {} for session {}", route, session.id());
            self.remote
                .request(RpcKind::Sys, &route, session, message.body);
        }
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;

    use super::*;
    use crate::handler::{HandlerComponent, MethodSet};
    use crate::rpc::{ChannelTransport, RpcRequest};

    struct Room {
        calls: Arc<Mutex<Vec<(u64, u64, Bytes)>>>,
    }

    impl Room {
        fn join(&self, session: &Arc<Session>, body: Bytes) {
            self.calls.lock().push((session.id(), session.req_id(), body));
        }
    }

    impl HandlerComponent for Room {
        fn methods(methods: &mut MethodSet<Self>) {
            methods.handler("Join", Room::join);
        }
    }

    struct Fixture {
        router: MessageRouter,
        calls: Arc<Mutex<Vec<(u64, u64, Bytes)>>>,
        rpc_rx: async_channel::Receiver<RpcRequest>,
        session: Arc<Session>,
        _outbound: mpsc::Receiver<Bytes>,
    }

    fn fixture() -> Fixture {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let handlers = Arc::new(HandlerService::new("chat"));
        handlers
            .register(Room {
                calls: calls.clone(),
            })
            .unwrap();
        let (transport, rpc_rx) = ChannelTransport::bounded(8);
        let (tx, outbound) = mpsc::channel(8);
        Fixture {
            router: MessageRouter::new(handlers, Arc::new(transport)),
            calls,
            rpc_rx,
            session: Arc::new(Session::new(11, tx)),
            _outbound: outbound,
        }
    }

    #[test]
    fn test_local_request_invokes_method_once() {
        let f = fixture();
        f.router.process_message(
            &f.session,
            Message::request(7, "chat.Room.Join", Bytes::from_static(b"b")),
        );
        let calls = f.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (11, 7, Bytes::from_static(b"b")));
        assert!(f.rpc_rx.is_empty());
    }

    #[test]
    fn test_remote_request_is_forwarded_unchanged() {
        let f = fixture();
        f.router.process_message(
            &f.session,
            Message::request(8, "area.Room.Join", Bytes::from_static(b"payload")),
        );
        assert!(f.calls.lock().is_empty());
        assert_eq!(f.rpc_rx.len(), 1);
        let request = f.rpc_rx.try_recv().unwrap();
        assert_eq!(request.kind, RpcKind::Sys);
        assert_eq!(request.route, RouteInfo::new("area", "Room", "Join"));
        assert_eq!(request.req_id, 8);
        assert_eq!(&request.body[..], b"payload");
    }

    #[test]
    fn test_notify_clears_pending_request() {
        let f = fixture();
        f.session.set_req_id(5);
        f.router
            .process_message(&f.session, Message::notify("chat.Room.Join", Bytes::new()));
        assert_eq!(f.session.req_id(), 0);
        assert_eq!(f.calls.lock()[0].1, 0);
    }

    #[test]
    fn test_request_with_reserved_id_is_dropped() {
        let f = fixture();
        f.session.set_req_id(3);
        f.router.process_message(
            &f.session,
            Message::request(NO_PENDING_REQUEST, "chat.Room.Join", Bytes::new()),
        );
        f.router.process_message(
            &f.session,
            Message::request(NO_PENDING_REQUEST, "area.Room.Join", Bytes::new()),
        );
        assert!(f.calls.lock().is_empty());
        assert!(f.rpc_rx.is_empty());
        assert_eq!(f.session.req_id(), 3);
    }

    #[test]
    fn test_malformed_route_is_dropped() {
        let f = fixture();
        f.router
            .process_message(&f.session, Message::request(1, "chatRoomJoin", Bytes::new()));
        assert!(f.calls.lock().is_empty());
        assert!(f.rpc_rx.is_empty());
        assert_eq!(f.session.req_id(), 0);
    }

    #[test]
    fn test_response_from_client_is_dropped() {
        let f = fixture();
        let mut message = Message::response(4, Bytes::new());
        message.route = "chat.Room.Join".to_string();
        f.router.process_message(&f.session, message);
        assert!(f.calls.lock().is_empty());
        assert_eq!(f.session.req_id(), 0);
    }
}
