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

//! Seam towards the RPC layer that carries messages to other nodes.
//!
//! Delivery, retries and backoff belong to the transport; the router hands a
//! request over and moves on.

use std::sync::Arc;

use async_channel::TrySendError;
use bytes::Bytes;
use tracing::{trace, warn};

use crate::network::RouteInfo;
use crate::session::Session;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcKind {
    /// system call forwarded on behalf of a client
    Sys,
    /// call issued by user code on another node
    User,
}

pub trait RemoteTransport: Send + Sync {
    /// Fire-and-forget delivery of `body` to the node serving `route`.
    fn request(&self, kind: RpcKind, route: &RouteInfo, session: &Arc<Session>, body: Bytes);
}

/// A request handed to the RPC layer.
#[derive(Debug, Clone)]
pub struct RpcRequest {
    pub kind: RpcKind,
    pub route: RouteInfo,
    pub session: Arc<Session>,
    /// pending request id of the session when the request was forwarded
    pub req_id: u64,
    pub body: Bytes,
}

/// Transport that queues requests for an RPC client running elsewhere in
/// the process. Requests are dropped with a warning when the queue is full.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    request_tx: async_channel::Sender<RpcRequest>,
}

impl ChannelTransport {
    pub fn bounded(capacity: usize) -> (ChannelTransport, async_channel::Receiver<RpcRequest>) {
        let (request_tx, request_rx) = async_channel::bounded(capacity);
        (ChannelTransport { request_tx }, request_rx)
    }
}

impl RemoteTransport for ChannelTransport {
    fn request(&self, kind: RpcKind, route: &RouteInfo, session: &Arc<Session>, body: Bytes) {
        let request = RpcRequest {
            kind,
            route: route.clone(),
            session: session.clone(),
            req_id: session.req_id(),
            body,
        };
        match self.request_tx.try_send(request) {
            Ok(()) => trace!("forwarded {} for session {}", route, session.id()),
            Err(TrySendError::Full(request)) => {
                warn!(
                    "rpc queue full, drop {} for session {}",
                    request.route,
                    request.session.id()
                );
            }
            Err(TrySendError::Closed(request)) => {
                warn!(
                    "rpc queue closed, drop {} for session {}",
                    request.route,
                    request.session.id()
                );
            }
        }
    }
}
