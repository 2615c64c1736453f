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

use bytes::Bytes;
use chrono::{DateTime, Local};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::network::{Message, Packet, PacketType};
use crate::{AppError, AppResult};

/// Request id value meaning "no request is waiting for a response".
pub const NO_PENDING_REQUEST: u64 = 0;

/// Logical client identity handed to handler methods.
///
/// Holds the id of the request currently being served so that `response`
/// can be correlated with it.
pub struct Session {
    id: u64,
    uid: RwLock<Option<String>>,
    req_id: AtomicU64,
    outbound: mpsc::Sender<Bytes>,
    created_at: DateTime<Local>,
}

impl Session {
    pub fn new(id: u64, outbound: mpsc::Sender<Bytes>) -> Self {
        Session {
            id,
            uid: RwLock::new(None),
            req_id: AtomicU64::new(NO_PENDING_REQUEST),
            outbound,
            created_at: Local::now(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn uid(&self) -> Option<String> {
        self.uid.read().clone()
    }

    /// Binds an authenticated user id to this session.
    pub fn bind(&self, uid: impl Into<String>) {
        *self.uid.write() = Some(uid.into());
    }

    pub fn created_at(&self) -> DateTime<Local> {
        self.created_at
    }

    pub fn req_id(&self) -> u64 {
        self.req_id.load(Ordering::Acquire)
    }

    pub fn set_req_id(&self, id: u64) {
        self.req_id.store(id, Ordering::Release);
    }

    pub fn clear_req_id(&self) {
        self.req_id.store(NO_PENDING_REQUEST, Ordering::Release);
    }

    /// Replies to the pending request.
    pub fn response(&self, body: impl Into<Bytes>) -> AppResult<()> {
        let id = self.req_id();
        if id == NO_PENDING_REQUEST {
            return Err(AppError::IllegalStateError(format!(
                "session {} has no pending request to respond to",
                self.id
            )));
        }
        let message = Message::response(id, body).encode(None)?;
        self.send(Packet::encode(PacketType::Data, &message)?)
    }

    /// Pushes an unsolicited message to the client.
    pub fn push(&self, route: impl Into<String>, body: impl Into<Bytes>) -> AppResult<()> {
        let message = Message::push(route, body).encode(None)?;
        self.send(Packet::encode(PacketType::Data, &message)?)
    }

    /// Queues encoded bytes on the connection's outbound queue without waiting.
    pub(crate) fn send(&self, data: Bytes) -> AppResult<()> {
        self.outbound.try_send(data).map_err(|e| match e {
            TrySendError::Full(_) => AppError::ChannelSendError(format!(
                "outbound queue of session {} is full",
                self.id
            )),
            TrySendError::Closed(_) => {
                AppError::ChannelSendError(format!("session {} is closed", self.id))
            }
        })
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("uid", &*self.uid.read())
            .field("req_id", &self.req_id())
            .finish()
    }
}
