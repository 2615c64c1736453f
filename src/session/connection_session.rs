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

use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Local;

use super::Session;
use crate::AppResult;

/// Protocol state of a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionStatus {
    Handshaking = 1,
    Working = 2,
    Closed = 3,
}

impl From<u8> for SessionStatus {
    fn from(value: u8) -> Self {
        match value {
            1 => SessionStatus::Handshaking,
            2 => SessionStatus::Working,
            _ => SessionStatus::Closed,
        }
    }
}

/// Per-connection state, one per live socket.
///
/// Status changes only along HANDSHAKING -> WORKING and into CLOSED, which is
/// terminal.
#[derive(Debug)]
pub struct ConnectionSession {
    id: u64,
    peer_addr: SocketAddr,
    status: AtomicU8,
    last_heartbeat: AtomicI64,
    session: Arc<Session>,
}

impl ConnectionSession {
    pub(crate) fn new(id: u64, peer_addr: SocketAddr, session: Arc<Session>) -> Self {
        ConnectionSession {
            id,
            peer_addr,
            status: AtomicU8::new(SessionStatus::Handshaking as u8),
            last_heartbeat: AtomicI64::new(Local::now().timestamp_millis()),
            session,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus::from(self.status.load(Ordering::Acquire))
    }

    /// Client (re)started the handshake. Returns false once closed.
    pub fn handshake(&self) -> bool {
        self.transition(|current| match current {
            SessionStatus::Closed => None,
            _ => Some(SessionStatus::Handshaking),
        })
    }

    /// Client acknowledged the handshake. Only a handshaking connection starts working.
    pub fn handshake_ack(&self) -> bool {
        self.transition(|current| match current {
            SessionStatus::Handshaking | SessionStatus::Working => Some(SessionStatus::Working),
            SessionStatus::Closed => None,
        })
    }

    /// Marks the connection closed. Returns true only for the call that closed it.
    pub fn close(&self) -> bool {
        self.transition(|current| match current {
            SessionStatus::Closed => None,
            _ => Some(SessionStatus::Closed),
        })
    }

    fn transition<F>(&self, next: F) -> bool
    where
        F: Fn(SessionStatus) -> Option<SessionStatus>,
    {
        self.status
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                next(SessionStatus::from(current)).map(|status| status as u8)
            })
            .is_ok()
    }

    /// Refreshes the liveness timestamp.
    pub fn heartbeat(&self) {
        self.last_heartbeat
            .store(Local::now().timestamp_millis(), Ordering::Release);
    }

    /// Time elapsed since the last heartbeat or data packet.
    pub fn idle_time(&self) -> Duration {
        let elapsed = Local::now().timestamp_millis() - self.last_heartbeat.load(Ordering::Acquire);
        Duration::from_millis(elapsed.max(0) as u64)
    }

    pub fn send(&self, data: Bytes) -> AppResult<()> {
        self.session.send(data)
    }
}
