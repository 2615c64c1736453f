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
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::{ConnectionSession, Session};

/// Tracks every live connection and its application session.
///
/// Shared by all connection handlers.
#[derive(Debug)]
pub struct SessionService {
    next_session_id: AtomicU64,
    handler_sessions: DashMap<u64, Arc<ConnectionSession>>,
}

impl Default for SessionService {
    fn default() -> Self {
        SessionService::new()
    }
}

impl SessionService {
    pub fn new() -> Self {
        SessionService {
            next_session_id: AtomicU64::new(1),
            handler_sessions: DashMap::new(),
        }
    }

    /// Registers a freshly accepted connection whose outbound bytes go to `outbound`.
    pub fn create_handler_session(
        &self,
        peer_addr: SocketAddr,
        outbound: mpsc::Sender<Bytes>,
    ) -> Arc<ConnectionSession> {
        let id = self.next_session_id.fetch_add(1, Ordering::Relaxed);
        let session = Arc::new(Session::new(id, outbound));
        let fs = Arc::new(ConnectionSession::new(id, peer_addr, session));
        self.handler_sessions.insert(id, fs.clone());
        debug!("session {} created for {}", id, peer_addr);
        fs
    }

    /// Releases everything held for `session`.
    pub fn close_session(&self, session: &Session) -> Option<Arc<ConnectionSession>> {
        let removed = self.handler_sessions.remove(&session.id()).map(|(_, fs)| fs);
        if let Some(fs) = &removed {
            fs.close();
            debug!("session {} released", session.id());
        }
        removed
    }

    pub fn handler_session(&self, id: u64) -> Option<Arc<ConnectionSession>> {
        self.handler_sessions.get(&id).map(|entry| entry.value().clone())
    }

    pub fn session_count(&self) -> usize {
        self.handler_sessions.len()
    }

    pub fn dump_handler_sessions(&self) {
        info!("current session count: {}", self.handler_sessions.len());
        for entry in self.handler_sessions.iter() {
            let fs = entry.value();
            debug!(
                "session {} peer={} status={:?} uid={:?}",
                fs.id(),
                fs.peer_addr(),
                fs.status(),
                fs.session().uid()
            );
        }
    }
}
