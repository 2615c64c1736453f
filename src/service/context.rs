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
use std::sync::Arc;

use super::{AppError, AppResult, ServerConfig};
use crate::handler::{HandlerService, MessageRouter};
use crate::rpc::RemoteTransport;
use crate::session::SessionService;

/// Everything a connection handler needs, built once at startup and shared
/// by reference with every connection.
pub struct ServerContext {
    config: Arc<ServerConfig>,
    sessions: SessionService,
    router: MessageRouter,
}

impl ServerContext {
    pub fn new(
        config: ServerConfig,
        handlers: Arc<HandlerService>,
        remote: Arc<dyn RemoteTransport>,
    ) -> AppResult<Self> {
        if handlers.server_type() != config.general.server_type {
            return Err(AppError::InvalidValue(format!(
                "handlers registered for server type {} but this node is {}",
                handlers.server_type(),
                config.general.server_type
            )));
        }
        Ok(ServerContext {
            config: Arc::new(config),
            sessions: SessionService::new(),
            router: MessageRouter::new(handlers, remote),
        })
    }

    pub fn config(&self) -> &Arc<ServerConfig> {
        &self.config
    }

    pub fn sessions(&self) -> &SessionService {
        &self.sessions
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn handlers(&self) -> &Arc<HandlerService> {
        self.router.handlers()
    }
}

impl fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerContext")
            .field("server_id", &self.config.general.server_id)
            .field("server_type", &self.config.general.server_type)
            .field("sessions", &self.sessions.session_count())
            .finish()
    }
}
