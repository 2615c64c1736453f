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

//! Connection handling and message routing core of a distributed game server.
//!
//! Clients speak a small packet protocol over TCP: a handshake that advertises
//! the heartbeat interval and the route dictionary, heartbeats, and data
//! packets carrying request/notify messages addressed by
//! `<server_type>.<Service>.<Method>` routes. Messages for this node's server
//! type are dispatched to registered handlers, the rest go to the RPC layer.

pub mod handler;
pub mod network;
pub mod rpc;
pub mod service;
pub mod session;

pub use handler::{HandlerComponent, HandlerService, MethodSet, MethodShape, RegistrationError};
pub use service::{
    setup_local_tracing, setup_tracing, AppError, AppResult, Node, ServerConfig, ServerContext,
};
pub use session::Session;
