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

//! Session tracking.
//!
//! A `ConnectionSession` exists for every live socket and carries the
//! protocol status; the `Session` it wraps is what handler methods see.

pub use connection_session::{ConnectionSession, SessionStatus};
pub use session::{Session, NO_PENDING_REQUEST};
pub use session_service::SessionService;

mod connection_session;
#[allow(clippy::module_inception)]
mod session;
mod session_service;
