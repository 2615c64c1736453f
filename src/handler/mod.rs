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

//! Handler services and message routing.
//!
//! Handlers are registered once at startup under the name of their type and
//! expose methods shaped `fn(&self, &Arc<Session>, Bytes)`. The router sends
//! each client message either to one of those methods or to a remote node.

pub use component::{HandlerComponent, HandlerFn, MethodSet, MethodShape};
pub use handler_service::{DispatchError, HandlerService, RegistrationError};
pub use router::MessageRouter;

mod component;
mod handler_service;
mod router;
