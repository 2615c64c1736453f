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

//! Wire-level types of the client protocol.
//!
//! - `Packet`: framing of the raw byte stream into typed packets
//! - `Connection`: buffered read side of a client socket producing packets
//! - `Message`: application payload carried by data packets
//! - `RouteInfo` / `RouteDictionary`: route strings and their compressed codes

pub use connection::Connection;
pub use message::{Message, MessageType};
pub use packet::{Packet, PacketType, HEAD_LENGTH, MAX_BODY_LENGTH};
pub use route::RouteInfo;
pub use route_dict::RouteDictionary;

mod connection;
mod message;
mod packet;
mod route;
mod route_dict;
