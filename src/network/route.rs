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

use crate::{AppError, AppResult};

/// A decoded route: `<server_type>.<service>.<method>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteInfo {
    pub server_type: String,
    pub service: String,
    pub method: String,
}

impl RouteInfo {
    pub fn new(
        server_type: impl Into<String>,
        service: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        RouteInfo {
            server_type: server_type.into(),
            service: service.into(),
            method: method.into(),
        }
    }

    /// Splits a route string into its three segments.
    ///
    /// Anything other than exactly three non-empty segments is rejected.
    pub fn decode(route: &str) -> AppResult<RouteInfo> {
        let mut parts = route.split('.');
        match (parts.next(), parts.next(), parts.next(), parts.next()) {
            (Some(server_type), Some(service), Some(method), None)
                if !server_type.is_empty() && !service.is_empty() && !method.is_empty() =>
            {
                Ok(RouteInfo::new(server_type, service, method))
            }
            _ => Err(AppError::MalformedProtocol(format!(
                "invalid route: {:?}",
                route
            ))),
        }
    }
}

impl fmt::Display for RouteInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.server_type, self.service, self.method)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[test]
    fn test_decode_route() {
        let route = RouteInfo::decode("chat.Room.Join").unwrap();
        assert_eq!(route, RouteInfo::new("chat", "Room", "Join"));
        assert_eq!(route.to_string(), "chat.Room.Join");
    }

    #[rstest]
    #[case("")]
    #[case("chat")]
    #[case("chat.Room")]
    #[case("chatRoomJoin")]
    #[case("chat.Room.Join.extra")]
    #[case(".Room.Join")]
    #[case("chat..Join")]
    #[case("chat.Room.")]
    fn test_decode_malformed_route(#[case] route: &str) {
        assert!(matches!(
            RouteInfo::decode(route),
            Err(AppError::MalformedProtocol(_))
        ));
    }
}
