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

use std::collections::HashMap;

use serde::Serialize;

use crate::{AppError, AppResult};

/// Two-way mapping between full route strings and the short codes clients may
/// send instead of them.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(transparent)]
pub struct RouteDictionary {
    codes: HashMap<String, u16>,
    #[serde(skip)]
    routes: HashMap<u16, String>,
}

impl RouteDictionary {
    /// Assigns the next free code to `route`, or returns the code it already has.
    pub fn insert(&mut self, route: impl Into<String>) -> AppResult<u16> {
        let route = route.into();
        if let Some(code) = self.codes.get(&route) {
            return Ok(*code);
        }
        let code = u16::try_from(self.codes.len() + 1).map_err(|_| {
            AppError::IllegalStateError(format!("route dictionary is full, cannot add {}", route))
        })?;
        self.routes.insert(code, route.clone());
        self.codes.insert(route, code);
        Ok(code)
    }

    pub fn code(&self, route: &str) -> Option<u16> {
        self.codes.get(route).copied()
    }

    pub fn route(&self, code: u16) -> Option<&str> {
        self.routes.get(&code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.codes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        let mut dict = RouteDictionary::default();
        let join = dict.insert("chat.Room.Join").unwrap();
        let leave = dict.insert("chat.Room.Leave").unwrap();
        assert_ne!(join, leave);
        assert_eq!(dict.insert("chat.Room.Join").unwrap(), join);
        assert_eq!(dict.route(leave), Some("chat.Room.Leave"));
        assert_eq!(dict.code("chat.Room.Kick"), None);
        assert_eq!(dict.len(), 2);
    }

    #[test]
    fn test_serializes_as_route_to_code_map() {
        let mut dict = RouteDictionary::default();
        dict.insert("chat.Room.Join").unwrap();
        let json = serde_json::to_value(&dict).unwrap();
        assert_eq!(json, serde_json::json!({"chat.Room.Join": 1}));
    }
}
