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

use std::sync::Arc;

use bytes::Bytes;

use crate::session::Session;

/// Signature of a dispatchable handler method.
pub type HandlerFn<H> = fn(&H, &Arc<Session>, Bytes);

/// A public method of a handler type, described by its signature.
pub enum MethodShape<H> {
    /// `fn(&self, &Arc<Session>, Bytes)`, the only dispatchable shape
    Handler(HandlerFn<H>),
    /// `fn(&mut self, &Arc<Session>, Bytes)`, needs exclusive access to the handler
    Exclusive(fn(&mut H, &Arc<Session>, Bytes)),
    /// `fn(&self, &Arc<Session>)`, no body parameter
    SessionOnly(fn(&H, &Arc<Session>)),
    /// `fn(&self, Bytes)`, no session parameter
    BodyOnly(fn(&H, Bytes)),
}

impl<H> MethodShape<H> {
    pub(crate) fn describe(&self) -> &'static str {
        match self {
            MethodShape::Handler(_) => "fn(&self, &Arc<Session>, Bytes)",
            MethodShape::Exclusive(_) => "fn(&mut self, &Arc<Session>, Bytes)",
            MethodShape::SessionOnly(_) => "fn(&self, &Arc<Session>)",
            MethodShape::BodyOnly(_) => "fn(&self, Bytes)",
        }
    }
}

/// Method table a handler publishes at registration.
///
/// Names are the route segments clients use, e.g. `"Join"` for `chat.Room.Join`.
/// Only names starting with an uppercase letter are public.
pub struct MethodSet<H> {
    pub(crate) candidates: Vec<(&'static str, MethodShape<H>)>,
}

impl<H> Default for MethodSet<H> {
    fn default() -> Self {
        MethodSet {
            candidates: Vec::new(),
        }
    }
}

impl<H> MethodSet<H> {
    pub fn add(&mut self, name: &'static str, shape: MethodShape<H>) -> &mut Self {
        self.candidates.push((name, shape));
        self
    }

    /// Shorthand for `add(name, MethodShape::Handler(method))`.
    pub fn handler(&mut self, name: &'static str, method: HandlerFn<H>) -> &mut Self {
        self.add(name, MethodShape::Handler(method))
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

/// A handler object serving one service.
///
/// The service name is the handler's type name, so `struct Room` serves the
/// `Room` segment of `chat.Room.Join`. Handlers are shared between
/// connections once registered; state they mutate needs interior mutability.
pub trait HandlerComponent: Send + Sync + 'static {
    /// Called once, with exclusive access, right before registration.
    fn setup(&mut self) {}

    /// Lists the public methods of the handler.
    fn methods(methods: &mut MethodSet<Self>)
    where
        Self: Sized;
}

/// Whether `name` follows the public naming convention: starts with an uppercase letter.
pub(crate) fn is_exported(name: &str) -> bool {
    name.chars().next().is_some_and(char::is_uppercase)
}

/// Last path segment of the handler's type name, generics removed.
pub(crate) fn service_name<H>() -> (&'static str, &'static str) {
    let full = std::any::type_name::<H>();
    let path = full.split('<').next().unwrap_or_default();
    let name = path.rsplit("::").next().unwrap_or_default().trim();
    (name, full)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Lobby;
    #[allow(dead_code)]
    struct Wrapper<T>(T);

    #[test]
    fn test_service_name_from_type() {
        assert_eq!(service_name::<Lobby>().0, "Lobby");
        assert_eq!(service_name::<Wrapper<Lobby>>().0, "Wrapper");
        assert_eq!(service_name::<()>().0, "()");
    }

    #[test]
    fn test_is_exported() {
        assert!(is_exported("Join"));
        assert!(!is_exported("join"));
        assert!(!is_exported("_Join"));
        assert!(!is_exported(""));
    }
}
