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

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use super::component::{is_exported, service_name, HandlerComponent, MethodSet, MethodShape};
use crate::network::{RouteDictionary, RouteInfo};
use crate::session::Session;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistrationError {
    #[error("no service name for type {0}")]
    EmptyName(String),

    #[error("type {0} is not exported")]
    NotExported(String),

    #[error("service already defined: {0}")]
    Duplicate(String),

    #[error(
        "type {0} has no exported methods of suitable type \
         (hint: methods take &mut self, handlers are shared so take &self and use interior mutability)"
    )]
    ExclusiveReceiver(String),

    #[error("type {0} has no exported methods of suitable type")]
    NoSuitableMethods(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    #[error("service: {0} not found")]
    ServiceNotFound(String),

    #[error("method: {service}.{method} not found")]
    MethodNotFound { service: String, method: String },

    #[error("handler {route} panicked: {message}")]
    HandlerPanicked { route: String, message: String },
}

type MethodFn = Box<dyn Fn(&Arc<Session>, Bytes) + Send + Sync>;

struct MethodType {
    func: MethodFn,
    num_calls: AtomicU64,
}

struct Service {
    type_name: &'static str,
    methods: HashMap<String, Arc<MethodType>>,
}

/// Registry of handler services, keyed by service name.
///
/// Registration normally completes before traffic starts but stays safe to
/// call afterwards; lookups only hold the read lock while cloning the method.
pub struct HandlerService {
    server_type: String,
    service_map: RwLock<HashMap<String, Service>>,
    route_dict: RwLock<RouteDictionary>,
}

impl fmt::Debug for HandlerService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerService")
            .field("server_type", &self.server_type)
            .field("routes", &self.routes())
            .finish()
    }
}

impl HandlerService {
    /// Creates an empty registry for a node of category `server_type`.
    pub fn new(server_type: impl Into<String>) -> Self {
        HandlerService {
            server_type: server_type.into(),
            service_map: RwLock::new(HashMap::new()),
            route_dict: RwLock::new(RouteDictionary::default()),
        }
    }

    pub fn server_type(&self) -> &str {
        &self.server_type
    }

    /// Runs the handler's setup hook, then publishes its suitable methods.
    pub fn register<H: HandlerComponent>(&self, mut handler: H) -> Result<(), RegistrationError> {
        handler.setup();
        self.register_component(handler)
    }

    fn register_component<H: HandlerComponent>(&self, handler: H) -> Result<(), RegistrationError> {
        let (sname, type_name) = service_name::<H>();
        if sname.is_empty() {
            return Err(RegistrationError::EmptyName(type_name.to_string()));
        }
        if !is_exported(sname) {
            return Err(RegistrationError::NotExported(sname.to_string()));
        }
        if self.service_map.read().contains_key(sname) {
            return Err(RegistrationError::Duplicate(sname.to_string()));
        }

        let mut candidates = MethodSet::<H>::default();
        H::methods(&mut candidates);

        let receiver = Arc::new(handler);
        let mut methods = HashMap::new();
        let mut has_exclusive = false;
        for (mname, shape) in candidates.candidates {
            if !is_exported(mname) {
                debug!("skip method {}.{}: not exported", sname, mname);
                continue;
            }
            match shape {
                MethodShape::Handler(method) => {
                    let receiver = receiver.clone();
                    let func: MethodFn = Box::new(move |session: &Arc<Session>, body: Bytes| {
                        method(&*receiver, session, body)
                    });
                    methods.insert(
                        mname.to_string(),
                        Arc::new(MethodType {
                            func,
                            num_calls: AtomicU64::new(0),
                        }),
                    );
                }
                other => {
                    has_exclusive |= matches!(other, MethodShape::Exclusive(_));
                    debug!(
                        "skip method {}.{}: unsuitable signature {}",
                        sname,
                        mname,
                        other.describe()
                    );
                }
            }
        }

        if methods.is_empty() {
            return Err(if has_exclusive {
                RegistrationError::ExclusiveReceiver(sname.to_string())
            } else {
                RegistrationError::NoSuitableMethods(sname.to_string())
            });
        }

        let mut service_map = self.service_map.write();
        // re-checked under the write lock, a concurrent registration may have won
        if service_map.contains_key(sname) {
            return Err(RegistrationError::Duplicate(sname.to_string()));
        }
        {
            let mut route_dict = self.route_dict.write();
            // codes follow method name order so every node of a server type agrees
            let mut names: Vec<&String> = methods.keys().collect();
            names.sort();
            for mname in names {
                let route = format!("{}.{}.{}", self.server_type, sname, mname);
                if let Err(e) = route_dict.insert(route) {
                    warn!("route {}.{} stays uncompressed: {}", sname, mname, e);
                }
            }
        }
        service_map.insert(
            sname.to_string(),
            Service {
                type_name,
                methods,
            },
        );
        drop(service_map);

        self.dump_service_map();
        Ok(())
    }

    /// Invokes `route.service`.`route.method` with the session and body.
    ///
    /// A panicking handler is contained here so the caller's processing task survives.
    pub fn local_process(
        &self,
        session: &Arc<Session>,
        route: &RouteInfo,
        body: Bytes,
    ) -> Result<(), DispatchError> {
        let method = {
            let service_map = self.service_map.read();
            let service = service_map
                .get(&route.service)
                .ok_or_else(|| DispatchError::ServiceNotFound(route.service.clone()))?;
            service
                .methods
                .get(&route.method)
                .cloned()
                .ok_or_else(|| DispatchError::MethodNotFound {
                    service: route.service.clone(),
                    method: route.method.clone(),
                })?
        };

        method.num_calls.fetch_add(1, Ordering::Relaxed);
        panic::catch_unwind(AssertUnwindSafe(|| (method.func)(session, body))).map_err(|payload| {
            DispatchError::HandlerPanicked {
                route: route.to_string(),
                message: panic_message(payload.as_ref()),
            }
        })
    }

    /// How many times a method has been dispatched, `None` if it is not registered.
    pub fn num_calls(&self, service: &str, method: &str) -> Option<u64> {
        let service_map = self.service_map.read();
        service_map
            .get(service)?
            .methods
            .get(method)
            .map(|m| m.num_calls.load(Ordering::Relaxed))
    }

    /// All registered `Service.Method` pairs, sorted.
    pub fn routes(&self) -> Vec<String> {
        let service_map = self.service_map.read();
        let mut routes: Vec<String> = service_map
            .iter()
            .flat_map(|(sname, service)| {
                service
                    .methods
                    .keys()
                    .map(move |mname| format!("{}.{}", sname, mname))
            })
            .collect();
        routes.sort();
        routes
    }

    pub fn route_dict(&self) -> RwLockReadGuard<'_, RouteDictionary> {
        self.route_dict.read()
    }

    pub fn dump_service_map(&self) {
        let service_map = self.service_map.read();
        for (sname, service) in service_map.iter() {
            for mname in service.methods.keys() {
                info!(
                    "registered service: {}.{} ({})",
                    sname, mname, service.type_name
                );
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
