// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Factory-scoped request router.
//!
//! Requests arriving without a `taskQueue` context entry are resolved
//! against this dispatch table. Handlers are registered at boot and
//! immutable thereafter.

use std::sync::Arc;

use tracing::trace;

use weft_protocol::{Request, ResponseResult};

use crate::convert::{DataConverter, to_payload};
use crate::error::WorkerError;
use crate::registry::TaskQueueRegistry;

/// Request kind answering the registered worker inventory.
pub const GET_WORKER_INFO: &str = "GetWorkerInfo";

type RouteHandler = Box<dyn Fn(&Request) -> ResponseResult + Send + Sync>;

/// Dispatch table keyed by request name.
#[derive(Default)]
pub struct Router {
    routes: Vec<(String, RouteHandler)>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Router with the built-in `GetWorkerInfo` route.
    pub fn with_builtin_routes(
        registry: Arc<TaskQueueRegistry>,
        converter: Arc<dyn DataConverter>,
    ) -> Self {
        let mut router = Self::new();
        router.add(GET_WORKER_INFO, move |_request| {
            let info: Vec<_> = registry.workers().iter().map(|w| w.info()).collect();
            to_payload(converter.as_ref(), &info)
                .map(|payload| vec![payload])
                .map_err(|e| WorkerError::from(e).to_failure())
        });
        router
    }

    /// Register a handler for a request kind. Boot-time only.
    pub fn add(
        &mut self,
        name: &str,
        handler: impl Fn(&Request) -> ResponseResult + Send + Sync + 'static,
    ) {
        self.routes.push((name.to_string(), Box::new(handler)));
    }

    /// Resolve a request against the table.
    pub fn dispatch(&self, request: &Request) -> ResponseResult {
        trace!(kind = %request.name, "router dispatch");
        match self
            .routes
            .iter()
            .find(|(name, _)| *name == request.name)
        {
            Some((_, handler)) => handler(request),
            None => Err(WorkerError::NotImplemented(format!(
                "request kind {}",
                request.name
            ))
            .to_failure()),
        }
    }

    /// Registered route names, in registration order.
    pub fn routes(&self) -> Vec<&str> {
        self.routes.iter().map(|(name, _)| name.as_str()).collect()
    }
}
