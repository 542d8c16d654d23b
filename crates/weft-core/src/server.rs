// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Inbound request server.
//!
//! Routes each inbound request either to the factory-scoped router (no
//! `taskQueue` in the batch context) or to the worker owning the named
//! task queue, and guarantees exactly one response per request lands in
//! the queue — also when a handler raises.

use std::sync::Arc;

use tracing::{debug, warn};

use weft_protocol::{Command, JsonMap, Request, Response, TASK_QUEUE_HEADER};

use crate::error::WorkerError;
use crate::queue::ResponseQueue;
use crate::registry::TaskQueueRegistry;
use crate::router::Router;
use crate::worker::DispatchOutcome;

/// Server side of the command channel.
pub struct Server {
    registry: Arc<TaskQueueRegistry>,
    router: Arc<Router>,
    queue: ResponseQueue,
}

impl Server {
    pub fn new(
        registry: Arc<TaskQueueRegistry>,
        router: Arc<Router>,
        queue: ResponseQueue,
    ) -> Self {
        Self {
            registry,
            router,
            queue,
        }
    }

    /// Route an inbound request and enqueue its response.
    pub fn dispatch(&self, request: Request, context: &JsonMap) {
        let id = request.id;
        let outcome = self.route(request, context);
        if let DispatchOutcome::Reply(result) = outcome {
            self.queue.push(Command::Response(Response { id, result }));
        }
    }

    fn route(&self, request: Request, context: &JsonMap) -> DispatchOutcome {
        match context.get(TASK_QUEUE_HEADER) {
            None => {
                debug!(id = request.id, kind = %request.name, "factory-scoped request");
                DispatchOutcome::Reply(self.router.dispatch(&request))
            }
            Some(serde_json::Value::String(task_queue)) => {
                match self.registry.get(task_queue) {
                    Some(worker) => worker.dispatch(request),
                    None => {
                        warn!(task_queue = %task_queue, "request for unregistered task queue");
                        DispatchOutcome::Reply(Err(WorkerError::NotFound(format!(
                            "task queue {}",
                            task_queue
                        ))
                        .to_failure()))
                    }
                }
            }
            Some(other) => DispatchOutcome::Reply(Err(WorkerError::InvalidArgument(format!(
                "taskQueue header must be a string, got {}",
                other
            ))
            .to_failure())),
        }
    }
}
