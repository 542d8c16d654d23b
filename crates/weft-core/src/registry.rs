// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Task-queue registry.
//!
//! Maps task-queue names to workers. Names are unique and iteration is
//! in registration order, which is what `GetWorkerInfo` reports. Workers
//! are added at configuration time; the registry is never mutated during
//! a tick.

use std::sync::{Arc, Mutex};

use crate::error::{Result, WorkerError};
use crate::lock;
use crate::worker::Worker;

/// Insertion-ordered set of workers keyed by task-queue name.
#[derive(Default)]
pub struct TaskQueueRegistry {
    workers: Mutex<Vec<Arc<Worker>>>,
}

impl TaskQueueRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a worker. Fails if the task-queue name is already taken.
    pub fn register(&self, worker: Arc<Worker>) -> Result<()> {
        let mut workers = lock(&self.workers);
        if workers
            .iter()
            .any(|w| w.task_queue() == worker.task_queue())
        {
            return Err(WorkerError::InvalidArgument(format!(
                "task queue {} already registered",
                worker.task_queue()
            )));
        }
        workers.push(worker);
        Ok(())
    }

    /// Look up a worker by task-queue name.
    pub fn get(&self, task_queue: &str) -> Option<Arc<Worker>> {
        lock(&self.workers)
            .iter()
            .find(|w| w.task_queue() == task_queue)
            .cloned()
    }

    /// Snapshot of every worker, in registration order.
    pub fn workers(&self) -> Vec<Arc<Worker>> {
        lock(&self.workers).clone()
    }

    /// Registered task-queue names, in registration order.
    pub fn names(&self) -> Vec<String> {
        lock(&self.workers)
            .iter()
            .map(|w| w.task_queue().to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.workers).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.workers).is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Client;
    use crate::convert::JsonConverter;
    use crate::queue::ResponseQueue;
    use crate::reader::AttributeReader;
    use crate::rpc::NoopRpc;
    use crate::worker::Shared;

    fn worker(task_queue: &str) -> Arc<Worker> {
        let queue = ResponseQueue::new();
        let shared = Arc::new(Shared {
            client: Client::new(queue.clone()),
            queue,
            converter: Arc::new(JsonConverter),
            rpc: Arc::new(NoopRpc),
            reader: Arc::new(AttributeReader),
        });
        Worker::new(task_queue.to_string(), shared)
    }

    #[test]
    fn test_register_and_get() {
        let registry = TaskQueueRegistry::new();
        registry.register(worker("a")).unwrap();
        registry.register(worker("b")).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get("b").unwrap().task_queue(), "b");
        assert!(registry.get("c").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let registry = TaskQueueRegistry::new();
        registry.register(worker("a")).unwrap();
        let err = registry.register(worker("a")).unwrap_err();
        assert!(matches!(err, WorkerError::InvalidArgument(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_names_keep_registration_order() {
        let registry = TaskQueueRegistry::new();
        for name in ["zeta", "alpha", "mid"] {
            registry.register(worker(name)).unwrap();
        }
        assert_eq!(registry.names(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_empty_registry() {
        let registry = TaskQueueRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.names().is_empty());
    }
}
