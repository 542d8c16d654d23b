// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Worker factory and the tick-driven batch loop.
//!
//! The factory owns every other runtime piece and runs the loop:
//! wait for a batch, decode it, dispatch each command to the server
//! (inbound requests) or the client (inbound responses), emit the
//! lifecycle events, encode the drained response queue, send it back.
//! A failure anywhere inside one batch is reported through
//! `host.error` and the loop moves on; the loop itself only ends when
//! the host closes the stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, info};

use weft_protocol::{Batch, Codec, Command, HostConnection};

use crate::client::Client;
use crate::config::FactoryConfig;
use crate::convert::DataConverter;
use crate::error::{Result, WorkerError};
use crate::events::EventBus;
use crate::queue::ResponseQueue;
use crate::reader::MetadataReader;
use crate::registry::TaskQueueRegistry;
use crate::router::Router;
use crate::rpc::RpcConnection;
use crate::server::Server;
use crate::worker::{Shared, Worker};

/// Owns the runtime and drives the batch loop.
pub struct WorkerFactory {
    config: FactoryConfig,
    codec: &'static dyn Codec,
    shared: Arc<Shared>,
    registry: Arc<TaskQueueRegistry>,
    server: Server,
    bus: Arc<EventBus>,
    started: AtomicBool,
}

impl WorkerFactory {
    /// Build a factory from configuration, a data converter and an RPC
    /// connection.
    pub fn new(
        config: FactoryConfig,
        converter: Arc<dyn DataConverter>,
        rpc: Arc<dyn RpcConnection>,
    ) -> Self {
        let queue = ResponseQueue::new();
        let client = Client::new(queue.clone());
        let reader: Arc<dyn MetadataReader> = Arc::from(config.reader_mode.reader());
        let shared = Arc::new(Shared {
            client,
            queue: queue.clone(),
            converter: converter.clone(),
            rpc,
            reader,
        });
        let registry = Arc::new(TaskQueueRegistry::new());
        let router = Arc::new(Router::with_builtin_routes(registry.clone(), converter));
        let server = Server::new(registry.clone(), router, queue);

        Self {
            codec: config.codec.select(),
            config,
            shared,
            registry,
            server,
            bus: EventBus::new(),
            started: AtomicBool::new(false),
        }
    }

    /// Create and register a worker for a task queue.
    ///
    /// Must be called before [`run`](Self::run); worker stages are wired
    /// to the lifecycle bus here.
    pub fn new_worker(&self, task_queue: &str) -> Result<Arc<Worker>> {
        if self.started.load(Ordering::Relaxed) {
            return Err(WorkerError::IllegalState(
                "workers must be registered before run".to_string(),
            ));
        }
        let worker = Worker::new(task_queue.to_string(), self.shared.clone());
        self.registry.register(worker.clone())?;

        let w = worker.clone();
        self.bus
            .subscribe(crate::events::LifecycleEvent::Signal, move || {
                w.deliver_signals()
            });
        let w = worker.clone();
        self.bus
            .subscribe(crate::events::LifecycleEvent::Callback, move || {
                w.drive_callbacks()
            });
        let w = worker.clone();
        self.bus
            .subscribe(crate::events::LifecycleEvent::Query, move || {
                w.answer_queries()
            });
        let w = worker.clone();
        self.bus
            .subscribe(crate::events::LifecycleEvent::Tick, move || w.finish_tick());

        info!(task_queue = %task_queue, "worker created");
        Ok(worker)
    }

    /// Emit the lifecycle events in contractual order.
    pub fn tick(&self) {
        self.bus.emit_tick_sequence();
    }

    /// Run the batch loop until the host signals end-of-stream.
    pub fn run(&self, host: &mut dyn HostConnection) -> Result<i32> {
        self.started.store(true, Ordering::Relaxed);
        info!(codec = self.codec.name(), "worker factory running");
        loop {
            let Some(batch) = host.wait_batch()? else {
                info!("host closed the stream");
                return Ok(0);
            };
            if let Err(e) = self.process_batch(host, &batch) {
                error!(error = %e, "per-batch failure");
                host.error(&e.to_string());
                self.reset_tick_state();
            }
        }
    }

    fn process_batch(&self, host: &mut dyn HostConnection, batch: &Batch) -> Result<()> {
        let commands = self.codec.decode(&batch.messages)?;
        debug!(commands = commands.len(), "tick begin");
        for command in commands {
            match command {
                Command::Request(request) => self.server.dispatch(request, &batch.context),
                Command::Response(response) => self.shared.client.dispatch(response)?,
            }
        }
        self.tick();
        let outbound = self.shared.queue.drain();
        debug!(outbound = outbound.len(), "tick end");
        host.send(&self.codec.encode(&outbound)?)?;
        Ok(())
    }

    /// Restore the queue-empty invariant after a contained failure.
    fn reset_tick_state(&self) {
        self.shared.queue.drain();
        for worker in self.registry.workers() {
            worker.clear_stages();
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    pub fn client(&self) -> &Client {
        &self.shared.client
    }

    pub fn queue(&self) -> &ResponseQueue {
        &self.shared.queue
    }

    pub fn converter(&self) -> &Arc<dyn DataConverter> {
        &self.shared.converter
    }

    pub fn reader(&self) -> &Arc<dyn MetadataReader> {
        &self.shared.reader
    }

    pub fn registry(&self) -> &Arc<TaskQueueRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }
}
