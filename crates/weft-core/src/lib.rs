// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Weft Core - deterministic tick-driven worker runtime.
//!
//! The runtime connects to a host process over a framed message channel,
//! drives cooperative workflow and activity executions, and multiplexes
//! requests and responses across task queues.
//!
//! # Architecture
//!
//! ```text
//! HostConnection.wait_batch
//!         │
//!         ▼
//!   Codec.decode ──▶ per command ──▶ Server.dispatch (requests)
//!                                 └▶ Client.dispatch (responses)
//!         │
//!         ▼
//!   tick(): Signal ▸ Callback ▸ Query ▸ Tick
//!         │
//!         ▼
//!   Codec.encode(ResponseQueue) ──▶ HostConnection.send
//! ```
//!
//! Everything observable to workflow code between two suspension points
//! is deterministic given the same inbound command sequence: commands are
//! processed in delivery order, continuations run in a fixed order at the
//! `Callback` stage, and the outbound batch reflects append order
//! exactly.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use weft_core::{FactoryConfig, WorkerFactory, JsonConverter, NoopRpc};
//! use weft_core::reader::HandlerDeclaration;
//!
//! let factory = WorkerFactory::new(
//!     FactoryConfig::from_env(),
//!     Arc::new(JsonConverter),
//!     Arc::new(NoopRpc),
//! );
//! let worker = factory.new_worker("default")?;
//! worker.register_workflow(HandlerDeclaration::of_type("MyWorkflow"), || MyWorkflow::new());
//!
//! let exit = factory.run(&mut host)?;
//! ```

pub mod activity;
pub mod client;
pub mod config;
pub mod convert;
pub mod error;
pub mod events;
pub mod factory;
pub mod queue;
pub mod reader;
pub mod registry;
pub mod router;
pub mod rpc;
pub mod server;
pub mod worker;
pub mod workflow;

pub use activity::{Activity, ActivityContext, activity_fn};
pub use client::Client;
pub use config::FactoryConfig;
pub use convert::{ConvertError, DataConverter, JsonConverter, from_payload, to_payload};
pub use error::{Result, WorkerError};
pub use events::{EventBus, LifecycleEvent, TICK_ORDER};
pub use factory::WorkerFactory;
pub use queue::ResponseQueue;
pub use reader::{HandlerDeclaration, HandlerInfo, MetadataReader, ReaderMode};
pub use registry::TaskQueueRegistry;
pub use router::{GET_WORKER_INFO, Router};
pub use rpc::{NoopRpc, RpcConnection, RpcError};
pub use server::Server;
pub use worker::{Worker, WorkerInfo};
pub use workflow::{
    ExecutionStatus, Workflow, WorkflowContext, WorkflowExecution, WorkflowTransition,
};

use std::sync::{Mutex, MutexGuard};

/// Lock a mutex, recovering the data if a panicking holder poisoned it.
/// The runtime is single-writer, so a poisoned lock still holds
/// consistent state.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
