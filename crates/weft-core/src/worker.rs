// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Per-task-queue worker.
//!
//! A worker owns the workflow and activity handler tables for one task
//! queue and dispatches every request routed to it. Signal and query
//! requests are validated at dispatch and delivered at their lifecycle
//! stage; everything else resolves at dispatch time.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use weft_protocol::{Command, ErrorCode, Failure, Headers, JsonMap, Payload, Request, Response};

use crate::activity::{Activity, ActivityContext};
use crate::client::Client;
use crate::convert::{DataConverter, to_payload};
use crate::error::WorkerError;
use crate::lock;
use crate::queue::ResponseQueue;
use crate::reader::{HandlerDeclaration, HandlerInfo, MetadataReader};
use crate::rpc::RpcConnection;
use crate::workflow::{ExecutionOutcome, ExecutionStatus, Workflow, WorkflowExecution};

/// Inbound request kinds a worker understands.
pub mod requests {
    pub const START_WORKFLOW: &str = "StartWorkflow";
    pub const SIGNAL_WITH_START_WORKFLOW: &str = "SignalWithStartWorkflow";
    pub const SIGNAL_WORKFLOW: &str = "SignalWorkflow";
    pub const QUERY_WORKFLOW: &str = "QueryWorkflow";
    pub const CANCEL_WORKFLOW: &str = "CancelWorkflow";
    pub const TERMINATE_WORKFLOW: &str = "TerminateWorkflow";
    pub const CONTINUE_AS_NEW: &str = "ContinueAsNew";
    pub const INVOKE_ACTIVITY: &str = "InvokeActivity";
}

/// Outbound command kinds a worker emits.
pub mod commands {
    pub const COMPLETE_WORKFLOW: &str = "CompleteWorkflow";
    pub const FAIL_WORKFLOW: &str = "FailWorkflow";
}

/// Facilities shared between the factory and its workers.
///
/// Passed as an explicit context at construction instead of a
/// back-reference to the factory.
pub struct Shared {
    pub client: Client,
    pub queue: ResponseQueue,
    pub converter: Arc<dyn DataConverter>,
    pub rpc: Arc<dyn RpcConnection>,
    pub reader: Arc<dyn MetadataReader>,
}

/// A registered workflow type.
struct WorkflowDefinition {
    info: HandlerInfo,
    factory: Box<dyn Fn() -> Box<dyn Workflow> + Send + Sync>,
}

/// A registered activity type.
struct ActivityDefinition {
    info: HandlerInfo,
    handler: Arc<dyn Activity>,
}

/// Inventory reported by `GetWorkerInfo`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerInfo {
    #[serde(rename = "taskQueue")]
    pub task_queue: String,
    pub workflows: Vec<HandlerInfo>,
    pub activities: Vec<String>,
}

/// How a dispatched request was resolved.
pub(crate) enum DispatchOutcome {
    /// The caller should enqueue this result as the response.
    Reply(Result<Vec<Payload>, Failure>),
    /// The worker enqueued, or will enqueue, the response itself.
    Handled,
}

struct StagedSignal {
    /// Response obligation; `None` for the signal half of
    /// signal-with-start, which is answered by the started response.
    response_id: Option<u64>,
    workflow_id: String,
    name: String,
    args: Vec<Payload>,
}

struct StagedQuery {
    response_id: u64,
    workflow_id: String,
    name: String,
    args: Vec<Payload>,
}

#[derive(Default)]
struct WorkerInner {
    workflows: Vec<WorkflowDefinition>,
    activities: Vec<ActivityDefinition>,
    executions: BTreeMap<String, WorkflowExecution>,
    run_counter: u64,
    staged_signals: Vec<StagedSignal>,
    staged_queries: Vec<StagedQuery>,
}

/// One worker per task queue.
pub struct Worker {
    task_queue: String,
    shared: Arc<Shared>,
    inner: Mutex<WorkerInner>,
}

impl Worker {
    pub(crate) fn new(task_queue: String, shared: Arc<Shared>) -> Arc<Self> {
        Arc::new(Self {
            task_queue,
            shared,
            inner: Mutex::new(WorkerInner::default()),
        })
    }

    pub fn task_queue(&self) -> &str {
        &self.task_queue
    }

    /// Register a workflow type. The declaration goes through the
    /// factory's metadata reader.
    pub fn register_workflow<W, F>(&self, declaration: HandlerDeclaration, factory: F)
    where
        W: Workflow + 'static,
        F: Fn() -> W + Send + Sync + 'static,
    {
        let info = self.shared.reader.read(&declaration);
        debug!(task_queue = %self.task_queue, workflow = %info.name, "workflow registered");
        lock(&self.inner).workflows.push(WorkflowDefinition {
            info,
            factory: Box::new(move || Box::new(factory())),
        });
    }

    /// Register an activity type.
    pub fn register_activity(&self, declaration: HandlerDeclaration, handler: Arc<dyn Activity>) {
        let info = self.shared.reader.read(&declaration);
        debug!(task_queue = %self.task_queue, activity = %info.name, "activity registered");
        lock(&self.inner)
            .activities
            .push(ActivityDefinition { info, handler });
    }

    /// Registered type inventory, in registration order.
    pub fn info(&self) -> WorkerInfo {
        let inner = lock(&self.inner);
        WorkerInfo {
            task_queue: self.task_queue.clone(),
            workflows: inner.workflows.iter().map(|d| d.info.clone()).collect(),
            activities: inner
                .activities
                .iter()
                .map(|d| d.info.name.clone())
                .collect(),
        }
    }

    /// Lifecycle status of an execution, if known.
    pub fn execution_status(&self, workflow_id: &str) -> Option<ExecutionStatus> {
        lock(&self.inner)
            .executions
            .get(workflow_id)
            .map(|e| e.status())
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    pub(crate) fn dispatch(&self, request: Request) -> DispatchOutcome {
        trace!(task_queue = %self.task_queue, id = request.id, kind = %request.name, "dispatch");
        match request.name.as_str() {
            requests::START_WORKFLOW => self.handle_start(request, None),
            requests::SIGNAL_WITH_START_WORKFLOW => self.handle_signal_with_start(request),
            requests::SIGNAL_WORKFLOW => self.stage_signal(request),
            requests::QUERY_WORKFLOW => self.stage_query(request),
            requests::CANCEL_WORKFLOW => self.handle_cancel(request),
            requests::TERMINATE_WORKFLOW => self.handle_terminate(request),
            requests::CONTINUE_AS_NEW => self.handle_continue_as_new(request),
            requests::INVOKE_ACTIVITY => self.handle_activity(request),
            other => DispatchOutcome::Reply(Err(WorkerError::NotImplemented(format!(
                "request kind {}",
                other
            ))
            .to_failure())),
        }
    }

    fn workflow_id_of(request: &Request) -> Result<String, Failure> {
        request
            .option_str("workflowId")
            .map(str::to_string)
            .ok_or_else(|| {
                WorkerError::InvalidArgument("options.workflowId is required".to_string())
                    .to_failure()
            })
    }

    fn handler_name_of(request: &Request) -> Result<String, Failure> {
        request.option_str("name").map(str::to_string).ok_or_else(|| {
            WorkerError::InvalidArgument("options.name is required".to_string()).to_failure()
        })
    }

    fn started_payload(&self, workflow_id: &str, run_id: &str) -> Result<Payload, Failure> {
        to_payload(
            self.shared.converter.as_ref(),
            &serde_json::json!({ "workflowId": workflow_id, "runId": run_id }),
        )
        .map_err(|e| WorkerError::from(e).to_failure())
    }

    fn handle_start(
        &self,
        request: Request,
        signal: Option<(String, Vec<Payload>)>,
    ) -> DispatchOutcome {
        let workflow_id = match Self::workflow_id_of(&request) {
            Ok(id) => id,
            Err(failure) => return DispatchOutcome::Reply(Err(failure)),
        };
        let workflow_type = match Self::handler_name_of(&request) {
            Ok(name) => name,
            Err(failure) => return DispatchOutcome::Reply(Err(failure)),
        };

        let mut inner = lock(&self.inner);
        if inner.executions.contains_key(&workflow_id) {
            return DispatchOutcome::Reply(Err(WorkerError::AlreadyStarted(workflow_id)
                .to_failure()));
        }
        let handler = match inner
            .workflows
            .iter()
            .find(|d| d.info.name == workflow_type)
        {
            Some(def) => (def.factory)(),
            None => {
                return DispatchOutcome::Reply(Err(WorkerError::NotFound(format!(
                    "workflow type {}",
                    workflow_type
                ))
                .to_failure()));
            }
        };

        let run_id = match request.option_str("runId") {
            Some(run_id) => run_id.to_string(),
            None => {
                inner.run_counter += 1;
                format!("{}-run-{}", workflow_id, inner.run_counter)
            }
        };

        let started = match self.started_payload(&workflow_id, &run_id) {
            Ok(payload) => payload,
            Err(failure) => return DispatchOutcome::Reply(Err(failure)),
        };
        // The started acknowledgement precedes anything the workflow
        // itself produces in the outbound batch.
        self.shared
            .queue
            .push(Command::Response(Response::ok(request.id, vec![started])));

        if let Some((signal_name, signal_args)) = signal {
            inner.staged_signals.push(StagedSignal {
                response_id: None,
                workflow_id: workflow_id.clone(),
                name: signal_name,
                args: signal_args,
            });
        }

        debug!(workflow_id = %workflow_id, run_id = %run_id, workflow_type = %workflow_type, "starting");
        let mut exec = WorkflowExecution::new(
            workflow_type,
            workflow_id.clone(),
            run_id,
            handler,
            request.header.clone(),
        );
        let outcome = exec.drive_start(
            &self.shared.client,
            self.shared.converter.as_ref(),
            request.payloads,
        );
        inner.executions.insert(workflow_id.clone(), exec);
        if let Some(outcome) = outcome {
            self.emit_outcome(&mut inner, &workflow_id, outcome);
        }
        DispatchOutcome::Handled
    }

    fn handle_signal_with_start(&self, request: Request) -> DispatchOutcome {
        let signal_name = match request.option_str("signalName") {
            Some(name) => name.to_string(),
            None => {
                return DispatchOutcome::Reply(Err(WorkerError::InvalidArgument(
                    "options.signalName is required".to_string(),
                )
                .to_failure()));
            }
        };
        let signal_args = match request.options.get("signalInput") {
            None => Vec::new(),
            Some(serde_json::Value::Array(values)) => {
                let mut args = Vec::with_capacity(values.len());
                for value in values {
                    match self.shared.converter.to_payload(value) {
                        Ok(payload) => args.push(payload),
                        Err(e) => {
                            return DispatchOutcome::Reply(Err(WorkerError::from(e).to_failure()));
                        }
                    }
                }
                args
            }
            Some(_) => {
                return DispatchOutcome::Reply(Err(WorkerError::InvalidArgument(
                    "options.signalInput must be an array".to_string(),
                )
                .to_failure()));
            }
        };
        self.handle_start(request, Some((signal_name, signal_args)))
    }

    fn stage_signal(&self, request: Request) -> DispatchOutcome {
        let workflow_id = match Self::workflow_id_of(&request) {
            Ok(id) => id,
            Err(failure) => return DispatchOutcome::Reply(Err(failure)),
        };
        let name = match Self::handler_name_of(&request) {
            Ok(name) => name,
            Err(failure) => return DispatchOutcome::Reply(Err(failure)),
        };

        let mut inner = lock(&self.inner);
        match inner.executions.get(&workflow_id) {
            None => DispatchOutcome::Reply(Err(WorkerError::IllegalState(format!(
                "signal {} for workflow {} that has not started",
                name, workflow_id
            ))
            .to_failure())),
            Some(exec) if exec.status().is_terminal() => {
                DispatchOutcome::Reply(Err(self.terminal_failure(exec, "signal")))
            }
            Some(_) => {
                inner.staged_signals.push(StagedSignal {
                    response_id: Some(request.id),
                    workflow_id,
                    name,
                    args: request.payloads,
                });
                DispatchOutcome::Handled
            }
        }
    }

    fn stage_query(&self, request: Request) -> DispatchOutcome {
        let workflow_id = match Self::workflow_id_of(&request) {
            Ok(id) => id,
            Err(failure) => return DispatchOutcome::Reply(Err(failure)),
        };
        let name = match Self::handler_name_of(&request) {
            Ok(name) => name,
            Err(failure) => return DispatchOutcome::Reply(Err(failure)),
        };

        let mut inner = lock(&self.inner);
        match inner.executions.get(&workflow_id) {
            None => DispatchOutcome::Reply(Err(WorkerError::IllegalState(format!(
                "query {} for workflow {} that has not started",
                name, workflow_id
            ))
            .to_failure())),
            Some(exec) if exec.status().is_terminal() => {
                DispatchOutcome::Reply(Err(self.terminal_failure(exec, "query")))
            }
            Some(_) => {
                inner.staged_queries.push(StagedQuery {
                    response_id: request.id,
                    workflow_id,
                    name,
                    args: request.payloads,
                });
                DispatchOutcome::Handled
            }
        }
    }

    fn terminal_failure(&self, exec: &WorkflowExecution, operation: &str) -> Failure {
        WorkerError::IllegalState(format!(
            "{} for workflow {} in terminal state {:?}",
            operation,
            exec.workflow_id(),
            exec.status()
        ))
        .to_failure()
    }

    fn handle_cancel(&self, request: Request) -> DispatchOutcome {
        let workflow_id = match Self::workflow_id_of(&request) {
            Ok(id) => id,
            Err(failure) => return DispatchOutcome::Reply(Err(failure)),
        };

        let mut inner = lock(&self.inner);
        let ends_now = match inner.executions.get_mut(&workflow_id) {
            None => {
                return DispatchOutcome::Reply(Err(WorkerError::IllegalState(format!(
                    "cancel for workflow {} that has not started",
                    workflow_id
                ))
                .to_failure()));
            }
            Some(exec) if exec.status().is_terminal() => {
                return DispatchOutcome::Reply(Err(self.terminal_failure(exec, "cancel")));
            }
            Some(exec) => {
                debug!(workflow_id = %workflow_id, "cancellation requested");
                let awaited = exec.request_cancel();
                if awaited.is_empty() {
                    // Nothing to resume through; the execution ends here.
                    exec.force_canceled();
                    true
                } else {
                    for id in awaited {
                        self.shared.client.cancel(id);
                    }
                    false
                }
            }
        };
        if ends_now {
            self.emit_outcome(
                &mut inner,
                &workflow_id,
                ExecutionOutcome::Failed(Failure::new(ErrorCode::Canceled, "workflow canceled")),
            );
        }
        DispatchOutcome::Reply(Ok(vec![]))
    }

    fn handle_terminate(&self, request: Request) -> DispatchOutcome {
        let workflow_id = match Self::workflow_id_of(&request) {
            Ok(id) => id,
            Err(failure) => return DispatchOutcome::Reply(Err(failure)),
        };
        let reason = request
            .option_str("reason")
            .unwrap_or("terminated by host")
            .to_string();

        let mut inner = lock(&self.inner);
        match inner.executions.get_mut(&workflow_id) {
            None => {
                return DispatchOutcome::Reply(Err(WorkerError::IllegalState(format!(
                    "terminate for workflow {} that has not started",
                    workflow_id
                ))
                .to_failure()));
            }
            Some(exec) if exec.status().is_terminal() => {
                return DispatchOutcome::Reply(Err(self.terminal_failure(exec, "terminate")));
            }
            Some(exec) => {
                debug!(workflow_id = %workflow_id, reason = %reason, "terminating");
                let abandoned = exec.terminate();
                for id in abandoned {
                    self.shared.client.cancel(id);
                }
            }
        }
        self.emit_outcome(
            &mut inner,
            &workflow_id,
            ExecutionOutcome::Failed(Failure::new(ErrorCode::Terminated, reason)),
        );
        DispatchOutcome::Reply(Ok(vec![]))
    }

    fn handle_continue_as_new(&self, request: Request) -> DispatchOutcome {
        let workflow_id = match Self::workflow_id_of(&request) {
            Ok(id) => id,
            Err(failure) => return DispatchOutcome::Reply(Err(failure)),
        };

        let mut inner = lock(&self.inner);
        match inner.executions.get_mut(&workflow_id) {
            None => {
                return DispatchOutcome::Reply(Err(WorkerError::IllegalState(format!(
                    "continue-as-new for workflow {} that has not started",
                    workflow_id
                ))
                .to_failure()));
            }
            Some(exec) if exec.status().is_terminal() => {
                return DispatchOutcome::Reply(Err(
                    self.terminal_failure(exec, "continue-as-new")
                ));
            }
            Some(exec) => {
                let abandoned = exec.interrupt_for_new_run();
                for id in abandoned {
                    self.shared.client.cancel(id);
                }
            }
        }
        self.emit_outcome(
            &mut inner,
            &workflow_id,
            ExecutionOutcome::ContinuedAsNew(request.payloads),
        );
        let run_id = inner
            .executions
            .get(&workflow_id)
            .map(|e| e.run_id().to_string())
            .unwrap_or_default();
        match self.started_payload(&workflow_id, &run_id) {
            Ok(payload) => DispatchOutcome::Reply(Ok(vec![payload])),
            Err(failure) => DispatchOutcome::Reply(Err(failure)),
        }
    }

    fn handle_activity(&self, request: Request) -> DispatchOutcome {
        let name = match Self::handler_name_of(&request) {
            Ok(name) => name,
            Err(failure) => return DispatchOutcome::Reply(Err(failure)),
        };

        let handler = lock(&self.inner)
            .activities
            .iter()
            .find(|d| d.info.name == name)
            .map(|d| Arc::clone(&d.handler));
        match handler {
            None => DispatchOutcome::Reply(Err(WorkerError::NotFound(format!(
                "activity type {}",
                name
            ))
            .to_failure())),
            Some(handler) => {
                trace!(activity = %name, "invoking activity");
                let ctx = ActivityContext::new(
                    &request.header,
                    self.shared.converter.as_ref(),
                    self.shared.rpc.as_ref(),
                );
                DispatchOutcome::Reply(handler.execute(&ctx, request.payloads))
            }
        }
    }

    // ========================================================================
    // Lifecycle stages
    // ========================================================================

    /// Deliver staged signals (the `Signal` stage).
    pub(crate) fn deliver_signals(&self) {
        let staged = std::mem::take(&mut lock(&self.inner).staged_signals);
        for signal in staged {
            let mut inner = lock(&self.inner);
            let result = match inner.executions.get_mut(&signal.workflow_id) {
                None => Err(WorkerError::IllegalState(format!(
                    "signal {} for workflow {} that has not started",
                    signal.name, signal.workflow_id
                ))
                .to_failure()),
                Some(exec) if exec.status().is_terminal() => {
                    Err(self.terminal_failure(exec, "signal"))
                }
                Some(exec) => exec
                    .deliver_signal(
                        &self.shared.client,
                        self.shared.converter.as_ref(),
                        &signal.name,
                        signal.args,
                    )
                    .map(|_| Vec::new()),
            };
            drop(inner);
            if let Some(id) = signal.response_id {
                self.shared
                    .queue
                    .push(Command::Response(Response { id, result }));
            } else if let Err(failure) = result {
                warn!(workflow_id = %signal.workflow_id, %failure, "signal-with-start delivery failed");
            }
        }
    }

    /// Drive executions whose awaited requests resolved (the `Callback`
    /// stage). Runs to quiescence; iteration order is workflow id, then
    /// ascending request id, so replays drive identically.
    pub(crate) fn drive_callbacks(&self) {
        loop {
            let mut inner = lock(&self.inner);
            let mut ready: Option<(String, u64, weft_protocol::ResponseResult)> = None;
            'search: for (workflow_id, exec) in inner.executions.iter() {
                if exec.status() != ExecutionStatus::Running {
                    continue;
                }
                for request_id in exec.awaited() {
                    if let Some(outcome) = self.shared.client.try_take(request_id) {
                        ready = Some((workflow_id.clone(), request_id, outcome));
                        break 'search;
                    }
                }
            }
            let Some((workflow_id, request_id, outcome)) = ready else {
                return;
            };
            trace!(workflow_id = %workflow_id, request_id, "resuming");
            let out = match inner.executions.get_mut(&workflow_id) {
                Some(exec) => exec.drive_resume(
                    &self.shared.client,
                    self.shared.converter.as_ref(),
                    request_id,
                    outcome,
                ),
                None => None,
            };
            if let Some(out) = out {
                self.emit_outcome(&mut inner, &workflow_id, out);
            }
        }
    }

    /// Answer staged queries (the `Query` stage). Queries observe the
    /// state left by this tick's signals and callbacks.
    pub(crate) fn answer_queries(&self) {
        let staged = std::mem::take(&mut lock(&self.inner).staged_queries);
        for query in staged {
            let inner = lock(&self.inner);
            let result = match inner.executions.get(&query.workflow_id) {
                None => Err(WorkerError::IllegalState(format!(
                    "query {} for workflow {} that has not started",
                    query.name, query.workflow_id
                ))
                .to_failure()),
                Some(exec) if exec.status().is_terminal() => {
                    Err(self.terminal_failure(exec, "query"))
                }
                Some(exec) => exec.query(&query.name, query.args),
            };
            drop(inner);
            self.shared.queue.push(Command::Response(Response {
                id: query.response_id,
                result,
            }));
        }
    }

    /// End-of-tick housekeeping (the `Tick` stage).
    pub(crate) fn finish_tick(&self) {
        let inner = lock(&self.inner);
        trace!(
            task_queue = %self.task_queue,
            executions = inner.executions.len(),
            "tick finished"
        );
    }

    /// Drop staged work after a contained per-batch failure.
    pub(crate) fn clear_stages(&self) {
        let mut inner = lock(&self.inner);
        inner.staged_signals.clear();
        inner.staged_queries.clear();
    }

    // ========================================================================
    // Outcome emission
    // ========================================================================

    /// Emit the outbound command for a terminal outcome. Continue-as-new
    /// restarts the execution under a fresh run until it suspends or
    /// reaches a real terminal state.
    fn emit_outcome(
        &self,
        inner: &mut WorkerInner,
        workflow_id: &str,
        mut outcome: ExecutionOutcome,
    ) {
        loop {
            let Some(exec) = inner.executions.get(workflow_id) else {
                warn!(workflow_id, "outcome for unknown execution");
                return;
            };
            let run_id = exec.run_id().to_string();
            let workflow_type = exec.workflow_type().to_string();

            let mut options = JsonMap::new();
            options.insert("workflowId".to_string(), serde_json::json!(workflow_id));
            options.insert("runId".to_string(), serde_json::json!(run_id));

            match outcome {
                ExecutionOutcome::Completed(payloads) => {
                    self.shared.client.request(
                        commands::COMPLETE_WORKFLOW,
                        options,
                        payloads,
                        Headers::new(),
                    );
                    return;
                }
                ExecutionOutcome::Failed(failure) => {
                    match serde_json::to_value(&failure) {
                        Ok(value) => {
                            options.insert("failure".to_string(), value);
                        }
                        Err(e) => warn!(error = %e, "failure not serializable"),
                    }
                    self.shared.client.request(
                        commands::FAIL_WORKFLOW,
                        options,
                        vec![],
                        Headers::new(),
                    );
                    return;
                }
                ExecutionOutcome::ContinuedAsNew(input) => {
                    let handler = match inner
                        .workflows
                        .iter()
                        .find(|d| d.info.name == workflow_type)
                    {
                        Some(def) => (def.factory)(),
                        None => {
                            warn!(workflow_type = %workflow_type, "definition gone for continue-as-new");
                            return;
                        }
                    };
                    inner.run_counter += 1;
                    let new_run_id = format!("{}-run-{}", workflow_id, inner.run_counter);
                    debug!(workflow_id, run_id = %new_run_id, "new run");
                    let Some(exec) = inner.executions.get_mut(workflow_id) else {
                        return;
                    };
                    exec.reset_for_new_run(handler, new_run_id);
                    match exec.drive_start(
                        &self.shared.client,
                        self.shared.converter.as_ref(),
                        input,
                    ) {
                        Some(next) => outcome = next,
                        None => return,
                    }
                }
            }
        }
    }
}
