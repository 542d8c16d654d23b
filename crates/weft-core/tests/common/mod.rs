// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared harness and fixture workflows for weft-core integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use weft_core::{
    FactoryConfig, HandlerDeclaration, JsonConverter, NoopRpc, WorkerFactory, Workflow,
    WorkflowContext, WorkflowTransition, from_payload, to_payload,
};
use weft_protocol::{
    Batch, ChannelHost, Codec, Command, Failure, HostHandle, JsonMap, Payload, Request, Response,
};

const TICK_TIMEOUT: Duration = Duration::from_secs(5);

/// Drives a factory over an in-memory host connection, one tick at a time.
pub struct Harness {
    pub factory: Arc<WorkerFactory>,
    pub handle: HostHandle,
    codec: &'static dyn Codec,
    thread: Option<JoinHandle<weft_core::Result<i32>>>,
}

impl Harness {
    /// Build a factory with the default (JSON) configuration, let `setup`
    /// register workers, and start the run loop on a background thread.
    pub fn start(setup: impl FnOnce(&WorkerFactory)) -> Self {
        Self::start_with(FactoryConfig::default(), setup)
    }

    pub fn start_with(config: FactoryConfig, setup: impl FnOnce(&WorkerFactory)) -> Self {
        let codec = config.codec.select();
        let factory = Arc::new(WorkerFactory::new(
            config,
            Arc::new(JsonConverter),
            Arc::new(NoopRpc),
        ));
        setup(&factory);

        let (mut host, handle) = ChannelHost::pair();
        let runner = factory.clone();
        let thread = std::thread::spawn(move || runner.run(&mut host));

        Self {
            factory,
            handle,
            codec,
            thread: Some(thread),
        }
    }

    /// Deliver one batch routed to `task_queue` and return the decoded
    /// outbound batch.
    pub fn tick(&self, task_queue: Option<&str>, commands: Vec<Command>) -> Vec<Command> {
        let messages = self.codec.encode(&commands).expect("encode inbound batch");
        let mut batch = Batch::new(messages);
        if let Some(task_queue) = task_queue {
            batch = batch.with_context("taskQueue", serde_json::json!(task_queue));
        }
        self.handle.push(batch);
        let sent = self
            .handle
            .recv_sent(TICK_TIMEOUT)
            .expect("worker did not answer within the tick timeout");
        self.codec.decode(&sent).expect("decode outbound batch")
    }

    /// Deliver a batch with an explicit raw context object.
    pub fn tick_with_context(&self, context: JsonMap, commands: Vec<Command>) -> Vec<Command> {
        let messages = self.codec.encode(&commands).expect("encode inbound batch");
        self.handle.push(Batch {
            messages,
            context,
        });
        let sent = self
            .handle
            .recv_sent(TICK_TIMEOUT)
            .expect("worker did not answer within the tick timeout");
        self.codec.decode(&sent).expect("decode outbound batch")
    }

    /// Like [`tick`](Self::tick), but returns the raw outbound frame.
    pub fn tick_raw(&self, task_queue: Option<&str>, commands: Vec<Command>) -> Vec<u8> {
        let messages = self.codec.encode(&commands).expect("encode inbound batch");
        let mut batch = Batch::new(messages);
        if let Some(task_queue) = task_queue {
            batch = batch.with_context("taskQueue", serde_json::json!(task_queue));
        }
        self.handle.push(batch);
        self.handle
            .recv_sent(TICK_TIMEOUT)
            .expect("worker did not answer within the tick timeout")
    }

    /// Close the stream and return the run loop's exit code.
    pub fn finish(mut self) -> i32 {
        self.handle.end();
        let thread = self.thread.take().expect("already finished");
        thread
            .join()
            .expect("run loop panicked")
            .expect("run loop failed")
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.handle.end();
            let _ = thread.join();
        }
    }
}

// ============================================================================
// Command builders
// ============================================================================

pub fn json_payload(value: &serde_json::Value) -> Payload {
    to_payload(&JsonConverter, value).expect("encode payload")
}

pub fn payload_value(payload: &Payload) -> serde_json::Value {
    from_payload(&JsonConverter, payload).expect("decode payload")
}

fn workflow_request(id: u64, kind: &str, workflow_id: &str) -> Request {
    let mut request = Request::new(id, kind);
    request
        .options
        .insert("workflowId".into(), serde_json::json!(workflow_id));
    request
}

pub fn start_workflow(
    id: u64,
    workflow_type: &str,
    workflow_id: &str,
    input: &[serde_json::Value],
) -> Command {
    let mut request = workflow_request(id, "StartWorkflow", workflow_id);
    request
        .options
        .insert("name".into(), serde_json::json!(workflow_type));
    request.payloads = input.iter().map(json_payload).collect();
    Command::Request(request)
}

pub fn signal_with_start(
    id: u64,
    workflow_type: &str,
    workflow_id: &str,
    input: &[serde_json::Value],
    signal_name: &str,
    signal_input: &[serde_json::Value],
) -> Command {
    let mut request = workflow_request(id, "SignalWithStartWorkflow", workflow_id);
    request
        .options
        .insert("name".into(), serde_json::json!(workflow_type));
    request
        .options
        .insert("signalName".into(), serde_json::json!(signal_name));
    request.options.insert(
        "signalInput".into(),
        serde_json::Value::Array(signal_input.to_vec()),
    );
    request.payloads = input.iter().map(json_payload).collect();
    Command::Request(request)
}

pub fn signal_workflow(
    id: u64,
    workflow_id: &str,
    name: &str,
    args: &[serde_json::Value],
) -> Command {
    let mut request = workflow_request(id, "SignalWorkflow", workflow_id);
    request.options.insert("name".into(), serde_json::json!(name));
    request.payloads = args.iter().map(json_payload).collect();
    Command::Request(request)
}

pub fn query_workflow(
    id: u64,
    workflow_id: &str,
    name: &str,
    args: &[serde_json::Value],
) -> Command {
    let mut request = workflow_request(id, "QueryWorkflow", workflow_id);
    request.options.insert("name".into(), serde_json::json!(name));
    request.payloads = args.iter().map(json_payload).collect();
    Command::Request(request)
}

pub fn cancel_workflow(id: u64, workflow_id: &str) -> Command {
    Command::Request(workflow_request(id, "CancelWorkflow", workflow_id))
}

pub fn terminate_workflow(id: u64, workflow_id: &str, reason: &str) -> Command {
    let mut request = workflow_request(id, "TerminateWorkflow", workflow_id);
    request
        .options
        .insert("reason".into(), serde_json::json!(reason));
    Command::Request(request)
}

pub fn continue_as_new(id: u64, workflow_id: &str, input: &[serde_json::Value]) -> Command {
    let mut request = workflow_request(id, "ContinueAsNew", workflow_id);
    request.payloads = input.iter().map(json_payload).collect();
    Command::Request(request)
}

pub fn invoke_activity(id: u64, name: &str, args: &[serde_json::Value]) -> Command {
    let mut request = Request::new(id, "InvokeActivity");
    request.options.insert("name".into(), serde_json::json!(name));
    request.payloads = args.iter().map(json_payload).collect();
    Command::Request(request)
}

pub fn get_worker_info(id: u64) -> Command {
    Command::Request(Request::new(id, "GetWorkerInfo"))
}

pub fn host_response(id: u64, payloads: Vec<Payload>) -> Command {
    Command::Response(Response::ok(id, payloads))
}

// ============================================================================
// Outbound batch inspection
// ============================================================================

pub fn response_for(outbound: &[Command], id: u64) -> &Response {
    let matches: Vec<&Response> = outbound
        .iter()
        .filter_map(|c| match c {
            Command::Response(resp) if resp.id == id => Some(resp),
            _ => None,
        })
        .collect();
    assert_eq!(
        matches.len(),
        1,
        "expected exactly one response for id {} in {:?}",
        id,
        outbound
    );
    matches[0]
}

pub fn request_named<'a>(outbound: &'a [Command], name: &str) -> &'a Request {
    let matches: Vec<&Request> = outbound
        .iter()
        .filter_map(|c| match c {
            Command::Request(req) if req.name == name => Some(req),
            _ => None,
        })
        .collect();
    assert_eq!(
        matches.len(),
        1,
        "expected exactly one {} request in {:?}",
        name,
        outbound
    );
    matches[0]
}

pub fn requests_named<'a>(outbound: &'a [Command], name: &str) -> Vec<&'a Request> {
    outbound
        .iter()
        .filter_map(|c| match c {
            Command::Request(req) if req.name == name => Some(req),
            _ => None,
        })
        .collect()
}

pub fn failure_in_options(request: &Request) -> Failure {
    serde_json::from_value(
        request
            .options
            .get("failure")
            .expect("failure option missing")
            .clone(),
    )
    .expect("failure option not decodable")
}

// ============================================================================
// Fixture workflows
// ============================================================================

/// Completes immediately with its first input upper-cased.
pub struct UppercaseWorkflow;

impl Workflow for UppercaseWorkflow {
    fn start(&mut self, ctx: &mut WorkflowContext<'_>, input: Vec<Payload>) -> WorkflowTransition {
        let text: String = match input
            .first()
            .ok_or("missing input")
            .and_then(|p| from_payload(ctx.converter(), p).map_err(|_| "bad input"))
        {
            Ok(text) => text,
            Err(msg) => {
                return WorkflowTransition::Fail(Failure::new(
                    weft_protocol::ErrorCode::InvalidArgument,
                    msg,
                ));
            }
        };
        match to_payload(ctx.converter(), &text.to_uppercase()) {
            Ok(payload) => WorkflowTransition::Complete(vec![payload]),
            Err(e) => WorkflowTransition::Fail(Failure::new(
                weft_protocol::ErrorCode::Internal,
                e.to_string(),
            )),
        }
    }

    fn signal(
        &mut self,
        _ctx: &mut WorkflowContext<'_>,
        name: &str,
        _args: Vec<Payload>,
    ) -> Result<(), Failure> {
        Err(Failure::new(
            weft_protocol::ErrorCode::NotImplemented,
            format!("signal {}", name),
        ))
    }

    fn query(&self, name: &str, _args: Vec<Payload>) -> Result<Vec<Payload>, Failure> {
        Err(Failure::new(
            weft_protocol::ErrorCode::NotImplemented,
            format!("query {}", name),
        ))
    }

    fn resume(
        &mut self,
        _ctx: &mut WorkflowContext<'_>,
        _request_id: u64,
        _outcome: weft_protocol::ResponseResult,
    ) -> WorkflowTransition {
        WorkflowTransition::Suspend
    }
}

/// Accumulates `add` signals while a durable timer runs, then completes
/// with the accumulated value.
pub struct SignalCounterWorkflow {
    counter: i64,
}

impl SignalCounterWorkflow {
    pub fn new() -> Self {
        Self { counter: 0 }
    }
}

impl Workflow for SignalCounterWorkflow {
    fn start(&mut self, ctx: &mut WorkflowContext<'_>, _input: Vec<Payload>) -> WorkflowTransition {
        ctx.timer(1_000);
        WorkflowTransition::Suspend
    }

    fn signal(
        &mut self,
        ctx: &mut WorkflowContext<'_>,
        name: &str,
        args: Vec<Payload>,
    ) -> Result<(), Failure> {
        match name {
            "add" => {
                let delta: i64 = args
                    .first()
                    .ok_or_else(|| {
                        Failure::new(weft_protocol::ErrorCode::InvalidArgument, "missing delta")
                    })
                    .and_then(|p| {
                        from_payload(ctx.converter(), p).map_err(|e| {
                            Failure::new(
                                weft_protocol::ErrorCode::InvalidArgument,
                                e.to_string(),
                            )
                        })
                    })?;
                self.counter += delta;
                Ok(())
            }
            other => Err(Failure::new(
                weft_protocol::ErrorCode::NotImplemented,
                format!("signal {}", other),
            )),
        }
    }

    fn query(&self, name: &str, _args: Vec<Payload>) -> Result<Vec<Payload>, Failure> {
        match name {
            "value" => to_payload(&JsonConverter, &self.counter)
                .map(|p| vec![p])
                .map_err(|e| {
                    Failure::new(weft_protocol::ErrorCode::Internal, e.to_string())
                }),
            other => Err(Failure::new(
                weft_protocol::ErrorCode::NotImplemented,
                format!("query {}", other),
            )),
        }
    }

    fn resume(
        &mut self,
        ctx: &mut WorkflowContext<'_>,
        _request_id: u64,
        outcome: weft_protocol::ResponseResult,
    ) -> WorkflowTransition {
        match outcome {
            Ok(_) => match to_payload(ctx.converter(), &self.counter) {
                Ok(payload) => WorkflowTransition::Complete(vec![payload]),
                Err(e) => WorkflowTransition::Fail(Failure::new(
                    weft_protocol::ErrorCode::Internal,
                    e.to_string(),
                )),
            },
            Err(failure) => WorkflowTransition::Fail(failure),
        }
    }
}

/// Continues as new until its input counter reaches zero, then completes
/// with the number of runs it took.
pub struct CountdownWorkflow;

impl Workflow for CountdownWorkflow {
    fn start(&mut self, ctx: &mut WorkflowContext<'_>, input: Vec<Payload>) -> WorkflowTransition {
        let remaining: i64 = input
            .first()
            .and_then(|p| from_payload(ctx.converter(), p).ok())
            .unwrap_or(0);
        if remaining <= 0 {
            match to_payload(ctx.converter(), &ctx.run_id()) {
                Ok(payload) => WorkflowTransition::Complete(vec![payload]),
                Err(e) => WorkflowTransition::Fail(Failure::new(
                    weft_protocol::ErrorCode::Internal,
                    e.to_string(),
                )),
            }
        } else {
            match to_payload(ctx.converter(), &(remaining - 1)) {
                Ok(payload) => WorkflowTransition::ContinueAsNew(vec![payload]),
                Err(e) => WorkflowTransition::Fail(Failure::new(
                    weft_protocol::ErrorCode::Internal,
                    e.to_string(),
                )),
            }
        }
    }

    fn signal(
        &mut self,
        _ctx: &mut WorkflowContext<'_>,
        name: &str,
        _args: Vec<Payload>,
    ) -> Result<(), Failure> {
        Err(Failure::new(
            weft_protocol::ErrorCode::NotImplemented,
            format!("signal {}", name),
        ))
    }

    fn query(&self, name: &str, _args: Vec<Payload>) -> Result<Vec<Payload>, Failure> {
        Err(Failure::new(
            weft_protocol::ErrorCode::NotImplemented,
            format!("query {}", name),
        ))
    }

    fn resume(
        &mut self,
        _ctx: &mut WorkflowContext<'_>,
        _request_id: u64,
        _outcome: weft_protocol::ResponseResult,
    ) -> WorkflowTransition {
        WorkflowTransition::Suspend
    }
}

/// Register the full fixture set on a worker.
pub fn register_fixtures(factory: &WorkerFactory, task_queue: &str) {
    let worker = factory.new_worker(task_queue).expect("worker");
    worker.register_workflow(HandlerDeclaration::of_type("UppercaseWorkflow"), || {
        UppercaseWorkflow
    });
    worker.register_workflow(
        HandlerDeclaration::of_type("SignalCounterWorkflow"),
        SignalCounterWorkflow::new,
    );
    worker.register_workflow(HandlerDeclaration::of_type("CountdownWorkflow"), || {
        CountdownWorkflow
    });
    worker.register_activity(
        HandlerDeclaration::of_type("UppercaseActivity"),
        weft_core::activity_fn(|ctx, args| {
            let input: String = from_payload(ctx.converter(), &args[0]).map_err(|e| {
                Failure::new(weft_protocol::ErrorCode::InvalidArgument, e.to_string())
            })?;
            to_payload(ctx.converter(), &input.to_uppercase())
                .map(|p| vec![p])
                .map_err(|e| Failure::new(weft_protocol::ErrorCode::Internal, e.to_string()))
        }),
    );
}
