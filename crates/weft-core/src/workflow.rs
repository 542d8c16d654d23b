// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Workflow executions as explicit state machines.
//!
//! A workflow only observes the world at its request boundaries, which is
//! what keeps replays deterministic: given the same inbound command
//! sequence, an execution makes the same transitions and issues the same
//! outbound requests.
//!
//! ```text
//! Fresh ──start──▶ Running ──▶ Completed
//!                  │  ▲   └──▶ Failed / Canceled / Terminated
//!                  │  └─signal/query (no state change)
//!                  └────────▶ ContinuedAsNew (restarts under a new run)
//! ```

use std::collections::BTreeSet;

use tracing::{debug, warn};

use weft_protocol::{Failure, Headers, JsonMap, Payload, ResponseResult};

use crate::client::Client;
use crate::convert::DataConverter;

/// Outbound command kind for a durable timer.
pub const NEW_TIMER: &str = "NewTimer";

/// What workflow code decides after being driven.
#[derive(Debug)]
pub enum WorkflowTransition {
    /// Wait for requests issued through the context to resolve.
    Suspend,
    /// Finish successfully with a result.
    Complete(Vec<Payload>),
    /// Finish with a failure.
    Fail(Failure),
    /// Restart from scratch under a new run with new input.
    ContinueAsNew(Vec<Payload>),
}

/// A deterministic, replayable long-lived handler.
///
/// The runtime drives implementations at exactly three points: `start`
/// when the execution begins, `resume` when an awaited request resolves,
/// and `signal` when a signal is delivered. `query` must not mutate.
pub trait Workflow: Send {
    /// Begin the execution with the start input.
    fn start(&mut self, ctx: &mut WorkflowContext<'_>, input: Vec<Payload>) -> WorkflowTransition;

    /// Deliver an asynchronous signal.
    fn signal(
        &mut self,
        ctx: &mut WorkflowContext<'_>,
        name: &str,
        args: Vec<Payload>,
    ) -> Result<(), Failure>;

    /// Answer a synchronous read of workflow state.
    fn query(&self, name: &str, args: Vec<Payload>) -> Result<Vec<Payload>, Failure>;

    /// React to the resolution of an awaited request.
    fn resume(
        &mut self,
        ctx: &mut WorkflowContext<'_>,
        request_id: u64,
        outcome: ResponseResult,
    ) -> WorkflowTransition;
}

/// The side-effect surface available to workflow code between suspension
/// points.
pub struct WorkflowContext<'a> {
    client: &'a Client,
    converter: &'a dyn DataConverter,
    workflow_id: &'a str,
    run_id: &'a str,
    header: &'a Headers,
    cancel_requested: bool,
    issued: Vec<u64>,
}

impl<'a> WorkflowContext<'a> {
    pub(crate) fn new(
        client: &'a Client,
        converter: &'a dyn DataConverter,
        workflow_id: &'a str,
        run_id: &'a str,
        header: &'a Headers,
        cancel_requested: bool,
    ) -> Self {
        Self {
            client,
            converter,
            workflow_id,
            run_id,
            header,
            cancel_requested,
            issued: Vec::new(),
        }
    }

    /// Issue an outbound request; its resolution arrives via `resume`.
    pub fn request(&mut self, name: &str, options: JsonMap, payloads: Vec<Payload>) -> u64 {
        let id = self
            .client
            .request(name, options, payloads, self.header.clone());
        self.issued.push(id);
        id
    }

    /// Issue a durable timer request.
    pub fn timer(&mut self, ms: u64) -> u64 {
        let mut options = JsonMap::new();
        options.insert("ms".to_string(), serde_json::json!(ms));
        self.request(NEW_TIMER, options, vec![])
    }

    pub fn converter(&self) -> &dyn DataConverter {
        self.converter
    }

    pub fn workflow_id(&self) -> &str {
        self.workflow_id
    }

    pub fn run_id(&self) -> &str {
        self.run_id
    }

    pub fn header(&self) -> &Headers {
        self.header
    }

    /// True once a cancel request was delivered for this execution.
    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    pub(crate) fn into_issued(self) -> Vec<u64> {
        self.issued
    }
}

/// Lifecycle state of one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStatus {
    /// Created, not yet started.
    Fresh,
    /// Started and accepting signals/queries.
    Running,
    /// Finished with a result.
    Completed,
    /// Finished with a failure.
    Failed,
    /// Finished by cancellation.
    Canceled,
    /// Finished by termination.
    Terminated,
    /// Restarted under a new run.
    ContinuedAsNew,
}

impl ExecutionStatus {
    /// Terminal states accept no further signals or queries.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Fresh | Self::Running)
    }
}

/// What a transition means for the outside world.
#[derive(Debug)]
pub(crate) enum ExecutionOutcome {
    Completed(Vec<Payload>),
    Failed(Failure),
    ContinuedAsNew(Vec<Payload>),
}

/// One workflow execution: handler plus state machine bookkeeping.
pub struct WorkflowExecution {
    workflow_type: String,
    workflow_id: String,
    run_id: String,
    status: ExecutionStatus,
    handler: Box<dyn Workflow>,
    awaited: BTreeSet<u64>,
    cancel_requested: bool,
    header: Headers,
}

impl WorkflowExecution {
    pub(crate) fn new(
        workflow_type: String,
        workflow_id: String,
        run_id: String,
        handler: Box<dyn Workflow>,
        header: Headers,
    ) -> Self {
        Self {
            workflow_type,
            workflow_id,
            run_id,
            status: ExecutionStatus::Fresh,
            handler,
            awaited: BTreeSet::new(),
            cancel_requested: false,
            header,
        }
    }

    pub fn workflow_type(&self) -> &str {
        &self.workflow_type
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    /// Ids this execution is waiting on, ascending.
    pub(crate) fn awaited(&self) -> Vec<u64> {
        self.awaited.iter().copied().collect()
    }

    /// Run the handler's `start` and record the transition.
    pub(crate) fn drive_start(
        &mut self,
        client: &Client,
        converter: &dyn DataConverter,
        input: Vec<Payload>,
    ) -> Option<ExecutionOutcome> {
        let mut ctx = WorkflowContext::new(
            client,
            converter,
            &self.workflow_id,
            &self.run_id,
            &self.header,
            self.cancel_requested,
        );
        let transition = self.handler.start(&mut ctx, input);
        let issued = ctx.into_issued();
        self.apply(transition, issued)
    }

    /// Run the handler's `resume` for a resolved request.
    pub(crate) fn drive_resume(
        &mut self,
        client: &Client,
        converter: &dyn DataConverter,
        request_id: u64,
        outcome: ResponseResult,
    ) -> Option<ExecutionOutcome> {
        self.awaited.remove(&request_id);
        let mut ctx = WorkflowContext::new(
            client,
            converter,
            &self.workflow_id,
            &self.run_id,
            &self.header,
            self.cancel_requested,
        );
        let transition = self.handler.resume(&mut ctx, request_id, outcome);
        let issued = ctx.into_issued();
        self.apply(transition, issued)
    }

    /// Deliver a signal to the handler.
    pub(crate) fn deliver_signal(
        &mut self,
        client: &Client,
        converter: &dyn DataConverter,
        name: &str,
        args: Vec<Payload>,
    ) -> Result<(), Failure> {
        let mut ctx = WorkflowContext::new(
            client,
            converter,
            &self.workflow_id,
            &self.run_id,
            &self.header,
            self.cancel_requested,
        );
        let result = self.handler.signal(&mut ctx, name, args);
        let issued = ctx.into_issued();
        self.awaited.extend(issued);
        result
    }

    /// Answer a query against the handler.
    pub(crate) fn query(&self, name: &str, args: Vec<Payload>) -> Result<Vec<Payload>, Failure> {
        self.handler.query(name, args)
    }

    /// Record a transition returned by the handler.
    ///
    /// Merges the requests issued during the call into the awaited set and
    /// advances the state machine. Returns the externally visible outcome
    /// for terminal transitions.
    pub(crate) fn apply(
        &mut self,
        transition: WorkflowTransition,
        issued: Vec<u64>,
    ) -> Option<ExecutionOutcome> {
        self.awaited.extend(issued);
        match transition {
            WorkflowTransition::Suspend => {
                self.status = ExecutionStatus::Running;
                if self.awaited.is_empty() {
                    warn!(
                        workflow_id = %self.workflow_id,
                        "execution suspended without awaited requests"
                    );
                }
                None
            }
            WorkflowTransition::Complete(payloads) => {
                debug!(workflow_id = %self.workflow_id, run_id = %self.run_id, "completed");
                self.status = ExecutionStatus::Completed;
                self.awaited.clear();
                Some(ExecutionOutcome::Completed(payloads))
            }
            WorkflowTransition::Fail(failure) => {
                self.status = if self.cancel_requested && failure.is_canceled() {
                    ExecutionStatus::Canceled
                } else {
                    ExecutionStatus::Failed
                };
                debug!(
                    workflow_id = %self.workflow_id,
                    status = ?self.status,
                    "failed"
                );
                self.awaited.clear();
                Some(ExecutionOutcome::Failed(failure))
            }
            WorkflowTransition::ContinueAsNew(input) => {
                debug!(workflow_id = %self.workflow_id, "continuing as new");
                self.status = ExecutionStatus::ContinuedAsNew;
                self.awaited.clear();
                Some(ExecutionOutcome::ContinuedAsNew(input))
            }
        }
    }

    /// Mark cancellation requested; returns the ids whose pending slots
    /// should be flipped to canceled failures.
    pub(crate) fn request_cancel(&mut self) -> Vec<u64> {
        self.cancel_requested = true;
        self.awaited()
    }

    /// Force the terminated terminal state; returns the abandoned ids.
    pub(crate) fn terminate(&mut self) -> Vec<u64> {
        self.status = ExecutionStatus::Terminated;
        let abandoned = self.awaited();
        self.awaited.clear();
        abandoned
    }

    /// Leave the current run for a host-directed continue-as-new.
    /// Returns the abandoned ids.
    pub(crate) fn interrupt_for_new_run(&mut self) -> Vec<u64> {
        self.status = ExecutionStatus::ContinuedAsNew;
        let abandoned = self.awaited();
        self.awaited.clear();
        abandoned
    }

    /// Force the canceled terminal state (cancel with nothing awaited).
    pub(crate) fn force_canceled(&mut self) {
        self.cancel_requested = true;
        self.status = ExecutionStatus::Canceled;
        self.awaited.clear();
    }

    /// Replace the handler and restart bookkeeping for a continue-as-new.
    pub(crate) fn reset_for_new_run(&mut self, handler: Box<dyn Workflow>, run_id: String) {
        self.handler = handler;
        self.run_id = run_id;
        self.status = ExecutionStatus::Fresh;
        self.awaited.clear();
        self.cancel_requested = false;
    }

}
