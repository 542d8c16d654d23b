// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Correlated request/response client.
//!
//! Workflow code issues outbound requests through the client; inbound
//! responses resolve the matching pending slot on a later tick. Slots
//! stay resolved until observed, so an execution that is not driven in
//! the arrival tick still sees the value later.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use weft_protocol::{
    Command, ErrorCode, Failure, Headers, JsonMap, Payload, Request, Response, ResponseResult,
};

use crate::error::{Result, WorkerError};
use crate::lock;
use crate::queue::ResponseQueue;

enum Slot {
    Pending,
    Resolved(ResponseResult),
}

#[derive(Default)]
struct ClientState {
    next_id: u64,
    slots: HashMap<u64, Slot>,
    /// Ids whose slot was resolved by cancellation; a late response for
    /// one of these is dropped instead of raising a protocol error.
    canceled: HashSet<u64>,
}

/// Client side of the command channel: assigns ids, records pending
/// slots, resolves them from inbound responses.
#[derive(Clone)]
pub struct Client {
    state: Arc<Mutex<ClientState>>,
    queue: ResponseQueue,
}

impl Client {
    pub fn new(queue: ResponseQueue) -> Self {
        Self {
            state: Arc::new(Mutex::new(ClientState::default())),
            queue,
        }
    }

    /// Issue an outbound request.
    ///
    /// Assigns a fresh monotonically increasing id, appends the request
    /// to the response queue, and records a pending slot. Returns the id.
    pub fn request(
        &self,
        name: &str,
        options: JsonMap,
        payloads: Vec<Payload>,
        header: Headers,
    ) -> u64 {
        let mut state = lock(&self.state);
        state.next_id += 1;
        let id = state.next_id;
        state.slots.insert(id, Slot::Pending);
        drop(state);

        debug!(id, name, "outbound request");
        self.queue.push(Command::Request(Request {
            id,
            name: name.to_string(),
            options,
            payloads,
            header,
        }));
        id
    }

    /// Resolve the pending slot matching an inbound response.
    ///
    /// A response without a matching slot is a protocol error, unless the
    /// slot was resolved by cancellation, in which case the late response
    /// is dropped.
    pub fn dispatch(&self, response: Response) -> Result<()> {
        let mut state = lock(&self.state);
        match state.slots.get_mut(&response.id) {
            Some(slot @ Slot::Pending) => {
                debug!(id = response.id, ok = response.result.is_ok(), "response resolved");
                *slot = Slot::Resolved(response.result);
                Ok(())
            }
            Some(Slot::Resolved(_)) | None => {
                if state.canceled.remove(&response.id) {
                    debug!(id = response.id, "dropping response for canceled request");
                    return Ok(());
                }
                warn!(id = response.id, "response without pending request");
                Err(WorkerError::Protocol(format!(
                    "response {} has no pending request",
                    response.id
                )))
            }
        }
    }

    /// Resolve a pending slot with a canceled failure.
    ///
    /// No-op for unknown or already resolved ids.
    pub fn cancel(&self, id: u64) {
        let mut state = lock(&self.state);
        if let Some(slot @ Slot::Pending) = state.slots.get_mut(&id) {
            *slot = Slot::Resolved(Err(Failure::new(
                ErrorCode::Canceled,
                "request canceled before a response arrived",
            )));
            state.canceled.insert(id);
        }
    }

    /// Observe a resolved slot, removing it. `None` while still pending
    /// or unknown.
    pub fn try_take(&self, id: u64) -> Option<ResponseResult> {
        let mut state = lock(&self.state);
        match state.slots.get(&id) {
            Some(Slot::Resolved(_)) => match state.slots.remove(&id) {
                Some(Slot::Resolved(result)) => Some(result),
                _ => None,
            },
            _ => None,
        }
    }

    /// True if the id has an unresolved slot.
    pub fn is_pending(&self, id: u64) -> bool {
        matches!(lock(&self.state).slots.get(&id), Some(Slot::Pending))
    }

    /// Ids of unresolved slots, sorted.
    pub fn pending_ids(&self) -> Vec<u64> {
        let state = lock(&self.state);
        let mut ids: Vec<u64> = state
            .slots
            .iter()
            .filter(|(_, slot)| matches!(slot, Slot::Pending))
            .map(|(id, _)| *id)
            .collect();
        ids.sort_unstable();
        ids
    }
}
