// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Ordered buffer of outbound commands produced during a tick.

use std::sync::{Arc, Mutex};

use weft_protocol::Command;

use crate::lock;

/// Cloneable handle to the tick's outbound command buffer.
///
/// Append-only within a tick, drained to empty by the encode step.
/// Insertion order is preserved exactly; the encoded outbound batch
/// reflects append order.
#[derive(Clone, Default)]
pub struct ResponseQueue {
    inner: Arc<Mutex<Vec<Command>>>,
}

impl ResponseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command.
    pub fn push(&self, command: Command) {
        lock(&self.inner).push(command);
    }

    /// Take every buffered command, leaving the queue empty.
    pub fn drain(&self) -> Vec<Command> {
        std::mem::take(&mut *lock(&self.inner))
    }

    pub fn len(&self) -> usize {
        lock(&self.inner).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner).is_empty()
    }
}

impl std::fmt::Debug for ResponseQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseQueue")
            .field("len", &self.len())
            .finish()
    }
}
