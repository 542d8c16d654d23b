// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Process-scoped lifecycle event bus.
//!
//! A minimal named-slot emitter. The contractual part is the order of
//! emission within a tick — `Signal, Callback, Query, Tick` — and that
//! listeners of one event run in subscription order.

use std::sync::{Arc, Mutex};

use tracing::trace;

use crate::lock;

/// Lifecycle events emitted by the tick loop, in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEvent {
    /// Staged signal deliveries run.
    Signal,
    /// Resolutions of pending slots are driven to quiescence.
    Callback,
    /// Staged queries are answered.
    Query,
    /// End-of-tick housekeeping.
    Tick,
}

/// Emission order within one tick.
pub const TICK_ORDER: [LifecycleEvent; 4] = [
    LifecycleEvent::Signal,
    LifecycleEvent::Callback,
    LifecycleEvent::Query,
    LifecycleEvent::Tick,
];

type Listener = Arc<dyn Fn() + Send + Sync>;

/// Named-slot emitter with deterministic listener order.
#[derive(Default)]
pub struct EventBus {
    listeners: Mutex<Vec<(LifecycleEvent, Listener)>>,
}

impl EventBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a listener for one event. Listeners for the same event
    /// run in subscription order.
    pub fn subscribe(&self, event: LifecycleEvent, listener: impl Fn() + Send + Sync + 'static) {
        lock(&self.listeners).push((event, Arc::new(listener)));
    }

    /// Run every listener registered for `event`, in subscription order.
    ///
    /// Listeners run outside the bus lock so they may emit or subscribe
    /// without deadlocking; subscriptions made mid-emission take effect
    /// from the next emission.
    pub fn emit(&self, event: LifecycleEvent) {
        trace!(?event, "emit");
        let matching: Vec<Listener> = lock(&self.listeners)
            .iter()
            .filter(|(e, _)| *e == event)
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in matching {
            listener();
        }
    }

    /// Emit the full per-tick sequence in contractual order.
    pub fn emit_tick_sequence(&self) {
        for event in TICK_ORDER {
            self.emit(event);
        }
    }
}
